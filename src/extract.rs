//! HTML → plain-text digest for the analysis prompt.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Node, Selector};

const MAX_HEADINGS: usize = 10;
const MAX_HEADING_CHARS: usize = 200;
const MAX_BODY_CHARS: usize = 5000;

/// Subtrees whose text never reaches the digest.
const SKIPPED_TAGS: &[&str] = &["script", "style", "nav", "footer"];

static WS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());
static TITLE_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("title").unwrap());
static META_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("meta").unwrap());
static HEADING_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("h1, h2, h3").unwrap());

/// The pieces pulled out of one page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageText {
    pub title: Option<String>,
    pub meta_description: Option<String>,
    pub headings: Vec<String>,
    pub body: String,
}

impl PageText {
    pub fn parse(html: &str) -> Self {
        let document = Html::parse_document(html);

        Self {
            title: title(&document),
            meta_description: meta_description(&document),
            headings: headings(&document),
            body: truncate_chars(&clean_lines(&visible_text(document.root_element())), MAX_BODY_CHARS)
                .to_string(),
        }
    }

    /// Render the fixed-label digest; absent pieces are left out entirely.
    pub fn digest(&self) -> String {
        let mut out = String::new();
        if let Some(title) = &self.title {
            out.push_str(&format!("Title: {}\n", title));
        }
        if let Some(desc) = &self.meta_description {
            out.push_str(&format!("Meta Description: {}\n", desc));
        }
        if !self.headings.is_empty() {
            out.push_str(&format!("Headings: {}\n", self.headings.join(", ")));
        }
        out.push_str(&format!("\nContent:\n{}", self.body));
        out
    }
}

/// Extract the digest for `html`. Empty input gives an empty digest.
pub fn extract_digest(html: &str) -> String {
    if html.trim().is_empty() {
        return String::new();
    }
    PageText::parse(html).digest()
}

/// Character-based prefix; never splits a code point.
pub fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

fn is_skipped(el: &ElementRef) -> bool {
    SKIPPED_TAGS.contains(&el.value().name())
}

fn inside_skipped(el: &ElementRef) -> bool {
    el.ancestors()
        .filter_map(ElementRef::wrap)
        .any(|a| is_skipped(&a))
}

/// Concatenated text nodes under `el`, skipping removed subtrees and comments.
fn visible_text(el: ElementRef) -> String {
    let mut out = String::new();
    collect_text(el, &mut out);
    out
}

fn collect_text(el: ElementRef, out: &mut String) {
    if is_skipped(&el) {
        return;
    }
    for child in el.children() {
        match child.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(_) => {
                if let Some(child_el) = ElementRef::wrap(child) {
                    collect_text(child_el, out);
                }
            }
            _ => {}
        }
    }
}

/// Trim every line, split on runs of two spaces, drop blanks, one phrase per line.
fn clean_lines(text: &str) -> String {
    text.lines()
        .flat_map(|line| line.trim().split("  "))
        .map(str::trim)
        .filter(|phrase| !phrase.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn collapse_ws(s: &str) -> String {
    WS_RE.replace_all(s.trim(), " ").into_owned()
}

fn title(document: &Html) -> Option<String> {
    document
        .select(&TITLE_SEL)
        .find(|el| !inside_skipped(el))
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty())
}

fn meta_description(document: &Html) -> Option<String> {
    document
        .select(&META_SEL)
        .filter(|el| !inside_skipped(el))
        .find(|el| {
            let attrs = el.value();
            attrs.attr("name") == Some("description")
                || attrs.attr("property") == Some("og:description")
        })
        .and_then(|el| el.value().attr("content"))
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
}

fn headings(document: &Html) -> Vec<String> {
    document
        .select(&HEADING_SEL)
        .filter(|el| !inside_skipped(el))
        .map(|el| collapse_ws(&visible_text(el)))
        .filter(|t| !t.is_empty() && t.chars().count() < MAX_HEADING_CHARS)
        .take(MAX_HEADINGS)
        .collect()
}
