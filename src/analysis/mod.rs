pub mod prompt;

use std::collections::BTreeMap;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::AnthropicConfig;
use crate::quarters::QuarterKey;

const ANTHROPIC_VERSION: &str = "2023-06-01";
const NOT_CONFIGURED: &str = "API key not configured";

/// Outcome of analysing one quarter. Serialized flat, with a `kind` discriminator.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Analysis {
    /// A JSON object was found in the model output.
    Structured(QuarterAnalysis),
    /// The model answered, but not with parseable JSON.
    Unstructured { raw_analysis: String },
    /// The call to the summarization service failed.
    Failed { error: String },
    /// No credential; nothing was sent.
    NotConfigured(Placeholder),
}

impl Analysis {
    pub fn not_configured() -> Self {
        Analysis::NotConfigured(Placeholder {
            error: "ANTHROPIC_API_KEY environment variable not set".to_string(),
            pricing: NOT_CONFIGURED.to_string(),
            marketing_copy: NOT_CONFIGURED.to_string(),
            value_proposition: NOT_CONFIGURED.to_string(),
            revenue_projection: NOT_CONFIGURED.to_string(),
        })
    }

    pub fn distribution_channels(&self) -> Option<&str> {
        match self {
            Analysis::Structured(a) => a.distribution_channels.as_deref(),
            _ => None,
        }
    }
}

/// Fields requested by either prompt. Unknown keys survive in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuarterAnalysis {
    #[serde(default, deserialize_with = "text_or_json", skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(default, deserialize_with = "text_or_json", skip_serializing_if = "Option::is_none")]
    pub value_proposition: Option<String>,
    #[serde(default, deserialize_with = "text_or_json", skip_serializing_if = "Option::is_none")]
    pub product_focus: Option<String>,
    #[serde(default, deserialize_with = "text_or_json", skip_serializing_if = "Option::is_none")]
    pub marketing_copy: Option<String>,
    #[serde(default, deserialize_with = "text_or_json", skip_serializing_if = "Option::is_none")]
    pub pricing_strategy: Option<String>,
    #[serde(default, deserialize_with = "text_or_json", skip_serializing_if = "Option::is_none")]
    pub distribution_channels: Option<String>,
    #[serde(default, deserialize_with = "text_or_json", skip_serializing_if = "Option::is_none")]
    pub changes: Option<String>,
    #[serde(default, deserialize_with = "text_or_json", skip_serializing_if = "Option::is_none")]
    pub revenue_projection: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Placeholder {
    pub error: String,
    pub pricing: String,
    pub marketing_copy: String,
    pub value_proposition: String,
    pub revenue_projection: String,
}

/// Models sometimes nest objects or lists under a field; keep those as compact JSON text.
fn text_or_json<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    })
}

/// Keys owned by the `Analysis` wire shape; a model reply may not supply them.
const RESERVED_KEYS: &[&str] = &["kind"];

/// Parse the span between the first `{` and the last `}`; anything else is unstructured.
pub fn parse_model_output(text: &str) -> Analysis {
    if let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) {
        if start < end {
            match serde_json::from_str::<QuarterAnalysis>(&text[start..=end]) {
                Ok(mut parsed) => {
                    for key in RESERVED_KEYS {
                        if parsed.extra.remove(*key).is_some() {
                            debug!("Dropped reserved key {:?} from model output", key);
                        }
                    }
                    return Analysis::Structured(parsed);
                }
                Err(e) => debug!("Model output is not valid JSON: {}", e),
            }
        }
    }
    Analysis::Unstructured {
        raw_analysis: text.to_string(),
    }
}

/// Everything the analyzer needs to know about one quarter.
pub struct AnalysisRequest<'a> {
    pub content: &'a str,
    pub date: &'a str,
    pub quarter: &'a QuarterKey,
    pub is_first: bool,
}

#[async_trait]
pub trait Analyzer: Send + Sync {
    async fn analyze(&self, request: &AnalysisRequest<'_>) -> Analysis;
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<Message<'a>>,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: Option<String>,
}

/// Anthropic Messages API client. No request timeout and no retries.
pub struct AnthropicClient {
    client: reqwest::Client,
    config: AnthropicConfig,
}

impl AnthropicClient {
    pub fn new(config: &AnthropicConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config: config.clone(),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.config.api_key.is_some()
    }

    /// Single-turn completion returning the concatenated text blocks.
    pub async fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String> {
        let Some(api_key) = self.config.api_key.as_deref() else {
            bail!("ANTHROPIC_API_KEY environment variable not set");
        };

        let body = MessagesRequest {
            model: &self.config.model,
            max_tokens,
            messages: vec![Message {
                role: "user",
                content: prompt,
            }],
        };

        let response = self
            .client
            .post(format!("{}/v1/messages", self.config.base_url))
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .context("Failed to reach summarization service")?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            bail!("summarization service returned {}: {}", status, detail);
        }

        let parsed: MessagesResponse = response
            .json()
            .await
            .context("Malformed summarization response")?;

        response_text(parsed)
    }
}

/// Join the text blocks. A reply with no text block at all is an error; an empty one is not.
fn response_text(response: MessagesResponse) -> Result<String> {
    let blocks: Vec<String> = response
        .content
        .into_iter()
        .filter_map(|block| block.text)
        .collect();

    if blocks.is_empty() {
        bail!("summarization response contained no text");
    }
    Ok(blocks.join("\n"))
}

#[async_trait]
impl Analyzer for AnthropicClient {
    async fn analyze(&self, request: &AnalysisRequest<'_>) -> Analysis {
        if !self.is_configured() {
            return Analysis::not_configured();
        }

        let prompt = prompt::build(
            request.content,
            request.date,
            request.quarter,
            request.is_first,
        );

        match self.complete(&prompt, self.config.max_tokens).await {
            Ok(text) => parse_model_output(&text),
            Err(e) => {
                warn!("Analysis failed for {}: {:#}", request.quarter, e);
                Analysis::Failed {
                    error: format!("{:#}", e),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn request(quarter: &QuarterKey) -> AnalysisRequest<'_> {
        AnalysisRequest {
            content: "Title: Acme",
            date: "2021-01-15",
            quarter,
            is_first: true,
        }
    }

    #[test]
    fn json_embedded_in_chatter() {
        let out = parse_model_output("Sure! {\"marketing_copy\": \"Buy now\"} Hope that helps");
        assert_eq!(
            out,
            Analysis::Structured(QuarterAnalysis {
                marketing_copy: Some("Buy now".to_string()),
                ..Default::default()
            })
        );
        assert_eq!(
            serde_json::to_value(&out).unwrap(),
            json!({"kind": "structured", "marketing_copy": "Buy now"})
        );
    }

    #[test]
    fn fenced_json_with_nested_values() {
        let text = "```json\n{\"distribution_channels\": \"Direct website\", \
                    \"revenue_projection\": {\"monthly\": \"$10k-$50k\"}, \"confidence\": 0.4}\n```";
        let Analysis::Structured(a) = parse_model_output(text) else {
            panic!("expected structured");
        };
        assert_eq!(a.distribution_channels.as_deref(), Some("Direct website"));
        assert_eq!(a.revenue_projection.as_deref(), Some(r#"{"monthly":"$10k-$50k"}"#));
        assert_eq!(a.extra.get("confidence"), Some(&json!(0.4)));
    }

    #[test]
    fn model_cannot_override_kind() {
        let out = parse_model_output(r#"{"kind": "sarcastic", "marketing_copy": "Buy now"}"#);
        let Analysis::Structured(a) = &out else {
            panic!("expected structured");
        };
        assert!(a.extra.is_empty());
        let wire = serde_json::to_string(&out).unwrap();
        assert_eq!(wire.matches("\"kind\"").count(), 1);
        assert_eq!(serde_json::to_value(&out).unwrap()["kind"], "structured");
    }

    #[test]
    fn empty_reply_text_is_unstructured() {
        let reply: MessagesResponse =
            serde_json::from_value(json!({"content": [{"type": "text", "text": ""}]})).unwrap();
        let text = response_text(reply).unwrap();
        assert_eq!(
            parse_model_output(&text),
            Analysis::Unstructured {
                raw_analysis: String::new()
            }
        );
    }

    #[test]
    fn reply_without_text_blocks_is_error() {
        let reply: MessagesResponse = serde_json::from_value(json!({"content": []})).unwrap();
        assert!(response_text(reply).is_err());
    }

    #[test]
    fn text_blocks_joined() {
        let reply: MessagesResponse = serde_json::from_value(json!({
            "content": [{"type": "text", "text": "a"}, {"type": "tool_use"}, {"type": "text", "text": "b"}]
        }))
        .unwrap();
        assert_eq!(response_text(reply).unwrap(), "a\nb");
    }

    #[test]
    fn no_braces_is_unstructured() {
        let out = parse_model_output("I could not find any pricing.");
        assert_eq!(
            serde_json::to_value(&out).unwrap(),
            json!({"kind": "unstructured", "raw_analysis": "I could not find any pricing."})
        );
    }

    #[test]
    fn broken_json_is_unstructured() {
        let text = "Here: {\"marketing_copy\": \"unterminated} done";
        assert!(matches!(
            parse_model_output(text),
            Analysis::Unstructured { raw_analysis } if raw_analysis == text
        ));
    }

    #[test]
    fn reversed_braces_are_unstructured() {
        assert!(matches!(
            parse_model_output("} nothing {"),
            Analysis::Unstructured { .. }
        ));
    }

    #[test]
    fn placeholder_fields_serialized() {
        let v = serde_json::to_value(Analysis::not_configured()).unwrap();
        assert_eq!(v["kind"], "not_configured");
        assert_eq!(v["error"], "ANTHROPIC_API_KEY environment variable not set");
        for field in ["pricing", "marketing_copy", "value_proposition", "revenue_projection"] {
            assert_eq!(v[field], "API key not configured");
        }
    }

    #[test]
    fn distribution_channels_only_from_structured() {
        let structured = parse_model_output(r#"{"distribution_channels": "Retail"}"#);
        assert_eq!(structured.distribution_channels(), Some("Retail"));
        assert_eq!(Analysis::not_configured().distribution_channels(), None);
    }

    #[tokio::test]
    async fn unconfigured_client_never_calls_out() {
        // Port 9 on localhost is not listening; a request would surface as Failed.
        let client = AnthropicClient::new(&AnthropicConfig {
            api_key: None,
            base_url: "http://127.0.0.1:9".to_string(),
            ..Default::default()
        });
        let quarter = QuarterKey::from_timestamp("20210115000000");
        assert_eq!(
            client.analyze(&request(&quarter)).await,
            Analysis::not_configured()
        );
    }

    #[tokio::test]
    async fn transport_failure_becomes_failed() {
        let client = AnthropicClient::new(&AnthropicConfig {
            api_key: Some("sk-test".to_string()),
            base_url: "http://127.0.0.1:9".to_string(),
            ..Default::default()
        });
        let quarter = QuarterKey::from_timestamp("20210115000000");
        let out = client.analyze(&request(&quarter)).await;
        assert!(matches!(out, Analysis::Failed { error } if error.contains("summarization")));
    }
}
