use std::io::Read;

use async_trait::async_trait;
use flate2::read::GzDecoder;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::ArchiveConfig;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("archive returned status {0}")]
    Status(u16),
    #[error("failed to decode index response: {0}")]
    Decode(String),
    #[error("failed to decompress gzip payload: {0}")]
    Gzip(#[from] std::io::Error),
}

/// One capture listed by the CDX index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    /// 14-digit `YYYYMMDDHHMMSS` capture time.
    pub timestamp: String,
    pub original_url: String,
    pub status_code: u16,
}

impl Snapshot {
    pub fn new(timestamp: &str, original_url: &str, status_code: u16) -> Self {
        Self {
            timestamp: timestamp.to_string(),
            original_url: original_url.to_string(),
            status_code,
        }
    }
}

/// The two archive endpoints the timeline needs.
#[async_trait]
pub trait ArchiveSource: Send + Sync {
    /// List 200-status captures whose URL exactly matches `url`.
    async fn query_index(&self, url: &str) -> Result<Vec<Snapshot>, ArchiveError>;

    /// Fetch the raw (unrewritten) HTML of one capture.
    async fn fetch_page(&self, url: &str, timestamp: &str) -> Result<String, ArchiveError>;
}

/// Wayback Machine client: CDX search plus `id_` raw-capture fetches.
pub struct WaybackClient {
    client: reqwest::Client,
    config: ArchiveConfig,
}

impl WaybackClient {
    pub fn new(config: &ArchiveConfig) -> Result<Self, ArchiveError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("wayback_timeline/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    fn capture_url(&self, url: &str, timestamp: &str) -> String {
        format!("{}/{}id_/{}", self.config.web_url, timestamp, url)
    }
}

#[async_trait]
impl ArchiveSource for WaybackClient {
    async fn query_index(&self, url: &str) -> Result<Vec<Snapshot>, ArchiveError> {
        let response = self
            .client
            .get(&self.config.cdx_url)
            .query(&[
                ("url", url),
                ("matchType", "exact"),
                ("output", "json"),
                ("fl", "timestamp,original,statuscode"),
                ("filter", "statuscode:200"),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ArchiveError::Status(status.as_u16()));
        }

        let body = response.text().await?;
        parse_cdx_rows(&body)
    }

    async fn fetch_page(&self, url: &str, timestamp: &str) -> Result<String, ArchiveError> {
        let capture = self.capture_url(url, timestamp);
        debug!("Fetching capture {}", capture);

        let response = self.client.get(&capture).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ArchiveError::Status(status.as_u16()));
        }

        let bytes = response.bytes().await?;
        decode_body(&bytes)
    }
}

/// Parse a CDX `output=json` body: an array of string rows, the first being the header.
pub fn parse_cdx_rows(body: &str) -> Result<Vec<Snapshot>, ArchiveError> {
    if body.trim().is_empty() {
        return Ok(Vec::new());
    }

    let rows: Vec<Vec<String>> =
        serde_json::from_str(body).map_err(|e| ArchiveError::Decode(e.to_string()))?;

    let snapshots = rows
        .iter()
        .skip(1)
        .filter_map(|row| {
            let timestamp = row.first()?;
            let original = row.get(1)?;
            // fl order is timestamp,original,statuscode; a missing status means the filter held
            let status = match row.get(2) {
                Some(s) => s.parse::<u16>().ok()?,
                None => 200,
            };
            Some(Snapshot::new(timestamp, original, status))
        })
        .collect();

    Ok(snapshots)
}

/// Gunzip when the payload starts with the gzip magic number, then decode UTF-8 lossily.
pub fn decode_body(bytes: &[u8]) -> Result<String, ArchiveError> {
    if bytes.starts_with(&GZIP_MAGIC) {
        let mut inflated = Vec::new();
        GzDecoder::new(bytes).read_to_end(&mut inflated)?;
        return Ok(String::from_utf8_lossy(&inflated).into_owned());
    }
    Ok(String::from_utf8_lossy(bytes).into_owned())
}

/// Strip scheme prefixes and trailing slashes from user input.
pub fn normalize_domain(input: &str) -> String {
    let trimmed = input.trim();
    let bare = trimmed
        .strip_prefix("https://")
        .or_else(|| trimmed.strip_prefix("http://"))
        .unwrap_or(trimmed);
    bare.trim_end_matches('/').to_string()
}

fn has_scheme(domain: &str) -> bool {
    domain.starts_with("http://") || domain.starts_with("https://")
}

/// URL spellings under which the archive may have indexed the site.
pub fn query_variants(domain: &str) -> Vec<String> {
    let mut variants = vec![format!("{}/", domain), domain.to_string()];
    if !has_scheme(domain) {
        for scheme in ["http", "https"] {
            variants.push(format!("{}://{}", scheme, domain));
            variants.push(format!("{}://{}/", scheme, domain));
        }
    }
    variants
}

/// Query every spelling of `domain` and concatenate the results in variant order.
///
/// A failing variant is logged and skipped; an empty result is left for the caller to judge.
pub async fn collect_snapshots<A: ArchiveSource + ?Sized>(archive: &A, domain: &str) -> Vec<Snapshot> {
    let mut all = Vec::new();

    for variant in query_variants(domain) {
        debug!("Querying index for {}", variant);
        match archive.query_index(&variant).await {
            Ok(found) => {
                if !found.is_empty() {
                    info!("Found {} snapshots for {}", found.len(), variant);
                }
                all.extend(found);
            }
            Err(e) => {
                warn!("No snapshots for {}: {}", variant, e);
            }
        }
    }

    all
}
