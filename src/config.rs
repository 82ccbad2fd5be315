use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

const DEFAULT_PORT: u16 = 5000;
const DEFAULT_MODEL: &str = "claude-sonnet-4-5-20250929";
const DEFAULT_ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
const CDX_SEARCH_URL: &str = "http://web.archive.org/cdx/search/cdx";
const WAYBACK_WEB_URL: &str = "https://web.archive.org/web";
const ARCHIVE_TIMEOUT: Duration = Duration::from_secs(30);

/// Raw environment values, before defaults are resolved.
#[derive(Debug, Default, Deserialize)]
struct Settings {
    anthropic_api_key: Option<String>,
    anthropic_model: Option<String>,
    anthropic_base_url: Option<String>,
    port: Option<u16>,
    static_dir: Option<String>,
}

/// Process-wide configuration, built once at startup and passed down by reference.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub static_dir: String,
    pub archive: ArchiveConfig,
    pub anthropic: AnthropicConfig,
}

#[derive(Debug, Clone)]
pub struct ArchiveConfig {
    pub cdx_url: String,
    pub web_url: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct AnthropicConfig {
    /// `None` when the credential is missing or blank.
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    pub max_tokens: u32,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            cdx_url: CDX_SEARCH_URL.to_string(),
            web_url: WAYBACK_WEB_URL.to_string(),
            timeout: ARCHIVE_TIMEOUT,
        }
    }
}

impl Default for AnthropicConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_ANTHROPIC_BASE_URL.to_string(),
            max_tokens: 2048,
        }
    }
}

impl Config {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_source(None)
    }

    /// Read configuration from an explicit variable map instead of the real environment.
    #[cfg(test)]
    pub fn from_vars(vars: HashMap<String, String>) -> Result<Self> {
        Self::from_source(Some(vars))
    }

    fn from_source(vars: Option<HashMap<String, String>>) -> Result<Self> {
        let settings: Settings = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .try_parsing(true)
                    .source(vars),
            )
            .build()
            .context("Failed to read environment")?
            .try_deserialize()
            .context("Invalid configuration")?;

        Ok(Self::from_settings(settings))
    }

    fn from_settings(s: Settings) -> Self {
        let defaults = AnthropicConfig::default();
        Self {
            host: "0.0.0.0".to_string(),
            port: s.port.unwrap_or(DEFAULT_PORT),
            static_dir: s.static_dir.unwrap_or_else(|| "static".to_string()),
            archive: ArchiveConfig::default(),
            anthropic: AnthropicConfig {
                api_key: s.anthropic_api_key.filter(|k| !k.trim().is_empty()),
                model: s.anthropic_model.unwrap_or(defaults.model),
                base_url: s
                    .anthropic_base_url
                    .map(|u| u.trim_end_matches('/').to_string())
                    .unwrap_or(defaults.base_url),
                max_tokens: defaults.max_tokens,
            },
        }
    }

    pub fn api_key_configured(&self) -> bool {
        self.anthropic.api_key.is_some()
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
