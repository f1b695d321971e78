//! Tunable settings loaded from an optional TOML file
//!
//! Every field has a default, so an empty file (or no file) is valid.
//!
//! ```toml
//! [assistant]
//! model = "gemini-2.5-flash"
//! timeout_secs = 120
//!
//! [catalog]
//! fetch_count = 25
//! overview_limit = 15
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;

use super::ConfigError;

/// Storefront API never returns more than this many records per request here
pub const MAX_FETCH_COUNT: usize = 25;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub assistant: AssistantSettings,

    #[serde(default)]
    pub catalog: CatalogSettings,
}

impl Settings {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        let settings: Settings = toml::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.catalog.fetch_count == 0 {
            return Err(ConfigError::Validation(
                "catalog.fetch_count must be at least 1".into(),
            ));
        }
        if self.assistant.model.trim().is_empty() {
            return Err(ConfigError::Validation("assistant.model is empty".into()));
        }
        Ok(())
    }
}

/// Assistant service settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantSettings {
    #[serde(default = "default_model")]
    pub model: String,

    /// Base URL of the generative language API
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_model() -> String {
    "gemini-2.5-flash".to_string()
}

fn default_endpoint() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_timeout() -> u64 {
    120
}

impl Default for AssistantSettings {
    fn default() -> Self {
        Self {
            model: default_model(),
            endpoint: default_endpoint(),
            timeout_secs: default_timeout(),
        }
    }
}

/// Catalog retrieval and overview settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogSettings {
    #[serde(default = "default_fetch_count")]
    pub fetch_count: usize,

    /// Products listed in the prompt overview
    #[serde(default = "default_overview_limit")]
    pub overview_limit: usize,

    #[serde(default = "default_description_chars")]
    pub description_chars: usize,

    #[serde(default = "default_tag_limit")]
    pub tag_limit: usize,

    #[serde(default = "default_api_version")]
    pub api_version: String,
}

impl CatalogSettings {
    pub fn fetch_count(&self) -> usize {
        self.fetch_count.min(MAX_FETCH_COUNT)
    }
}

fn default_fetch_count() -> usize {
    MAX_FETCH_COUNT
}

fn default_overview_limit() -> usize {
    15
}

fn default_description_chars() -> usize {
    70
}

fn default_tag_limit() -> usize {
    3
}

fn default_api_version() -> String {
    "2024-07".to_string()
}

impl Default for CatalogSettings {
    fn default() -> Self {
        Self {
            fetch_count: default_fetch_count(),
            overview_limit: default_overview_limit(),
            description_chars: default_description_chars(),
            tag_limit: default_tag_limit(),
            api_version: default_api_version(),
        }
    }
}
