//! Application configuration
//!
//! Environment values are read once, here, and validated into typed
//! credentials. Nothing else in the crate touches the environment.

pub mod prompts;
pub mod settings;

use std::env;
use std::path::PathBuf;

use serde::Serialize;

pub use prompts::builtin as prompts_builtin;
pub use settings::{AssistantSettings, CatalogSettings, Settings};

pub const ASSISTANT_KEY_VARS: [&str; 2] = ["API_KEY", "GEMINI_API_KEY"];
pub const SHOPIFY_DOMAIN_VAR: &str = "SHOPIFY_STORE_DOMAIN";
pub const SHOPIFY_TOKEN_VAR: &str = "SHOPIFY_STOREFRONT_ACCESS_TOKEN";

pub const ASSISTANT_KEY_PLACEHOLDER: &str = "YOUR_GEMINI_API_KEY";
pub const SHOPIFY_DOMAIN_PLACEHOLDER: &str = "YOUR_SHOPIFY_STORE_DOMAIN.myshopify.com";
pub const SHOPIFY_TOKEN_PLACEHOLDER: &str = "YOUR_SHOPIFY_STOREFRONT_ACCESS_TOKEN";

/// A configured secret or endpoint value
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    Absent,
    Placeholder,
    Valid(String),
}

impl Credential {
    /// Classify a raw value against its well-known placeholder
    pub fn classify(raw: Option<String>, placeholder: &str) -> Self {
        match raw.map(|v| v.trim().to_string()) {
            None => Credential::Absent,
            Some(v) if v.is_empty() => Credential::Absent,
            Some(v) if v == placeholder => Credential::Placeholder,
            Some(v) => Credential::Valid(v),
        }
    }

    pub fn value(&self) -> Option<&str> {
        match self {
            Credential::Valid(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, Credential::Valid(_))
    }
}

// Values are secrets; never print them.
impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credential::Absent => f.write_str("Absent"),
            Credential::Placeholder => f.write_str("Placeholder"),
            Credential::Valid(_) => f.write_str("Valid(***)"),
        }
    }
}

/// Storefront credentials once both halves are known to be real
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorefrontAccess {
    pub domain: String,
    pub access_token: String,
}

/// Outcome of validating the catalog credential pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogAccess {
    Configured(StorefrontAccess),
    /// Either value is absent or still the placeholder
    NotConfigured,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub assistant_key: Credential,
    pub shopify_domain: Credential,
    pub shopify_token: Credential,
    pub settings: Settings,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let assistant_key = ASSISTANT_KEY_VARS
            .iter()
            .find_map(|name| env::var(name).ok().filter(|v| !v.trim().is_empty()));

        let settings = match env::var("AUDIOGUIDE_CONFIG") {
            Ok(path) => Settings::from_file(&PathBuf::from(path))?,
            Err(_) => Settings::default(),
        };

        Ok(Self {
            host: env::var("HOST").unwrap_or_else(|_| "127.0.0.1".into()),
            port: env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(3000),
            assistant_key: Credential::classify(assistant_key, ASSISTANT_KEY_PLACEHOLDER),
            shopify_domain: Credential::classify(
                env::var(SHOPIFY_DOMAIN_VAR).ok(),
                SHOPIFY_DOMAIN_PLACEHOLDER,
            ),
            shopify_token: Credential::classify(
                env::var(SHOPIFY_TOKEN_VAR).ok(),
                SHOPIFY_TOKEN_PLACEHOLDER,
            ),
            settings,
        })
    }

    /// Build a config from explicit values; used by tests and embedders
    pub fn new(
        assistant_key: Option<&str>,
        shopify_domain: Option<&str>,
        shopify_token: Option<&str>,
    ) -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 3000,
            assistant_key: Credential::classify(
                assistant_key.map(str::to_string),
                ASSISTANT_KEY_PLACEHOLDER,
            ),
            shopify_domain: Credential::classify(
                shopify_domain.map(str::to_string),
                SHOPIFY_DOMAIN_PLACEHOLDER,
            ),
            shopify_token: Credential::classify(
                shopify_token.map(str::to_string),
                SHOPIFY_TOKEN_PLACEHOLDER,
            ),
            settings: Settings::default(),
        }
    }

    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    /// The assistant credential is mandatory; a placeholder counts as missing
    pub fn assistant_key(&self) -> Option<&str> {
        self.assistant_key.value()
    }

    pub fn catalog_access(&self) -> CatalogAccess {
        match (&self.shopify_domain, &self.shopify_token) {
            (Credential::Valid(domain), Credential::Valid(token)) => {
                CatalogAccess::Configured(StorefrontAccess {
                    domain: domain.clone(),
                    access_token: token.clone(),
                })
            }
            _ => CatalogAccess::NotConfigured,
        }
    }

    /// Domain shown in status messages
    pub fn store_domain(&self) -> &str {
        self.shopify_domain
            .value()
            .unwrap_or("Shopify domain not configured")
    }
}

/// Values safe to expose through the status endpoint
#[derive(Debug, Clone, Serialize)]
pub struct ConfigSummary {
    pub assistant_configured: bool,
    pub catalog_configured: bool,
    pub model: String,
}

impl From<&Config> for ConfigSummary {
    fn from(config: &Config) -> Self {
        Self {
            assistant_configured: config.assistant_key.is_valid(),
            catalog_configured: matches!(config.catalog_access(), CatalogAccess::Configured(_)),
            model: config.settings.assistant.model.clone(),
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),
}
