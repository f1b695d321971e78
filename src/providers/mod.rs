//! Assistant service integrations
//!
//! A provider opens conversational sessions bound to one system instruction
//! and streams replies back as [`Fragment`]s.

mod gemini;
mod sse;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::config::Config;
use crate::conversation::CitationSet;

pub use gemini::GeminiService;

#[derive(Debug, Error)]
pub enum AssistantError {
    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request failed: {0}")]
    RequestFailed(#[source] reqwest::Error),

    #[error("API error: {0}")]
    Api(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Unknown session: {0}")]
    UnknownSession(Uuid),

    #[error("Stream error: {0}")]
    Stream(String),
}

impl From<reqwest::Error> for AssistantError {
    /// Request URLs are dropped; error text ends up in the conversation
    fn from(e: reqwest::Error) -> Self {
        AssistantError::RequestFailed(e.without_url())
    }
}

/// Capabilities enabled for a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ToolConfig {
    pub web_search: bool,
}

impl ToolConfig {
    pub fn web_search() -> Self {
        Self { web_search: true }
    }
}

/// Opaque reference to an open conversational session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionHandle {
    id: Uuid,
    created_at: DateTime<Utc>,
}

impl SessionHandle {
    pub(crate) fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebChunk {
    #[serde(default)]
    pub uri: String,
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroundingChunk {
    #[serde(default)]
    pub web: Option<WebChunk>,
}

/// Grounding metadata as reported by the service
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroundingMetadata {
    #[serde(default)]
    pub grounding_chunks: Vec<GroundingChunk>,
}

impl GroundingMetadata {
    /// Web sources in order; chunks without a uri are skipped
    pub fn citations(&self) -> CitationSet {
        let mut citations = CitationSet::new();
        for web in self.grounding_chunks.iter().filter_map(|c| c.web.as_ref()) {
            if !web.uri.is_empty() {
                citations.push(web.uri.clone(), web.title.as_deref());
            }
        }
        citations
    }
}

/// One incremental unit of a streamed reply
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fragment {
    pub text: Option<String>,
    pub grounding: Option<GroundingMetadata>,
}

impl Fragment {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            grounding: None,
        }
    }

    pub fn grounding(metadata: GroundingMetadata) -> Self {
        Self {
            text: None,
            grounding: Some(metadata),
        }
    }
}

pub type FragmentStream = BoxStream<'static, Result<Fragment, AssistantError>>;

#[async_trait]
pub trait AssistantService: Send + Sync {
    fn name(&self) -> &str;

    async fn create_session(
        &self,
        system_instruction: &str,
        tools: ToolConfig,
    ) -> Result<SessionHandle, AssistantError>;

    async fn send_stream(
        &self,
        session: &SessionHandle,
        text: &str,
    ) -> Result<FragmentStream, AssistantError>;

    /// Release the state held for a session. Unknown handles are ignored.
    async fn close_session(&self, session: &SessionHandle);
}

/// Build the assistant service for a config; `None` when no usable key is set
pub fn from_config(config: &Config) -> Result<Option<Arc<dyn AssistantService>>, AssistantError> {
    let Some(key) = config.assistant_key() else {
        return Ok(None);
    };
    let service: Arc<dyn AssistantService> =
        Arc::new(GeminiService::new(key, &config.settings.assistant)?);
    Ok(Some(service))
}
