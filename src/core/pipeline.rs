//! Initialization pipeline
//!
//! Runs once per page lifetime:
//! 1. Check the assistant credential
//! 2. Load the catalog, degrading to an empty snapshot on any failure
//! 3. Compose the system instruction
//! 4. Open the assistant session and post the welcome message
//!
//! The status only moves forward. `Ready` and `Failed` are terminal and make
//! every later `run` a no-op.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::catalog::{CatalogGateway, CatalogSnapshot};
use crate::config::prompts::{compose_system_instruction, welcome_message};
use crate::config::{prompts_builtin, CatalogAccess, Config};
use crate::conversation::{ConversationLog, ConversationMessage};
use crate::providers::{AssistantError, AssistantService, SessionHandle, ToolConfig};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum PipelineStatus {
    /// Not started yet
    Blocked,
    LoadingCatalog,
    ComposingPrompt,
    OpeningSession,
    Ready,
    Failed(String),
}

impl PipelineStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineStatus::Ready | PipelineStatus::Failed(_))
    }

    pub fn is_ready(&self) -> bool {
        *self == PipelineStatus::Ready
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStatus::Blocked => "blocked",
            PipelineStatus::LoadingCatalog => "loading_catalog",
            PipelineStatus::ComposingPrompt => "composing_prompt",
            PipelineStatus::OpeningSession => "opening_session",
            PipelineStatus::Ready => "ready",
            PipelineStatus::Failed(_) => "failed",
        }
    }
}

/// Failures that end the pipeline
#[derive(Debug, thiserror::Error)]
pub enum PipelineFailure {
    #[error("credential missing")]
    ConfigurationMissing,

    #[error("Failed to initialize AI: {0}")]
    SessionCreationFailed(#[source] AssistantError),
}

/// Non-fatal catalog problem, surfaced in the welcome message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogAdvisory {
    NotConfigured,
    FetchFailed(String),
}

impl fmt::Display for CatalogAdvisory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CatalogAdvisory::NotConfigured => f.write_str(prompts_builtin::CATALOG_NOT_CONFIGURED),
            CatalogAdvisory::FetchFailed(error) => {
                f.write_str(&prompts_builtin::catalog_failed(error))
            }
        }
    }
}

pub struct InitializationPipeline {
    config: Config,
    catalog: Arc<dyn CatalogGateway>,
    assistant: Option<Arc<dyn AssistantService>>,
    status: PipelineStatus,
    status_message: String,
    session: Option<SessionHandle>,
    snapshot: Option<CatalogSnapshot>,
    advisory: Option<CatalogAdvisory>,
}

impl InitializationPipeline {
    pub fn new(
        config: Config,
        catalog: Arc<dyn CatalogGateway>,
        assistant: Option<Arc<dyn AssistantService>>,
    ) -> Self {
        Self {
            config,
            catalog,
            assistant,
            status: PipelineStatus::Blocked,
            status_message: prompts_builtin::STATUS_INITIALIZING.to_string(),
            session: None,
            snapshot: None,
            advisory: None,
        }
    }

    /// Drive the pipeline to a terminal status, posting the welcome or
    /// failure message to `log`
    pub async fn run(&mut self, log: &mut ConversationLog) -> &PipelineStatus {
        if self.status.is_terminal() {
            tracing::debug!("Initialization already finished ({})", self.status.as_str());
            return &self.status;
        }

        let assistant = match (&self.assistant, self.config.assistant_key()) {
            (Some(assistant), Some(_)) => Arc::clone(assistant),
            _ => {
                tracing::error!("Gemini API key is not configured; AudioGuide cannot operate");
                self.status_message = prompts_builtin::STATUS_KEY_MISSING.to_string();
                self.status = PipelineStatus::Failed(PipelineFailure::ConfigurationMissing.to_string());
                return &self.status;
            }
        };

        let loading = prompts_builtin::loading_catalog(self.config.store_domain());
        self.advance(PipelineStatus::LoadingCatalog, loading);
        let snapshot = self.load_catalog().await;

        self.advance(PipelineStatus::ComposingPrompt, prompts_builtin::STATUS_PREPARING);
        let instruction = compose_system_instruction(&snapshot);
        self.snapshot = Some(snapshot);

        self.advance(PipelineStatus::OpeningSession, prompts_builtin::STATUS_CONNECTING);
        match assistant
            .create_session(&instruction, ToolConfig::web_search())
            .await
        {
            Ok(session) => {
                tracing::info!("{} session {} ready", assistant.name(), session.id());
                let note = self.advisory.as_ref().map(ToString::to_string);
                log.push(ConversationMessage::assistant(welcome_message(note.as_deref())));
                self.session = Some(session);
                self.advance(PipelineStatus::Ready, prompts_builtin::STATUS_READY);
            }
            Err(e) => {
                let failure = PipelineFailure::SessionCreationFailed(e);
                let reason = failure.to_string();
                tracing::error!("Error initializing {} session: {}", assistant.name(), reason);
                log.push(ConversationMessage::system_error(reason.clone()));
                self.status_message = reason.clone();
                self.status = PipelineStatus::Failed(reason);
            }
        }

        &self.status
    }

    async fn load_catalog(&mut self) -> CatalogSnapshot {
        if self.config.catalog_access() == CatalogAccess::NotConfigured {
            tracing::warn!("{}", prompts_builtin::CATALOG_NOT_CONFIGURED_DETAIL);
            self.advisory = Some(CatalogAdvisory::NotConfigured);
            return CatalogSnapshot::empty();
        }

        let settings = &self.config.settings.catalog;
        match self.catalog.fetch_products(settings.fetch_count()).await {
            Ok(products) => {
                tracing::info!("Loaded {} products from the catalog", products.len());
                CatalogSnapshot::from_products(&products, settings)
            }
            Err(e) => {
                tracing::warn!("Catalog unavailable, continuing without products: {}", e);
                self.advisory = Some(CatalogAdvisory::FetchFailed(e.to_string()));
                CatalogSnapshot::empty()
            }
        }
    }

    fn advance(&mut self, status: PipelineStatus, message: impl Into<String>) {
        self.status_message = message.into();
        tracing::info!("Initialization: {} - {}", status.as_str(), self.status_message);
        self.status = status;
    }

    pub fn status(&self) -> &PipelineStatus {
        &self.status
    }

    pub fn status_message(&self) -> &str {
        &self.status_message
    }

    pub fn session(&self) -> Option<&SessionHandle> {
        self.session.as_ref()
    }

    pub fn snapshot(&self) -> Option<&CatalogSnapshot> {
        self.snapshot.as_ref()
    }

    #[cfg(test)]
    pub fn advisory(&self) -> Option<&CatalogAdvisory> {
        self.advisory.as_ref()
    }
}
