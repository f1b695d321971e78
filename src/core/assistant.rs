//! Page-level facade wiring the pipeline's session into the chat

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::catalog::{CatalogGateway, CatalogSnapshot};
use crate::config::{Config, ConfigSummary};
use crate::conversation::ConversationMessage;
use crate::providers::AssistantService;

use super::chat::{ChatEvent, ChatSession, SendOutcome, EVENT_CAPACITY};
use super::pipeline::{InitializationPipeline, PipelineStatus};

pub struct ShopAssistant {
    config: Config,
    catalog: Arc<dyn CatalogGateway>,
    assistant: Option<Arc<dyn AssistantService>>,
    pipeline: InitializationPipeline,
    chat: ChatSession,
    events: broadcast::Sender<ChatEvent>,
}

impl ShopAssistant {
    pub fn new(
        config: Config,
        catalog: Arc<dyn CatalogGateway>,
        assistant: Option<Arc<dyn AssistantService>>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let pipeline =
            InitializationPipeline::new(config.clone(), Arc::clone(&catalog), assistant.clone());
        let chat = ChatSession::new(assistant.clone(), events.clone());

        Self {
            config,
            catalog,
            assistant,
            pipeline,
            chat,
            events,
        }
    }

    /// Run the initialization pipeline; a no-op once it has finished
    pub async fn initialize(&mut self) -> &PipelineStatus {
        let before = self.chat.log().len();
        self.pipeline.run(self.chat.log_mut()).await;
        self.chat.announce_from(before);
        self.pipeline.status()
    }

    pub async fn send(&mut self, text: &str) -> SendOutcome {
        self.chat.send(self.pipeline.session(), text).await
    }

    /// Drop the session and the log, then initialize again
    pub async fn reset(&mut self) -> &PipelineStatus {
        tracing::info!("Reinitializing AudioGuide");
        if let (Some(assistant), Some(session)) = (&self.assistant, self.pipeline.session()) {
            assistant.close_session(session).await;
        }
        self.pipeline = InitializationPipeline::new(
            self.config.clone(),
            Arc::clone(&self.catalog),
            self.assistant.clone(),
        );
        self.chat = ChatSession::new(self.assistant.clone(), self.events.clone());
        self.initialize().await
    }

    pub fn status(&self) -> &PipelineStatus {
        self.pipeline.status()
    }

    pub fn status_message(&self) -> &str {
        self.pipeline.status_message()
    }

    pub fn snapshot(&self) -> Option<&CatalogSnapshot> {
        self.pipeline.snapshot()
    }

    pub fn messages(&self) -> &[ConversationMessage] {
        self.chat.log().messages()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChatEvent> {
        self.events.subscribe()
    }

    pub fn summary(&self) -> ConfigSummary {
        ConfigSummary::from(&self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::Role;
    use crate::providers::Fragment;
    use crate::testing::{self, MockAssistant, MockCatalog};
    use tokio_test::assert_ok;

    fn assistant_with(calls: &testing::CallLog, reply: Vec<Result<Fragment, String>>) -> ShopAssistant {
        let service: Arc<dyn AssistantService> =
            Arc::new(MockAssistant::new(calls.clone()).replying(reply));
        let catalog = Arc::new(MockCatalog::with_products(testing::products(2), calls.clone()));
        ShopAssistant::new(testing::config(), catalog, Some(service))
    }

    #[tokio::test]
    async fn test_send_before_initialize_is_rejected() {
        let calls = testing::call_log();
        let mut shop = assistant_with(&calls, vec![Ok(Fragment::text("x"))]);

        assert_eq!(shop.send("hello").await, SendOutcome::Rejected);
        assert!(testing::calls(&calls).is_empty());
        assert_eq!(shop.messages().len(), 1);
        assert_eq!(shop.messages()[0].role, Role::System);
    }

    #[tokio::test]
    async fn test_initialize_then_send() {
        let calls = testing::call_log();
        let mut shop = assistant_with(&calls, vec![Ok(Fragment::text("Try the "))]);
        let mut events = shop.subscribe();

        assert!(shop.initialize().await.is_ready());
        let welcome = assert_ok!(events.try_recv());
        assert_eq!(welcome.kind(), "message_appended");

        let outcome = shop.send("Looking for a turntable").await;
        assert!(matches!(outcome, SendOutcome::Completed { .. }));
        assert_eq!(
            testing::calls(&calls),
            vec!["fetch_products", "create_session", "send_stream"]
        );
        assert_eq!(shop.messages().len(), 3);
        assert_eq!(shop.messages()[2].text, "Try the ");
    }

    #[tokio::test]
    async fn test_reset_reinitializes() {
        let calls = testing::call_log();
        let mut shop = assistant_with(&calls, vec![Ok(Fragment::text("ok"))]);

        shop.initialize().await;
        shop.send("hi").await;
        assert_eq!(shop.messages().len(), 3);

        assert!(shop.reset().await.is_ready());
        assert_eq!(shop.messages().len(), 1);
        assert_eq!(
            testing::calls(&calls),
            vec![
                "fetch_products",
                "create_session",
                "send_stream",
                "close_session",
                "fetch_products",
                "create_session",
            ]
        );
    }

    #[tokio::test]
    async fn test_reset_without_session_closes_nothing() {
        let calls = testing::call_log();
        let mut shop = assistant_with(&calls, Vec::new());

        shop.reset().await;
        assert_eq!(testing::calls(&calls), vec!["fetch_products", "create_session"]);
    }

    #[tokio::test]
    async fn test_summary_hides_secrets() {
        let shop = assistant_with(&testing::call_log(), Vec::new());
        let summary = serde_json::to_string(&shop.summary()).unwrap();
        assert!(!summary.contains("test-key"));
        assert!(summary.contains("\"assistant_configured\":true"));
    }
}
