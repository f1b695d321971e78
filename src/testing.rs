//! Scripted in-memory gateways shared by the unit tests

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::stream;

use crate::catalog::{CatalogError, CatalogGateway, Product};
use crate::config::Config;
use crate::providers::{
    AssistantError, AssistantService, Fragment, FragmentStream, SessionHandle, ToolConfig,
};

/// Names of gateway calls in the order they were made
pub type CallLog = Arc<Mutex<Vec<&'static str>>>;

pub fn call_log() -> CallLog {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn calls(log: &CallLog) -> Vec<&'static str> {
    log.lock().unwrap().clone()
}

pub fn config() -> Config {
    Config::new(Some("test-key"), Some("hifisti.myshopify.com"), Some("shpat_test"))
}

pub fn products(n: usize) -> Vec<Product> {
    (0..n)
        .map(|i| Product {
            id: format!("gid://shopify/Product/{}", i),
            handle: format!("amp-{}", i),
            title: format!("Amplifier {}", i),
            product_type: "Amplifier".into(),
            ..Default::default()
        })
        .collect()
}

pub struct MockCatalog {
    result: Result<Vec<Product>, String>,
    calls: CallLog,
}

impl MockCatalog {
    pub fn with_products(products: Vec<Product>, calls: CallLog) -> Self {
        Self {
            result: Ok(products),
            calls,
        }
    }

    pub fn failing(message: &str, calls: CallLog) -> Self {
        Self {
            result: Err(message.to_string()),
            calls,
        }
    }
}

#[async_trait]
impl CatalogGateway for MockCatalog {
    async fn fetch_products(&self, count: usize) -> Result<Vec<Product>, CatalogError> {
        self.calls.lock().unwrap().push("fetch_products");
        match &self.result {
            Ok(products) => Ok(products.iter().take(count).cloned().collect()),
            Err(message) => Err(CatalogError::InvalidResponse(message.clone())),
        }
    }
}

pub struct MockAssistant {
    calls: CallLog,
    session_error: Option<String>,
    reply: Vec<Result<Fragment, String>>,
    instructions: Mutex<Vec<String>>,
    tools: Mutex<Vec<ToolConfig>>,
}

impl MockAssistant {
    pub fn new(calls: CallLog) -> Self {
        Self {
            calls,
            session_error: None,
            reply: vec![Ok(Fragment::text("Hi!"))],
            instructions: Mutex::new(Vec::new()),
            tools: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_session(mut self, message: &str) -> Self {
        self.session_error = Some(message.to_string());
        self
    }

    /// Items yielded, in order, by every `send_stream`
    pub fn replying(mut self, reply: Vec<Result<Fragment, String>>) -> Self {
        self.reply = reply;
        self
    }

    /// System instructions passed to `create_session`
    pub fn instructions(&self) -> Vec<String> {
        self.instructions.lock().unwrap().clone()
    }

    /// Capabilities passed to `create_session`
    pub fn tools(&self) -> Vec<ToolConfig> {
        self.tools.lock().unwrap().clone()
    }
}

#[async_trait]
impl AssistantService for MockAssistant {
    fn name(&self) -> &str {
        "Mock"
    }

    async fn create_session(
        &self,
        system_instruction: &str,
        tools: ToolConfig,
    ) -> Result<SessionHandle, AssistantError> {
        self.calls.lock().unwrap().push("create_session");
        self.tools.lock().unwrap().push(tools);
        self.instructions
            .lock()
            .unwrap()
            .push(system_instruction.to_string());
        match &self.session_error {
            Some(message) => Err(AssistantError::Api(message.clone())),
            None => Ok(SessionHandle::new()),
        }
    }

    async fn send_stream(
        &self,
        _session: &SessionHandle,
        _text: &str,
    ) -> Result<FragmentStream, AssistantError> {
        self.calls.lock().unwrap().push("send_stream");
        let items: Vec<Result<Fragment, AssistantError>> = self
            .reply
            .iter()
            .cloned()
            .map(|item| item.map_err(AssistantError::Stream))
            .collect();
        Ok(Box::pin(stream::iter(items)))
    }

    async fn close_session(&self, _session: &SessionHandle) {
        self.calls.lock().unwrap().push("close_session");
    }
}
