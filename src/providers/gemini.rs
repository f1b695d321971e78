//! Google Gemini provider
//!
//! The REST API is stateless, so a "session" is kept here: the system
//! instruction, the enabled tools and the chat history. Each send posts the
//! whole history to `streamGenerateContent` and parses the SSE body.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_stream::try_stream;
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::config::AssistantSettings;

use super::sse::SseBuffer;
use super::{
    AssistantError, AssistantService, Fragment, FragmentStream, GroundingMetadata, SessionHandle,
    ToolConfig,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GeminiContent {
    #[serde(default)]
    role: String,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

impl GeminiContent {
    fn user(text: &str) -> Self {
        Self {
            role: "user".to_string(),
            parts: vec![GeminiPart::text(text)],
        }
    }

    fn model(text: String) -> Self {
        Self {
            role: "model".to_string(),
            parts: vec![GeminiPart::text(text)],
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct GeminiPart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    /// Set on reasoning summaries, which are not part of the reply
    #[serde(default, skip_serializing_if = "Option::is_none")]
    thought: Option<bool>,
}

impl GeminiPart {
    fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            thought: None,
        }
    }
}

#[derive(Debug, Serialize)]
struct SystemInstruction<'a> {
    parts: Vec<TextPart<'a>>,
}

#[derive(Debug, Serialize)]
struct TextPart<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct GoogleSearch {}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiTool {
    google_search: GoogleSearch,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StreamRequest<'a> {
    contents: Vec<GeminiContent>,
    system_instruction: SystemInstruction<'a>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<GeminiTool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(default)]
    error: Option<GeminiErrorDetail>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    #[serde(default)]
    content: Option<GeminiContent>,
    #[serde(default)]
    grounding_metadata: Option<GroundingMetadata>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorBody {
    error: GeminiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorDetail {
    #[serde(default)]
    code: Option<u16>,
    message: String,
    #[serde(default)]
    status: Option<String>,
}

impl GeminiErrorDetail {
    fn into_error(self) -> AssistantError {
        let status = self.status.unwrap_or_default();
        match self.code {
            Some(code) if !status.is_empty() => {
                AssistantError::Api(format!("{} ({} {})", self.message, code, status))
            }
            _ => AssistantError::Api(self.message),
        }
    }
}

#[derive(Debug, Clone)]
struct GeminiSession {
    system_instruction: String,
    tools: ToolConfig,
    history: Vec<GeminiContent>,
}

pub struct GeminiService {
    client: Client,
    api_key: String,
    endpoint: String,
    model: String,
    sessions: Arc<Mutex<HashMap<Uuid, GeminiSession>>>,
}

impl GeminiService {
    pub fn new(api_key: impl Into<String>, settings: &AssistantSettings) -> Result<Self, AssistantError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(AssistantError::NotConfigured("Gemini API key is empty".into()));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            api_key,
            endpoint: settings.endpoint.trim_end_matches('/').to_string(),
            model: settings.model.clone(),
            sessions: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    /// The key travels in a header so it never appears in a request URL
    fn api_url(&self, path: &str, query: &str) -> String {
        if query.is_empty() {
            format!("{}{}", self.endpoint, path)
        } else {
            format!("{}{}?{}", self.endpoint, path, query)
        }
    }
}

const API_KEY_HEADER: &str = "x-goog-api-key";

#[async_trait]
impl AssistantService for GeminiService {
    fn name(&self) -> &str {
        "Gemini"
    }

    async fn create_session(
        &self,
        system_instruction: &str,
        tools: ToolConfig,
    ) -> Result<SessionHandle, AssistantError> {
        // Validates both the key and the model before any chat is attempted
        let response = self
            .client
            .get(self.api_url(&format!("/models/{}", self.model), ""))
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(error_from_body(status.as_u16(), &body));
        }

        let handle = SessionHandle::new();
        self.sessions.lock().await.insert(
            handle.id(),
            GeminiSession {
                system_instruction: system_instruction.to_string(),
                tools,
                history: Vec::new(),
            },
        );

        tracing::debug!("Opened Gemini session {} on {}", handle.id(), self.model);
        Ok(handle)
    }

    async fn send_stream(
        &self,
        session: &SessionHandle,
        text: &str,
    ) -> Result<FragmentStream, AssistantError> {
        let id = session.id();
        let state = self
            .sessions
            .lock()
            .await
            .get(&id)
            .cloned()
            .ok_or(AssistantError::UnknownSession(id))?;

        let user_turn = GeminiContent::user(text);
        let mut contents = state.history.clone();
        contents.push(user_turn.clone());

        let request = StreamRequest {
            contents,
            system_instruction: SystemInstruction {
                parts: vec![TextPart {
                    text: &state.system_instruction,
                }],
            },
            tools: tools_for(state.tools),
        };

        let url = self.api_url(
            &format!("/models/{}:streamGenerateContent", self.model),
            "alt=sse",
        );

        let response = self
            .client
            .post(url)
            .header(API_KEY_HEADER, &self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(error_from_body(status.as_u16(), &body));
        }

        let fragments = decode_fragments(response.bytes_stream());
        let stream = record_turn(fragments, Arc::clone(&self.sessions), id, user_turn);

        Ok(Box::pin(stream))
    }

    async fn close_session(&self, session: &SessionHandle) {
        if self.sessions.lock().await.remove(&session.id()).is_some() {
            tracing::debug!("Closed Gemini session {}", session.id());
        }
    }
}

fn tools_for(tools: ToolConfig) -> Vec<GeminiTool> {
    if tools.web_search {
        vec![GeminiTool {
            google_search: GoogleSearch {},
        }]
    } else {
        Vec::new()
    }
}

fn error_from_body(status: u16, body: &str) -> AssistantError {
    match serde_json::from_str::<GeminiErrorBody>(body) {
        Ok(parsed) => parsed.error.into_error(),
        Err(_) => AssistantError::Api(format!("Gemini API error ({}): {}", status, body)),
    }
}

/// Pass fragments through, appending the turn to the session history once
/// the stream completes
fn record_turn<S>(
    fragments: S,
    sessions: Arc<Mutex<HashMap<Uuid, GeminiSession>>>,
    id: Uuid,
    user_turn: GeminiContent,
) -> impl Stream<Item = Result<Fragment, AssistantError>> + Send
where
    S: Stream<Item = Result<Fragment, AssistantError>> + Send + 'static,
{
    try_stream! {
        let mut fragments = Box::pin(fragments);
        let mut reply = String::new();

        while let Some(fragment) = fragments.next().await {
            let fragment = fragment?;
            if let Some(ref delta) = fragment.text {
                reply.push_str(delta);
            }
            yield fragment;
        }

        // Failed turns are not recorded
        if let Some(session) = sessions.lock().await.get_mut(&id) {
            session.history.push(user_turn);
            session.history.push(GeminiContent::model(reply));
        }
    }
}

/// Turn an SSE response body into fragments
fn decode_fragments<S, B, E>(bytes: S) -> impl Stream<Item = Result<Fragment, AssistantError>> + Send
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send,
    E: Into<AssistantError> + Send,
{
    try_stream! {
        let mut bytes = Box::pin(bytes);
        let mut sse = SseBuffer::new();

        while let Some(chunk) = bytes.next().await {
            let chunk = chunk.map_err(Into::<AssistantError>::into)?;
            sse.push_bytes(chunk.as_ref());
            while let Some(data) = sse.next_event() {
                if let Some(fragment) = parse_chunk(&data)? {
                    yield fragment;
                }
            }
        }

        if let Some(data) = sse.finish() {
            if let Some(fragment) = parse_chunk(&data)? {
                yield fragment;
            }
        }
    }
}

/// Parse one streamed response object. `None` when it carries nothing.
fn parse_chunk(data: &str) -> Result<Option<Fragment>, AssistantError> {
    let response: GeminiResponse = serde_json::from_str(data).map_err(|e| {
        AssistantError::InvalidResponse(format!("Failed to parse stream chunk: {} - Data: {}", e, data))
    })?;

    if let Some(error) = response.error {
        return Err(error.into_error());
    }

    let Some(candidate) = response.candidates.into_iter().next() else {
        return Ok(None);
    };

    if let Some(ref reason) = candidate.finish_reason {
        tracing::debug!("Gemini finish reason: {}", reason);
    }

    let text: String = candidate
        .content
        .map(|c| {
            c.parts
                .into_iter()
                .filter(|p| !p.thought.unwrap_or(false))
                .filter_map(|p| p.text)
                .collect()
        })
        .unwrap_or_default();

    let fragment = Fragment {
        text: Some(text).filter(|t| !t.is_empty()),
        grounding: candidate.grounding_metadata,
    };

    if fragment.text.is_none() && fragment.grounding.is_none() {
        Ok(None)
    } else {
        Ok(Some(fragment))
    }
}
