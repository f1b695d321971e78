//! API routes

use std::convert::Infallible;

use axum::{
    extract::State,
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        Json,
    },
    routing::{get, post},
    Router,
};
use futures::Stream;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::RecvError;

use crate::config::ConfigSummary;
use crate::conversation::ConversationMessage;
use crate::core::{ChatEvent, PipelineStatus, SendOutcome, ShopAssistant};
use crate::render;
use crate::AppState;

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
    message: String,
    ready: bool,
    products: usize,
    config: ConfigSummary,
}

/// A log entry with its display markup
#[derive(Debug, Serialize)]
struct MessageView {
    #[serde(flatten)]
    message: ConversationMessage,
    html: String,
    sources_html: String,
}

impl From<&ConversationMessage> for MessageView {
    fn from(message: &ConversationMessage) -> Self {
        Self {
            html: render::render_message(message),
            sources_html: message
                .citations
                .as_ref()
                .map(render::render_citations)
                .unwrap_or_default(),
            message: message.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
}

#[derive(Debug, Serialize)]
struct ChatResponse {
    #[serde(flatten)]
    outcome: SendOutcome,
    messages: Vec<MessageView>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn bad_request(error: &str) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: error.to_string(),
        }),
    )
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    let assistant = state.assistant.lock().await;
    Json(status_response(&assistant))
}

fn status_response(assistant: &ShopAssistant) -> StatusResponse {
    let status = assistant.status();
    StatusResponse {
        status: status.as_str(),
        reason: match status {
            PipelineStatus::Failed(reason) => Some(reason.clone()),
            _ => None,
        },
        message: assistant.status_message().to_string(),
        ready: status.is_ready(),
        products: assistant.snapshot().map_or(0, |s| s.products().len()),
        config: assistant.summary(),
    }
}

async fn messages(State(state): State<AppState>) -> Json<Vec<MessageView>> {
    let assistant = state.assistant.lock().await;
    Json(assistant.messages().iter().map(MessageView::from).collect())
}

async fn chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    if request.message.trim().is_empty() {
        return Err(bad_request("message must not be empty"));
    }

    let mut assistant = state.assistant.lock().await;
    let before = assistant.messages().len();
    let outcome = assistant.send(&request.message).await;

    Ok(Json(ChatResponse {
        outcome,
        messages: assistant.messages()[before..]
            .iter()
            .map(MessageView::from)
            .collect(),
    }))
}

type SseItem = Result<Event, Infallible>;

/// Step of the event relay loop
enum Relay {
    Event(ChatEvent),
    Skipped(u64),
    Done(Result<SendOutcome, tokio::task::JoinError>),
    Closed,
}

async fn chat_stream(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Sse<impl Stream<Item = SseItem>>, ApiError> {
    if request.message.trim().is_empty() {
        return Err(bad_request("message must not be empty"));
    }

    // Subscribe before the send starts so no event is missed
    let mut events = state.assistant.lock().await.subscribe();
    let assistant = state.assistant.clone();
    let mut send = tokio::spawn(async move {
        let mut assistant = assistant.lock().await;
        assistant.send(&request.message).await
    });

    let stream = async_stream::stream! {
        loop {
            let step = tokio::select! {
                biased;
                event = events.recv() => match event {
                    Ok(event) => Relay::Event(event),
                    Err(RecvError::Lagged(skipped)) => Relay::Skipped(skipped),
                    Err(RecvError::Closed) => Relay::Closed,
                },
                outcome = &mut send => Relay::Done(outcome),
            };

            match step {
                Relay::Event(event) => {
                    yield sse_event(event.kind(), &event);
                }
                Relay::Skipped(skipped) => {
                    tracing::warn!("SSE client lagged, {} events skipped", skipped);
                }
                Relay::Done(outcome) => {
                    while let Ok(event) = events.try_recv() {
                        yield sse_event(event.kind(), &event);
                    }
                    yield outcome_event(outcome);
                    break;
                }
                // Every buffered event has been relayed; the outcome may still be pending
                Relay::Closed => {
                    yield outcome_event((&mut send).await);
                    break;
                }
            }
        }
    };

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

fn outcome_event(outcome: Result<SendOutcome, tokio::task::JoinError>) -> SseItem {
    match outcome {
        Ok(outcome) => sse_event("done", &outcome),
        Err(e) => {
            tracing::error!("Send task failed: {}", e);
            Ok(Event::default().event("error").data(e.to_string()))
        }
    }
}

fn sse_event<T: Serialize>(name: &str, payload: &T) -> SseItem {
    let data = serde_json::to_string(payload).unwrap_or_else(|e| {
        tracing::error!("Could not serialize {} event: {}", name, e);
        "{}".to_string()
    });
    Ok(Event::default().event(name).data(data))
}

async fn reset(State(state): State<AppState>) -> Json<StatusResponse> {
    let mut assistant = state.assistant.lock().await;
    assistant.reset().await;
    Json(status_response(&assistant))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/v1/status", get(status))
        .route("/v1/messages", get(messages))
        .route("/v1/chat", post(chat))
        .route("/v1/chat/stream", post(chat_stream))
        .route("/v1/reset", post(reset))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::Value;
    use tower::ServiceExt;

    use super::*;
    use crate::providers::{AssistantService, Fragment};
    use crate::testing::{self, MockAssistant, MockCatalog};

    async fn app(reply: Vec<Result<Fragment, String>>) -> (Router, testing::CallLog) {
        let calls = testing::call_log();
        let service: Arc<dyn AssistantService> =
            Arc::new(MockAssistant::new(calls.clone()).replying(reply));
        let catalog = Arc::new(MockCatalog::with_products(testing::products(2), calls.clone()));
        let mut assistant = ShopAssistant::new(testing::config(), catalog, Some(service));
        assistant.initialize().await;

        let state = AppState::new(assistant);
        (router().with_state(state), calls)
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _) = app(Vec::new()).await;
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["status"], "ok");
    }

    #[tokio::test]
    async fn test_status_reports_ready() {
        let (app, _) = app(Vec::new()).await;
        let response = app
            .oneshot(Request::builder().uri("/v1/status").body(Body::empty()).unwrap())
            .await
            .unwrap();

        let body = json_body(response).await;
        assert_eq!(body["status"], "ready");
        assert_eq!(body["ready"], true);
        assert_eq!(body["message"], "AudioGuide is ready.");
        assert_eq!(body["products"], 2);
        assert!(body.get("reason").is_none());
    }

    #[tokio::test]
    async fn test_chat_returns_rendered_messages() {
        let (app, calls) = app(vec![
            Ok(Fragment::text("Try the **Rega P3**")),
        ])
        .await;

        let response = app
            .oneshot(post_json("/v1/chat", serde_json::json!({ "message": "turntable?" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        assert_eq!(body["outcome"], "completed");
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["role"], "user");
        assert_eq!(messages[1]["html"], "Try the <strong>Rega P3</strong>");
        assert_eq!(messages[1]["sources_html"], "");
        assert_eq!(testing::calls(&calls).last(), Some(&"send_stream"));
    }

    #[tokio::test]
    async fn test_empty_message_is_bad_request() {
        let (app, calls) = app(Vec::new()).await;
        let response = app
            .oneshot(post_json("/v1/chat", serde_json::json!({ "message": "   " })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(!testing::calls(&calls).contains(&"send_stream"));
    }

    #[tokio::test]
    async fn test_messages_include_welcome() {
        let (app, _) = app(Vec::new()).await;
        let response = app
            .oneshot(Request::builder().uri("/v1/messages").body(Body::empty()).unwrap())
            .await
            .unwrap();

        let body = json_body(response).await;
        let messages = body.as_array().unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["role"], "assistant");
        assert!(messages[0]["html"].as_str().unwrap().starts_with("Welcome to Hifiisti!"));
    }

    #[tokio::test]
    async fn test_chat_stream_relays_events() {
        let (app, _) = app(vec![Ok(Fragment::text("Hel")), Ok(Fragment::text("lo"))]).await;
        let response = app
            .oneshot(post_json("/v1/chat/stream", serde_json::json!({ "message": "hi" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = String::from_utf8(bytes.to_vec()).unwrap();

        assert_eq!(body.matches("event: text_delta").count(), 2);
        assert!(body.contains("event: message_finalized"));
        let done = body.find("event: done").unwrap();
        assert!(body.find("event: message_finalized").unwrap() < done);
        assert!(body.contains(r#""outcome":"completed""#));
    }

    #[tokio::test]
    async fn test_chat_stream_ends_with_failed_outcome() {
        let (app, _) = app(vec![Ok(Fragment::text("Hel")), Err("connection reset".into())]).await;
        let response = app
            .oneshot(post_json("/v1/chat/stream", serde_json::json!({ "message": "hi" })))
            .await
            .unwrap();

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = String::from_utf8(bytes.to_vec()).unwrap();

        let done = body.rfind("event: done").unwrap();
        assert!(body.rfind("event: message_appended").unwrap() < done);
        assert!(body[done..].contains(r#""outcome":"failed""#));
    }

    #[tokio::test]
    async fn test_reset_returns_status() {
        let (app, calls) = app(Vec::new()).await;
        let response = app
            .oneshot(Request::builder().method("POST").uri("/v1/reset").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(json_body(response).await["status"], "ready");
        assert_eq!(
            testing::calls(&calls),
            vec![
                "fetch_products",
                "create_session",
                "close_session",
                "fetch_products",
                "create_session",
            ]
        );
    }
}
