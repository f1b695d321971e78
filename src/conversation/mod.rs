//! Conversation types and state management
//!
//! The conversation log is append-only: messages are created, mutated in
//! place while an assistant reply streams, and finalized. They are never
//! removed.

use chrono::{DateTime, Utc};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(Uuid);

impl MessageId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single source the assistant used to ground a reply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    pub url: String,
    pub title: String,
}

/// Ordered list of sources attached to a finalized assistant message
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CitationSet(Vec<Citation>);

impl CitationSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a source. A missing or blank title falls back to the url's host.
    pub fn push(&mut self, url: impl Into<String>, title: Option<&str>) {
        let url = url.into();
        let title = match title.map(str::trim) {
            Some(t) if !t.is_empty() => t.to_string(),
            _ => host_of(&url),
        };
        self.0.push(Citation { url, title });
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Citation> {
        self.0.iter()
    }

    /// (url, title) pairs in order
    pub fn pairs(&self) -> Vec<(&str, &str)> {
        self.0
            .iter()
            .map(|c| (c.url.as_str(), c.title.as_str()))
            .collect()
    }
}

fn host_of(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_else(|| url.to_string())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub id: MessageId,
    pub role: Role,
    pub text: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub streaming: bool,
    #[serde(default)]
    pub error: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub citations: Option<CitationSet>,
}

impl ConversationMessage {
    fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            id: MessageId::new(),
            role,
            text: text.into(),
            created_at: Utc::now(),
            streaming: false,
            error: false,
            citations: None,
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, text)
    }

    pub fn system_error(text: impl Into<String>) -> Self {
        Self {
            error: true,
            ..Self::new(Role::System, text)
        }
    }

    /// Empty assistant reply that fragments will be folded into
    pub fn pending_reply() -> Self {
        Self {
            streaming: true,
            ..Self::new(Role::Assistant, String::new())
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum LogError {
    #[error("Message not found: {0}")]
    NotFound(MessageId),

    #[error("An assistant reply is already streaming: {0}")]
    ReplyInFlight(MessageId),

    #[error("Message is not streaming: {0}")]
    NotStreaming(MessageId),
}

/// Append-only conversation log with at most one streaming message
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConversationLog {
    messages: Vec<ConversationMessage>,
}

impl ConversationLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a finalized message
    pub fn push(&mut self, mut message: ConversationMessage) -> MessageId {
        message.streaming = false;
        let id = message.id;
        self.messages.push(message);
        id
    }

    /// Open a new streaming assistant reply
    pub fn begin_reply(&mut self) -> Result<MessageId, LogError> {
        if let Some(current) = self.streaming_message() {
            return Err(LogError::ReplyInFlight(current.id));
        }
        let message = ConversationMessage::pending_reply();
        let id = message.id;
        self.messages.push(message);
        Ok(id)
    }

    /// Append a text delta to a streaming reply
    pub fn append_text(&mut self, id: MessageId, delta: &str) -> Result<(), LogError> {
        let message = self.streaming_mut(id)?;
        message.text.push_str(delta);
        Ok(())
    }

    /// Close a streaming reply, attaching citations when any were captured
    pub fn finalize(
        &mut self,
        id: MessageId,
        citations: Option<CitationSet>,
    ) -> Result<&ConversationMessage, LogError> {
        let message = self.streaming_mut(id)?;
        message.streaming = false;
        message.citations = citations.filter(|c| !c.is_empty());
        Ok(message)
    }

    /// Close a streaming reply as errored, replacing its visible text
    pub fn fail(
        &mut self,
        id: MessageId,
        text: impl Into<String>,
    ) -> Result<&ConversationMessage, LogError> {
        let message = self.streaming_mut(id)?;
        message.streaming = false;
        message.error = true;
        message.text = text.into();
        Ok(message)
    }

    #[cfg(test)]
    pub fn get(&self, id: MessageId) -> Option<&ConversationMessage> {
        self.messages.iter().rev().find(|m| m.id == id)
    }

    fn get_mut(&mut self, id: MessageId) -> Option<&mut ConversationMessage> {
        self.messages.iter_mut().rev().find(|m| m.id == id)
    }

    fn streaming_mut(&mut self, id: MessageId) -> Result<&mut ConversationMessage, LogError> {
        let message = self.get_mut(id).ok_or(LogError::NotFound(id))?;
        if !message.streaming {
            return Err(LogError::NotStreaming(id));
        }
        Ok(message)
    }

    pub fn streaming_message(&self) -> Option<&ConversationMessage> {
        self.messages.iter().find(|m| m.streaming)
    }

    pub fn messages(&self) -> &[ConversationMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
