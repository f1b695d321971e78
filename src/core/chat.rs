//! Streaming session manager
//!
//! Owns the conversation log. A send appends the user message, opens an
//! empty streaming assistant reply and folds fragments into it as they
//! arrive. Failures end up in the log as messages and are never returned to
//! the caller.

use std::sync::Arc;

use futures::StreamExt;
use serde::Serialize;
use tokio::sync::broadcast;

use crate::config::prompts_builtin;
use crate::conversation::{CitationSet, ConversationLog, ConversationMessage, MessageId};
use crate::providers::{AssistantError, AssistantService, SessionHandle};

/// Capacity of the event channel; slow subscribers lag rather than block
pub const EVENT_CAPACITY: usize = 256;

/// Log changes published to presentation layers
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatEvent {
    MessageAppended { message: ConversationMessage },
    TextDelta { id: MessageId, delta: String },
    MessageFinalized { message: ConversationMessage },
}

impl ChatEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            ChatEvent::MessageAppended { .. } => "message_appended",
            ChatEvent::TextDelta { .. } => "text_delta",
            ChatEvent::MessageFinalized { .. } => "message_finalized",
        }
    }
}

/// Result of one send
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SendOutcome {
    /// The reply streamed to completion
    Completed { message_id: MessageId },
    /// Nothing was sent to the service
    Rejected,
    /// The reply stream failed; the reply is marked as errored
    Failed { message_id: MessageId },
}

pub struct ChatSession {
    log: ConversationLog,
    assistant: Option<Arc<dyn AssistantService>>,
    events: broadcast::Sender<ChatEvent>,
}

impl ChatSession {
    pub fn new(
        assistant: Option<Arc<dyn AssistantService>>,
        events: broadcast::Sender<ChatEvent>,
    ) -> Self {
        Self {
            log: ConversationLog::new(),
            assistant,
            events,
        }
    }

    pub fn log(&self) -> &ConversationLog {
        &self.log
    }

    pub(crate) fn log_mut(&mut self) -> &mut ConversationLog {
        &mut self.log
    }

    /// Publish `MessageAppended` for every message from `start` onwards
    pub(crate) fn announce_from(&self, start: usize) {
        for message in self.log.messages().iter().skip(start) {
            self.publish(ChatEvent::MessageAppended {
                message: message.clone(),
            });
        }
    }

    /// Send user text over `session` and stream the reply into the log
    pub async fn send(&mut self, session: Option<&SessionHandle>, text: &str) -> SendOutcome {
        let text = text.trim();
        if text.is_empty() {
            return SendOutcome::Rejected;
        }

        let (Some(session), Some(assistant)) = (session, self.assistant.clone()) else {
            tracing::warn!("Send rejected: no open assistant session");
            return self.reject(prompts_builtin::SEND_REJECTED);
        };

        if let Some(current) = self.log.streaming_message() {
            tracing::warn!("Send rejected: reply {} is still streaming", current.id);
            return self.reject(prompts_builtin::SEND_IN_FLIGHT);
        }

        self.append(ConversationMessage::user(text));
        let reply_id = match self.log.begin_reply() {
            Ok(id) => id,
            Err(e) => {
                tracing::error!("Could not open reply: {}", e);
                return self.reject(prompts_builtin::SEND_IN_FLIGHT);
            }
        };
        self.announce_from(self.log.len() - 1);

        match self.stream_reply(assistant.as_ref(), session, reply_id, text).await {
            Ok(citations) => {
                match self.log.finalize(reply_id, citations) {
                    Ok(message) => {
                        tracing::debug!(
                            "Reply {} finished ({} chars, {} sources)",
                            reply_id,
                            message.text.len(),
                            message.citations.as_ref().map_or(0, CitationSet::len)
                        );
                        let message = message.clone();
                        self.publish(ChatEvent::MessageFinalized { message });
                        SendOutcome::Completed {
                            message_id: reply_id,
                        }
                    }
                    Err(e) => {
                        let error = AssistantError::Stream(e.to_string());
                        self.fail_reply(reply_id, &error);
                        SendOutcome::Failed {
                            message_id: reply_id,
                        }
                    }
                }
            }
            Err(e) => {
                self.fail_reply(reply_id, &e);
                SendOutcome::Failed {
                    message_id: reply_id,
                }
            }
        }
    }

    /// Fold fragments into the reply in arrival order. Returns the last
    /// non-empty citation set seen.
    async fn stream_reply(
        &mut self,
        assistant: &dyn AssistantService,
        session: &SessionHandle,
        reply_id: MessageId,
        text: &str,
    ) -> Result<Option<CitationSet>, AssistantError> {
        let mut fragments = assistant.send_stream(session, text).await?;
        let mut citations = None;

        while let Some(fragment) = fragments.next().await {
            let fragment = fragment?;

            if let Some(delta) = fragment.text.filter(|t| !t.is_empty()) {
                self.log
                    .append_text(reply_id, &delta)
                    .map_err(|e| AssistantError::Stream(e.to_string()))?;
                self.publish(ChatEvent::TextDelta {
                    id: reply_id,
                    delta,
                });
            }

            if let Some(grounding) = fragment.grounding {
                let sources = grounding.citations();
                if !sources.is_empty() {
                    citations = Some(sources);
                }
            }
        }

        Ok(citations)
    }

    fn fail_reply(&mut self, reply_id: MessageId, error: &AssistantError) {
        tracing::error!("Assistant reply {} failed: {}", reply_id, error);

        let reply_text = prompts_builtin::reply_failed(&error.to_string());
        match self.log.fail(reply_id, reply_text.clone()) {
            Ok(message) => {
                let message = message.clone();
                self.publish(ChatEvent::MessageFinalized { message });
            }
            Err(e) => tracing::error!("Could not mark reply as failed: {}", e),
        }

        self.append(ConversationMessage::system_error(
            prompts_builtin::stream_failed_notice(&reply_text),
        ));
    }

    fn reject(&mut self, text: &str) -> SendOutcome {
        self.append(ConversationMessage::system_error(text));
        SendOutcome::Rejected
    }

    fn append(&mut self, message: ConversationMessage) {
        self.log.push(message);
        self.announce_from(self.log.len() - 1);
    }

    fn publish(&self, event: ChatEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}
