//! Core orchestration
//!
//! The initialization pipeline opens the assistant session; the chat session
//! streams replies over it. `ShopAssistant` ties the two together.

mod assistant;
mod chat;
mod pipeline;

pub use assistant::ShopAssistant;
pub use chat::{ChatEvent, SendOutcome};
pub use pipeline::PipelineStatus;
