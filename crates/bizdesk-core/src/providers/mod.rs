//! LLM provider abstraction
//!
//! Providers implement [`LlmProvider`]. The OpenAI-compatible client covers
//! hosted and self-hosted endpoints; [`ModelRouter`] wraps one or more of them
//! with retries and failover.

pub mod openai;
pub mod router;
pub mod scripted;
pub mod types;

pub use openai::OpenAiProvider;
pub use router::ModelRouter;
pub use scripted::{ScriptedProvider, Step};
pub use types::{
    ChatBlock, ChatMessage, ChatMessageContent, ChatResponse, ChatResponseBlock, ChatRole,
    LlmProvider, StopReason,
};
