//! bizdesk-core - Supervisor and specialist runtime for the bizdesk apps
//!
//! This crate provides:
//! - OpenAI-compatible LLM provider with retries, plus a scripted provider
//! - Tool system: declarative tool specs grouped into per-specialist servers
//! - The domain tool servers of every app (ecommerce, finance, hr, loan, fusion)
//! - Supervisor routing (tool handoff, label or keyword) with degradation
//! - Bounded specialist tool loop and the routing trace
//! - Thread memory with summarizing compaction
//! - The chat pipeline tying it together

pub mod apps;
pub mod memory;
pub mod pipeline;
pub mod providers;
pub mod specialist;
pub mod supervisor;
pub mod tools;
pub mod trace;

// Re-export main types for convenience
pub use apps::{APPS, AppDefinition, SpecialistDef, app};
pub use memory::{MemoryConfig, ThreadMemory};
pub use pipeline::{ChatError, ChatOutcome, ChatPipeline, PipelineConfig};
pub use providers::{ChatMessage, LlmProvider, ModelRouter, OpenAiProvider, ScriptedProvider};
pub use specialist::{Specialist, SpecialistConfig};
pub use supervisor::{RouteDecision, RouteMethod, RouteTarget, Supervisor};
pub use tools::{ToolDefinition, ToolExecutor, ToolHandler, ToolRegistry};
pub use trace::TraceEvent;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crate_exports() {
        let _ = std::mem::size_of::<ChatPipeline>();
        let _ = std::mem::size_of::<ThreadMemory>();
        let _ = std::mem::size_of::<ToolRegistry>();
        let _ = std::mem::size_of::<TraceEvent>();
        assert_eq!(APPS.len(), 6);
    }
}
