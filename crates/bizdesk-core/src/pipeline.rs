//! Chat pipeline: memory, supervisor, specialist, memory again

use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{error, info, warn};

use bizdesk_store::Store;

use crate::apps::AppDefinition;
use crate::memory::{Summarizer, ThreadMemory};
use crate::providers::{ChatMessage, LlmProvider};
use crate::specialist::{Specialist, SpecialistConfig, run_fallback};
use crate::supervisor::{RouteDecision, RouteMethod, RouteTarget, Supervisor};
use crate::tools::{ToolExecutor, ToolRegistry};
use crate::trace::{Trace, TraceEvent};

const INTERNAL_ERROR_REPLY: &str = "I could not complete that request due to an internal \
processing error. Please retry with valid inputs. If it persists, check supervisor logs.";

#[derive(Debug, Error)]
pub enum ChatError {
    #[error(
        "Supervisor cannot continue because one or more specialist tool servers are unreachable: {}. Start them with `bizdesk serve-tools` and retry.",
        .0.join(", ")
    )]
    SpecialistUnavailable(Vec<String>),

    #[error(
        "Supervisor timed out after {0}s while processing the request. This is usually caused by slow LLM responses or an unavailable specialist tool server."
    )]
    SupervisorTimeout(u64),

    #[error("Message is empty")]
    EmptyMessage,

    #[error("Supervisor failed: {0:#}")]
    Supervisor(anyhow::Error),
}

impl ChatError {
    /// Stable error name for API payloads
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SpecialistUnavailable(_) => "SpecialistUnavailable",
            Self::SupervisorTimeout(_) => "SupervisorTimeout",
            Self::EmptyMessage => "InvalidInput",
            Self::Supervisor(_) => "SupervisorGraphError",
        }
    }

    /// What the user sees in place of a reply
    pub fn user_reply(&self) -> String {
        match self {
            Self::Supervisor(_) => INTERNAL_ERROR_REPLY.to_string(),
            Self::EmptyMessage => "Please type a message.".to_string(),
            other => other.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_supervisor_timeout")]
    pub supervisor_timeout_secs: u64,
    #[serde(default = "default_max_rounds")]
    pub max_rounds: usize,
    #[serde(default = "default_max_tool_calls")]
    pub max_tool_calls_per_turn: usize,
    #[serde(default = "default_max_output_bytes")]
    pub max_output_bytes: usize,
}

fn default_supervisor_timeout() -> u64 {
    95
}

fn default_max_rounds() -> usize {
    3
}

fn default_max_tool_calls() -> usize {
    4
}

fn default_max_output_bytes() -> usize {
    100_000
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            supervisor_timeout_secs: default_supervisor_timeout(),
            max_rounds: default_max_rounds(),
            max_tool_calls_per_turn: default_max_tool_calls(),
            max_output_bytes: default_max_output_bytes(),
        }
    }
}

impl PipelineConfig {
    fn specialist(&self) -> SpecialistConfig {
        SpecialistConfig {
            max_rounds: self.max_rounds,
            max_tool_calls_per_turn: self.max_tool_calls_per_turn,
            max_output_bytes: self.max_output_bytes,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RouteInfo {
    /// Specialist or fallback id
    pub to: String,
    pub label: String,
    pub method: RouteMethod,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatOutcome {
    pub thread_id: String,
    pub final_reply: String,
    pub route: RouteInfo,
    pub trace: Vec<TraceEvent>,
    /// Conversation as the specialist saw it, plus the reply
    pub messages: Vec<ChatMessage>,
}

/// `default_answer` becomes `Default Answer`
fn display_name(id: &str) -> String {
    id.split('_')
        .filter(|w| !w.is_empty())
        .map(crate::tools::fmt::title)
        .collect::<Vec<_>>()
        .join(" ")
}

pub struct ChatPipeline {
    app: &'static AppDefinition,
    supervisor: Supervisor,
    provider: Arc<dyn LlmProvider>,
    executors: HashMap<&'static str, Arc<dyn ToolExecutor>>,
    memory: Arc<ThreadMemory>,
    summarizer: Option<Arc<dyn Summarizer>>,
    config: PipelineConfig,
}

impl ChatPipeline {
    /// `executors` maps specialist ids to the executor of their tool server
    pub fn new(
        app: &'static AppDefinition,
        provider: Arc<dyn LlmProvider>,
        executors: HashMap<&'static str, Arc<dyn ToolExecutor>>,
        memory: Arc<ThreadMemory>,
    ) -> Self {
        Self {
            app,
            supervisor: Supervisor::new(app, provider.clone()),
            provider,
            executors,
            memory,
            summarizer: None,
            config: PipelineConfig::default(),
        }
    }

    /// Every tool server runs in process against `store`
    pub fn local(
        app: &'static AppDefinition,
        provider: Arc<dyn LlmProvider>,
        store: &Store,
        memory: Arc<ThreadMemory>,
    ) -> Self {
        let executors = app
            .specialists
            .iter()
            .map(|s| {
                let registry: Arc<dyn ToolExecutor> =
                    Arc::new(ToolRegistry::for_server(s.server, store));
                (s.id, registry)
            })
            .collect();
        Self::new(app, provider, executors, memory)
    }

    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_summarizer(mut self, summarizer: Arc<dyn Summarizer>) -> Self {
        self.summarizer = Some(summarizer);
        self
    }

    pub fn app(&self) -> &'static AppDefinition {
        self.app
    }

    pub fn memory(&self) -> &Arc<ThreadMemory> {
        &self.memory
    }

    pub async fn chat(&self, thread_id: &str, text: &str) -> Result<ChatOutcome, ChatError> {
        self.chat_with_events(thread_id, text, None).await
    }

    /// Like [`chat`](Self::chat), mirroring trace events to `live` as they happen
    pub async fn chat_with_events(
        &self,
        thread_id: &str,
        text: &str,
        live: Option<UnboundedSender<TraceEvent>>,
    ) -> Result<ChatOutcome, ChatError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        info!("{}: chat on thread {} ({} chars)", self.app.title, thread_id, text.len());

        let down = self.unreachable().await;
        if !down.is_empty() {
            warn!("{}: unreachable tool servers: {}", self.app.title, down.join(", "));
            return Err(ChatError::SpecialistUnavailable(down));
        }

        let mut turns = self
            .memory
            .context_for(thread_id)
            .await
            .map_err(ChatError::Supervisor)?;
        turns.push(ChatMessage::user(text));

        let mut trace = match live {
            Some(tx) => Trace::with_live(tx),
            None => Trace::new(),
        };

        let limit = self.config.supervisor_timeout_secs;
        let run = self.route_and_answer(&turns, &mut trace);
        let (decision, reply) = match tokio::time::timeout(Duration::from_secs(limit), run).await {
            Ok(Ok(done)) => done,
            Ok(Err(e)) => {
                error!("{}: pipeline error: {:#}", self.app.title, e);
                return Err(ChatError::Supervisor(e));
            }
            Err(_) => {
                error!("{}: timed out after {}s", self.app.title, limit);
                return Err(ChatError::SupervisorTimeout(limit));
            }
        };

        if let Err(e) = self
            .memory
            .append_turn(thread_id, text, &reply, self.summarizer.as_deref())
            .await
        {
            warn!("{}: failed to save thread {}: {}", self.app.title, thread_id, e);
        }

        let route = self.route_info(&decision);
        turns.push(ChatMessage::assistant(reply.clone()));
        Ok(ChatOutcome {
            thread_id: thread_id.to_string(),
            final_reply: reply,
            route,
            trace: trace.into_events(),
            messages: turns,
        })
    }

    async fn route_and_answer(
        &self,
        turns: &[ChatMessage],
        trace: &mut Trace,
    ) -> anyhow::Result<(RouteDecision, String)> {
        let decision = self.supervisor.route(turns).await;
        let info = self.route_info(&decision);
        trace.push(TraceEvent::route(info.label, info.method.as_str()));

        let reply = match decision.target {
            RouteTarget::Specialist(id) => {
                let def = self
                    .app
                    .specialist(id)
                    .ok_or_else(|| anyhow::anyhow!("Unknown specialist {}", id))?;
                let executor = self
                    .executors
                    .get(id)
                    .cloned()
                    .ok_or_else(|| anyhow::anyhow!("No tool server wired for {}", id))?;
                let specialist = Specialist::new(
                    def,
                    self.provider.clone(),
                    executor,
                    self.config.specialist(),
                    self.app.specialist_context,
                );
                specialist.run_traced(turns, trace).await?
            }
            RouteTarget::Fallback => run_fallback(self.app, self.provider.as_ref(), turns, trace).await,
        };
        Ok((decision, reply))
    }

    fn route_info(&self, decision: &RouteDecision) -> RouteInfo {
        let to = decision.target_id(self.app);
        let label = match decision.target {
            RouteTarget::Specialist(id) => self
                .app
                .specialist(id)
                .map(|s| s.label.to_string())
                .unwrap_or_else(|| display_name(id)),
            RouteTarget::Fallback => display_name(to),
        };
        RouteInfo {
            to: to.to_string(),
            label,
            method: decision.method,
        }
    }

    /// Specialists whose tool server does not answer, as `id (reason)`
    async fn unreachable(&self) -> Vec<String> {
        let checks = self.app.specialists.iter().filter_map(|s| {
            let executor = self.executors.get(s.id)?.clone();
            Some(async move { (s.id, executor.health().await) })
        });
        join_all(checks)
            .await
            .into_iter()
            .filter_map(|(id, result)| result.err().map(|e| format!("{} ({})", id, e)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apps::{ecommerce, finance, hr};
    use crate::memory::MemoryConfig;
    use crate::providers::{ScriptedProvider, Step};
    use anyhow::anyhow;
    use async_trait::async_trait;
    use bizdesk_store::AppKind;
    use serde_json::{Value, json};

    async fn store_for(kind: AppKind) -> Store {
        let store = Store::open_in_memory().unwrap();
        store.initialize(kind).await.unwrap();
        store
    }

    fn memory() -> Arc<ThreadMemory> {
        Arc::new(ThreadMemory::in_memory(MemoryConfig::default()))
    }

    #[tokio::test]
    async fn test_keyword_app_end_to_end() {
        let store = store_for(AppKind::Finance).await;
        let provider = Arc::new(ScriptedProvider::new(vec![
            Step::tool_call("get_trial_balance", json!({})),
            Step::text("The trial balance is balanced."),
        ]));
        let pipeline = ChatPipeline::local(&finance::APP, provider.clone(), &store, memory());

        let outcome = pipeline.chat("t1", "Show me the trial balance").await.unwrap();
        assert_eq!(outcome.final_reply, "The trial balance is balanced.");
        assert_eq!(outcome.route.to, "gl_agent");
        assert_eq!(outcome.route.method, RouteMethod::Keyword);

        let kinds: Vec<&str> = outcome
            .trace
            .iter()
            .map(|e| match e {
                TraceEvent::Route { .. } => "route",
                TraceEvent::ToolCall { .. } => "tool_call",
                TraceEvent::ToolResult { .. } => "tool_result",
                TraceEvent::Reply { .. } => "reply",
            })
            .collect();
        assert_eq!(kinds, vec!["route", "tool_call", "tool_result", "reply"]);
        assert_eq!(
            serde_json::to_value(&outcome.trace[0]).unwrap(),
            json!({"type": "route", "to": "General Ledger", "method": "keyword"})
        );
        assert_eq!(outcome.messages.len(), 2);

        // the exchange is remembered for the next turn
        let ctx = pipeline.memory().context_for("t1").await.unwrap();
        assert_eq!(ctx.len(), 2);
    }

    #[tokio::test]
    async fn test_fallback_reply_and_history() {
        let store = store_for(AppKind::Hr).await;
        let provider = Arc::new(ScriptedProvider::new(vec![
            Step::tool_call("transfer_to_default_answer", json!({})),
            Step::fail("rate limited"),
        ]));
        let pipeline = ChatPipeline::local(&hr::APP, provider.clone(), &store, memory());

        let outcome = pipeline.chat("t", "hello").await.unwrap();
        assert_eq!(outcome.final_reply, hr::DEFAULT_REPLY);
        assert_eq!(outcome.route.label, "Default Answer");

        // second turn: the llm is down and nothing matches
        let outcome = pipeline.chat("t", "thanks").await.unwrap();
        assert_eq!(outcome.route.method, RouteMethod::Default);
        let sent = &provider.calls()[1].messages;
        assert_eq!(sent.len(), 3);
        assert_eq!(sent[0].text(), "hello");
    }

    #[tokio::test]
    async fn test_specialist_llm_error_is_a_supervisor_error() {
        let store = store_for(AppKind::Ecommerce).await;
        let provider = Arc::new(ScriptedProvider::new(vec![Step::fail("upstream 500")]));
        let pipeline = ChatPipeline::local(&ecommerce::APP, provider, &store, memory());

        let err = pipeline.chat("t", "I need a refund").await.unwrap_err();
        assert_eq!(err.kind(), "SupervisorGraphError");
        assert!(err.user_reply().starts_with("I could not complete that request"));
        assert!(pipeline.memory().load("t").await.unwrap().messages.is_empty());

        let err = pipeline.chat("t", "   ").await.unwrap_err();
        assert_eq!(err.kind(), "InvalidInput");
    }

    struct Down;

    #[async_trait]
    impl ToolExecutor for Down {
        async fn execute(&self, _: &str, _: Value) -> anyhow::Result<String> {
            Err(anyhow!("unreachable"))
        }

        fn list_tools(&self) -> Vec<crate::tools::ToolDefinition> {
            Vec::new()
        }

        async fn health(&self) -> anyhow::Result<()> {
            Err(anyhow!("127.0.0.1:8103 refused"))
        }
    }

    #[tokio::test]
    async fn test_unreachable_tool_server() {
        let store = store_for(AppKind::Ecommerce).await;
        let provider = Arc::new(ScriptedProvider::new(vec![]));
        let mut executors: HashMap<&'static str, Arc<dyn ToolExecutor>> = HashMap::new();
        for s in ecommerce::APP.specialists {
            executors.insert(s.id, Arc::new(ToolRegistry::for_server(s.server, &store)));
        }
        executors.insert("loyalty_agent", Arc::new(Down));
        let pipeline = ChatPipeline::new(&ecommerce::APP, provider, executors, memory());

        let err = pipeline.chat("t", "where is my order").await.unwrap_err();
        assert_eq!(err.kind(), "SpecialistUnavailable");
        assert!(err.user_reply().contains("loyalty_agent (127.0.0.1:8103 refused)"));
    }

    struct Slow;

    #[async_trait]
    impl LlmProvider for Slow {
        fn provider_name(&self) -> &str {
            "slow"
        }

        fn model(&self) -> &str {
            "slow"
        }

        async fn chat(
            &self,
            _: &[ChatMessage],
            _: &[crate::tools::ToolDefinition],
            _: &str,
        ) -> anyhow::Result<crate::providers::ChatResponse> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Err(anyhow!("unreachable"))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout() {
        let store = store_for(AppKind::Hr).await;
        let pipeline = ChatPipeline::local(&hr::APP, Arc::new(Slow), &store, memory());
        let err = pipeline.chat("t", "list open jobs").await.unwrap_err();
        assert_eq!(err.kind(), "SupervisorTimeout");
        assert!(err.to_string().starts_with("Supervisor timed out after 95s"));
    }

    #[test]
    fn test_display_name() {
        assert_eq!(display_name("default_answer"), "Default Answer");
        assert_eq!(display_name("guidance"), "Guidance");
    }
}
