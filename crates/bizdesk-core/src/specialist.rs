//! Specialist tool loop
//!
//! A specialist is one LLM scoped to the tools of its server. Each run is a
//! short bounded loop: the model may call tools for a few rounds, the final
//! round is offered no tools so it has to answer in text.

use anyhow::Result;
use futures_util::future::join_all;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::apps::{AppDefinition, Fallback, SpecialistDef};
use crate::providers::{ChatBlock, ChatMessage, ChatMessageContent, ChatRole, LlmProvider};
use crate::supervisor::{conversation_context, last_user_text};
use crate::tools::{FilteredToolExecutor, ToolExecutor};
use crate::trace::{Trace, TraceEvent};

/// Reply used when the model produced no usable text
pub const NO_REPLY: &str = "I couldn't process that request. Please try again.";

const OUTPUT_TRUNCATED: &str = "\n[Output truncated]";

#[derive(Debug, Clone, Copy)]
pub struct SpecialistConfig {
    /// LLM calls per run, the last one without tools
    pub max_rounds: usize,
    pub max_tool_calls_per_turn: usize,
    pub max_output_bytes: usize,
}

impl Default for SpecialistConfig {
    fn default() -> Self {
        Self {
            max_rounds: 3,
            max_tool_calls_per_turn: 4,
            max_output_bytes: 100_000,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SpecialistReply {
    pub reply: String,
    pub trace: Vec<TraceEvent>,
}

/// Cut `output` to at most `max` bytes on a char boundary
pub fn truncate_output(mut output: String, max: usize) -> String {
    if output.len() <= max {
        return output;
    }
    let mut cut = max;
    while !output.is_char_boundary(cut) {
        cut -= 1;
    }
    output.truncate(cut);
    output.push_str(OUTPUT_TRUNCATED);
    output
}

pub struct Specialist {
    def: &'static SpecialistDef,
    provider: Arc<dyn LlmProvider>,
    tools: FilteredToolExecutor,
    config: SpecialistConfig,
    context: usize,
}

impl Specialist {
    /// `executor` serves the specialist's tool server; anything outside the
    /// server's tool list is refused.
    pub fn new(
        def: &'static SpecialistDef,
        provider: Arc<dyn LlmProvider>,
        executor: Arc<dyn ToolExecutor>,
        config: SpecialistConfig,
        context: usize,
    ) -> Self {
        let tools = FilteredToolExecutor::new(executor, &def.server.tool_names());
        Self {
            def,
            provider,
            tools,
            config,
            context,
        }
    }

    pub fn id(&self) -> &'static str {
        self.def.id
    }

    pub async fn run(&self, turns: &[ChatMessage]) -> Result<SpecialistReply> {
        let mut trace = Trace::new();
        let reply = self.run_traced(turns, &mut trace).await?;
        Ok(SpecialistReply {
            reply,
            trace: trace.into_events(),
        })
    }

    /// Run the loop, recording tool calls, results and the reply into `trace`
    pub async fn run_traced(&self, turns: &[ChatMessage], trace: &mut Trace) -> Result<String> {
        let agent = self.def.id;
        let offered = self.tools.list_tools();
        let mut conversation = conversation_context(turns, self.context);
        let rounds = self.config.max_rounds.max(1);

        for round in 1..=rounds {
            let last = round == rounds;
            let tools = if last { &[][..] } else { &offered[..] };
            debug!("{} round {} ({} tools offered)", agent, round, tools.len());

            let response = self.provider.chat(&conversation, tools, self.def.prompt).await?;
            let calls: Vec<(String, String, Value)> = response
                .tool_calls()
                .map(|(id, name, input)| (id.to_string(), name.to_string(), input.clone()))
                .collect();

            if calls.is_empty() || last {
                if !calls.is_empty() {
                    warn!("{} asked for tools on its final round, ignoring", agent);
                }
                let text = response.text().trim().to_string();
                let reply = if text.is_empty() { NO_REPLY.to_string() } else { text };
                trace.push(TraceEvent::reply(agent, &reply));
                info!("{} replied after {} round(s)", agent, round);
                return Ok(reply);
            }

            let mut blocks = Vec::new();
            let text = response.text();
            if !text.trim().is_empty() {
                blocks.push(ChatBlock::Text { text });
            }
            for (id, name, input) in &calls {
                trace.push(TraceEvent::tool_call(agent, name, input.clone()));
                blocks.push(ChatBlock::ToolCall {
                    id: id.clone(),
                    name: name.clone(),
                    input: input.clone(),
                });
            }
            conversation.push(ChatMessage {
                role: ChatRole::Assistant,
                content: ChatMessageContent::Blocks(blocks),
            });

            let budget = self.config.max_tool_calls_per_turn;
            let outputs = join_all(
                calls
                    .iter()
                    .enumerate()
                    .map(|(i, (_, name, input))| self.call_tool(i, budget, name, input.clone())),
            )
            .await;

            let mut results = Vec::with_capacity(calls.len());
            for ((id, name, _), output) in calls.iter().zip(outputs) {
                trace.push(TraceEvent::tool_result(agent, name, &output));
                results.push(ChatBlock::ToolResult {
                    tool_call_id: id.clone(),
                    content: output,
                });
            }
            conversation.push(ChatMessage {
                role: ChatRole::User,
                content: ChatMessageContent::Blocks(results),
            });
        }

        Ok(NO_REPLY.to_string())
    }

    async fn call_tool(&self, index: usize, budget: usize, name: &str, input: Value) -> String {
        if index >= budget {
            warn!("{}: tool call {} over the per-turn budget of {}", self.def.id, name, budget);
            return format!(
                "Error: at most {} tool calls are allowed per turn; {} was not executed",
                budget, name
            );
        }
        let output = match self.tools.execute(name, input).await {
            Ok(output) => output,
            Err(e) => {
                warn!("{}: tool {} failed: {}", self.def.id, name, e);
                format!("Error: {}", e)
            }
        };
        truncate_output(output, self.config.max_output_bytes)
    }
}

/// Answer with the app's fallback when no specialist was chosen
pub async fn run_fallback(
    app: &'static AppDefinition,
    provider: &dyn LlmProvider,
    turns: &[ChatMessage],
    trace: &mut Trace,
) -> String {
    let id = app.fallback.id();
    let reply = match app.fallback {
        Fallback::Static { reply, .. } => reply.to_string(),
        Fallback::General {
            prompt,
            guidance,
            min_chars,
            max_tokens,
            ..
        } => {
            let text = last_user_text(turns);
            if text.chars().count() < min_chars {
                guidance.to_string()
            } else {
                let context = conversation_context(turns, app.specialist_context);
                match provider.chat_capped(&context, &[], prompt, max_tokens).await {
                    Ok(response) if !response.text().trim().is_empty() => {
                        response.text().trim().to_string()
                    }
                    Ok(_) => guidance.to_string(),
                    Err(e) => {
                        warn!("{}: general answer failed: {}", id, e);
                        guidance.to_string()
                    }
                }
            }
        }
    };
    trace.push(TraceEvent::reply(id, &reply));
    reply
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apps::{finance, fusion, hr};
    use crate::providers::{ScriptedProvider, Step};
    use crate::tools::ToolRegistry;
    use bizdesk_store::Store;
    use serde_json::json;

    fn math_specialist(steps: Vec<Step>, config: SpecialistConfig) -> (Specialist, Arc<ScriptedProvider>) {
        let store = Store::open_in_memory().unwrap();
        let def = fusion::APP.specialist("math_agent").unwrap();
        let registry = Arc::new(ToolRegistry::for_server(def.server, &store));
        let provider = Arc::new(ScriptedProvider::new(steps));
        (Specialist::new(def, provider.clone(), registry, config, 10), provider)
    }

    #[tokio::test]
    async fn test_tool_round_then_answer() {
        let (specialist, provider) = math_specialist(
            vec![
                Step::tool_call("math_add", json!({"a": 2, "b": 3})),
                Step::text("2 + 3 = 5"),
            ],
            SpecialistConfig::default(),
        );
        let out = specialist.run(&[ChatMessage::user("add 2 and 3")]).await.unwrap();
        assert_eq!(out.reply, "2 + 3 = 5");
        assert_eq!(out.trace.len(), 3);
        assert!(matches!(&out.trace[0], TraceEvent::ToolCall { tool, .. } if tool == "math_add"));
        match &out.trace[1] {
            TraceEvent::ToolResult { result, .. } => assert_eq!(result["result"], 5.0),
            other => panic!("unexpected event {:?}", other),
        }

        let calls = provider.calls();
        assert_eq!(calls[0].tools.len(), fusion::APP.specialist("math_agent").unwrap().server.tools.len());
        // the tool result went back as a user message of blocks
        assert!(calls[1].messages.last().unwrap().has_tool_blocks());
    }

    #[tokio::test]
    async fn test_disallowed_tool_and_budget() {
        let (specialist, provider) = math_specialist(
            vec![
                Step::tool_calls(vec![
                    ("execute_query", json!({"query": "DELETE FROM users"})),
                    ("math_multiply", json!({"a": 4, "b": 5})),
                    ("math_power", json!({"base": 2, "exponent": 3})),
                ]),
                Step::text("done"),
            ],
            SpecialistConfig {
                max_tool_calls_per_turn: 2,
                ..Default::default()
            },
        );
        let out = specialist.run(&[ChatMessage::user("go")]).await.unwrap();
        let results: Vec<&Value> = out
            .trace
            .iter()
            .filter_map(|e| match e {
                TraceEvent::ToolResult { result, .. } => Some(result),
                _ => None,
            })
            .collect();
        assert_eq!(results.len(), 3);
        assert!(results[0].as_str().unwrap().starts_with("Error: Tool 'execute_query' is not available"));
        assert_eq!(results[1]["result"], 20.0);
        assert!(results[2].as_str().unwrap().contains("not executed"));
        assert_eq!(provider.remaining(), 0);
    }

    #[tokio::test]
    async fn test_last_round_offers_no_tools() {
        let (specialist, provider) = math_specialist(
            vec![
                Step::tool_call("math_add", json!({"a": 1, "b": 1})),
                Step::tool_call("math_add", json!({"a": 2, "b": 2})),
                Step::tool_call("math_add", json!({"a": 3, "b": 3})),
            ],
            SpecialistConfig::default(),
        );
        let out = specialist.run(&[ChatMessage::user("keep adding")]).await.unwrap();
        assert_eq!(out.reply, NO_REPLY);

        let calls = provider.calls();
        assert_eq!(calls.len(), 3);
        assert!(!calls[1].tools.is_empty());
        assert!(calls[2].tools.is_empty());
    }

    #[tokio::test]
    async fn test_history_tool_blocks_are_stripped() {
        let (specialist, provider) = math_specialist(vec![Step::text("ok")], SpecialistConfig::default());
        let history = vec![
            ChatMessage::user("first"),
            ChatMessage {
                role: ChatRole::User,
                content: ChatMessageContent::Blocks(vec![ChatBlock::ToolResult {
                    tool_call_id: "x".into(),
                    content: "{}".into(),
                }]),
            },
            ChatMessage::assistant("earlier answer"),
            ChatMessage::user("second"),
        ];
        specialist.run(&history).await.unwrap();
        let sent = &provider.calls()[0].messages;
        assert_eq!(sent.len(), 3);
        assert!(sent.iter().all(|m| !m.has_tool_blocks()));
    }

    #[test]
    fn test_truncate_output() {
        assert_eq!(truncate_output("short".into(), 10), "short");
        let long = "₹".repeat(10);
        let cut = truncate_output(long, 7);
        assert_eq!(cut, format!("₹₹{}", OUTPUT_TRUNCATED));
    }

    #[tokio::test]
    async fn test_fallbacks() {
        let provider = ScriptedProvider::new(vec![Step::text("Working capital is current assets minus current liabilities.")]);
        let mut trace = Trace::new();

        let reply = run_fallback(&finance::APP, &provider, &[ChatMessage::user("hi")], &mut trace).await;
        assert_eq!(reply, finance::GUIDANCE_REPLY);
        assert!(provider.calls().is_empty());

        let turns = [ChatMessage::user("what is working capital?")];
        let reply = run_fallback(&finance::APP, &provider, &turns, &mut trace).await;
        assert!(reply.starts_with("Working capital"));
        assert_eq!(provider.calls()[0].max_tokens, Some(180));

        // exhausted script behaves like a provider outage
        let reply = run_fallback(&finance::APP, &provider, &turns, &mut trace).await;
        assert_eq!(reply, finance::GUIDANCE_REPLY);

        let reply = run_fallback(&hr::APP, &provider, &turns, &mut trace).await;
        assert_eq!(reply, hr::DEFAULT_REPLY);
        assert_eq!(trace.events().len(), 4);
    }
}
