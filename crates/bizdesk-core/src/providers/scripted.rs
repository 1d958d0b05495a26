//! Deterministic provider that replays a fixed script
//!
//! Used for offline runs and for exercising the supervisor, specialist and
//! pipeline without network access. Every request is recorded so callers can
//! inspect the prompts and tool lists that were sent.

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Mutex;

use crate::tools::ToolDefinition;

use super::types::{ChatMessage, ChatResponse, ChatResponseBlock, ChatUsage, LlmProvider, StopReason};

/// One scripted reply
#[derive(Debug, Clone)]
pub enum Step {
    Reply(Vec<ChatResponseBlock>),
    Fail(String),
}

impl Step {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Reply(vec![ChatResponseBlock::Text { text: text.into() }])
    }

    pub fn tool_call(name: &str, input: Value) -> Self {
        Self::tool_calls(vec![(name, input)])
    }

    pub fn tool_calls(calls: Vec<(&str, Value)>) -> Self {
        Self::Reply(
            calls
                .into_iter()
                .enumerate()
                .map(|(i, (name, input))| ChatResponseBlock::ToolCall {
                    id: format!("call_{}_{}", name, i),
                    name: name.to_string(),
                    input,
                })
                .collect(),
        )
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self::Fail(message.into())
    }
}

/// A request as the provider saw it
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub system: String,
    pub messages: Vec<ChatMessage>,
    pub tools: Vec<String>,
    pub max_tokens: Option<u32>,
}

pub struct ScriptedProvider {
    name: String,
    steps: Mutex<VecDeque<Step>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedProvider {
    pub fn new(steps: Vec<Step>) -> Self {
        Self::named("scripted", steps)
    }

    pub fn named(name: &str, steps: Vec<Step>) -> Self {
        Self {
            name: name.to_string(),
            steps: Mutex::new(steps.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn push(&self, step: Step) {
        self.steps
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push_back(step);
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub fn remaining(&self) -> usize {
        self.steps.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    fn next(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
        system: &str,
        max_tokens: Option<u32>,
    ) -> Result<ChatResponse> {
        self.calls
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(RecordedCall {
                system: system.to_string(),
                messages: messages.to_vec(),
                tools: tools.iter().map(|t| t.name.clone()).collect(),
                max_tokens,
            });

        let step = self
            .steps
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .pop_front()
            .ok_or_else(|| anyhow!("Scripted provider '{}' has no replies left", self.name))?;

        match step {
            Step::Fail(message) => Err(anyhow!(message)),
            Step::Reply(blocks) => {
                let stop_reason = if blocks
                    .iter()
                    .any(|b| matches!(b, ChatResponseBlock::ToolCall { .. }))
                {
                    StopReason::ToolUse
                } else {
                    StopReason::EndTurn
                };
                Ok(ChatResponse {
                    blocks,
                    stop_reason,
                    usage: ChatUsage::default(),
                })
            }
        }
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn provider_name(&self) -> &str {
        &self.name
    }

    fn model(&self) -> &str {
        "scripted"
    }

    async fn chat(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
        system: &str,
    ) -> Result<ChatResponse> {
        self.next(messages, tools, system, None)
    }

    async fn chat_capped(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
        system: &str,
        max_tokens: u32,
    ) -> Result<ChatResponse> {
        self.next(messages, tools, system, Some(max_tokens))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_replays_in_order_and_records() {
        let provider = ScriptedProvider::new(vec![
            Step::tool_call("math_add", serde_json::json!({"a": 1, "b": 2})),
            Step::text("3"),
        ]);
        let first = provider.chat(&[ChatMessage::user("1+2")], &[], "sys").await.unwrap();
        assert!(first.stop_reason.is_tool_use());
        let second = provider.chat(&[], &[], "sys").await.unwrap();
        assert_eq!(second.text(), "3");
        assert!(provider.chat(&[], &[], "").await.is_err());

        let calls = provider.calls();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[0].system, "sys");
        assert_eq!(calls[0].messages[0].text(), "1+2");
    }
}
