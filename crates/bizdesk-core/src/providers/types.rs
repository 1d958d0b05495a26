//! Provider-agnostic chat types

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::tools::ToolDefinition;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: ChatMessageContent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
    System,
}

/// Plain text or structured blocks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChatMessageContent {
    Text(String),
    Blocks(Vec<ChatBlock>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ChatBlock {
    Text { text: String },
    ToolCall { id: String, name: String, input: Value },
    ToolResult { tool_call_id: String, content: String },
}

impl ChatMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: ChatMessageContent::Text(text.into()),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: ChatMessageContent::Text(text.into()),
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: ChatMessageContent::Text(text.into()),
        }
    }

    /// Concatenated text of the message, ignoring tool blocks
    pub fn text(&self) -> String {
        match &self.content {
            ChatMessageContent::Text(t) => t.clone(),
            ChatMessageContent::Blocks(blocks) => blocks
                .iter()
                .filter_map(|b| match b {
                    ChatBlock::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }

    pub fn has_tool_blocks(&self) -> bool {
        matches!(&self.content, ChatMessageContent::Blocks(blocks)
            if blocks.iter().any(|b| !matches!(b, ChatBlock::Text { .. })))
    }
}

#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub blocks: Vec<ChatResponseBlock>,
    pub stop_reason: StopReason,
    pub usage: ChatUsage,
}

#[derive(Debug, Clone)]
pub enum ChatResponseBlock {
    Text { text: String },
    ToolCall { id: String, name: String, input: Value },
}

impl ChatResponse {
    /// Text blocks joined by newlines
    pub fn text(&self) -> String {
        self.blocks
            .iter()
            .filter_map(|b| match b {
                ChatResponseBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn tool_calls(&self) -> impl Iterator<Item = (&str, &str, &Value)> {
        self.blocks.iter().filter_map(|b| match b {
            ChatResponseBlock::ToolCall { id, name, input } => {
                Some((id.as_str(), name.as_str(), input))
            }
            _ => None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    EndTurn,
    ToolUse,
    MaxTokens,
    Unknown,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ChatUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// Trait that all LLM providers implement
#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn provider_name(&self) -> &str;

    fn model(&self) -> &str;

    /// Send a chat request with optional tools and system prompt
    async fn chat(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
        system: &str,
    ) -> Result<ChatResponse>;

    /// Same as [`chat`](Self::chat) with a tighter completion budget.
    /// Providers without a token cap ignore `max_tokens`.
    async fn chat_capped(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
        system: &str,
        _max_tokens: u32,
    ) -> Result<ChatResponse> {
        self.chat(messages, tools, system).await
    }
}

impl std::fmt::Display for ChatRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
            Self::System => write!(f, "system"),
        }
    }
}

impl StopReason {
    pub fn is_tool_use(&self) -> bool {
        matches!(self, Self::ToolUse)
    }

    pub fn is_end_turn(&self) -> bool {
        matches!(self, Self::EndTurn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_role_serde() {
        assert_eq!(ChatRole::Assistant.to_string(), "assistant");
        let json = serde_json::to_string(&ChatMessage::user("hi")).unwrap();
        assert_eq!(json, r#"{"role":"user","content":"hi"}"#);
    }

    #[test]
    fn test_message_text_skips_tool_blocks() {
        let msg = ChatMessage {
            role: ChatRole::Assistant,
            content: ChatMessageContent::Blocks(vec![
                ChatBlock::Text {
                    text: "checking".into(),
                },
                ChatBlock::ToolCall {
                    id: "c1".into(),
                    name: "get_order_status".into(),
                    input: serde_json::json!({"order_id": 3}),
                },
            ]),
        };
        assert_eq!(msg.text(), "checking");
        assert!(msg.has_tool_blocks());
        assert!(!ChatMessage::assistant("plain").has_tool_blocks());
    }

    #[test]
    fn test_response_accessors() {
        let resp = ChatResponse {
            blocks: vec![
                ChatResponseBlock::Text { text: "a".into() },
                ChatResponseBlock::ToolCall {
                    id: "1".into(),
                    name: "math_add".into(),
                    input: serde_json::json!({"a": 1, "b": 2}),
                },
                ChatResponseBlock::Text { text: "b".into() },
            ],
            stop_reason: StopReason::ToolUse,
            usage: ChatUsage::default(),
        };
        assert_eq!(resp.text(), "a\nb");
        assert_eq!(resp.tool_calls().count(), 1);
        assert!(resp.stop_reason.is_tool_use());
        assert!(!resp.stop_reason.is_end_turn());
    }
}
