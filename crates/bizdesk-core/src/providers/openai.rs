//! OpenAI-compatible chat completions provider

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::debug;

use crate::tools::ToolDefinition;

use super::types::{
    ChatBlock, ChatMessage, ChatMessageContent, ChatResponse, ChatResponseBlock, ChatRole,
    ChatUsage, LlmProvider, StopReason,
};

/// Any endpoint speaking the `/v1/chat/completions` dialect
pub struct OpenAiProvider {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

impl std::fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .finish()
    }
}

impl OpenAiProvider {
    pub fn new(
        api_key: String,
        model: String,
        base_url: String,
        max_tokens: u32,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            max_tokens,
            temperature: 0.0,
        })
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    async fn complete(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
        system: &str,
        max_tokens: u32,
    ) -> Result<ChatResponse> {
        let wire_messages = encode_messages(messages, system);
        let mut body = json!({
            "model": self.model,
            "max_tokens": max_tokens,
            "temperature": self.temperature,
            "messages": wire_messages,
        });
        if !tools.is_empty() {
            body["tools"] = Value::Array(tools.iter().map(encode_tool).collect());
        }
        debug!(
            "{}: {} message(s), {} tool(s), max_tokens={}",
            self.model,
            wire_messages.len(),
            tools.len(),
            max_tokens
        );

        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .context("Chat completion request failed to send")?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(anyhow!("HTTP {} from chat completions: {}", status, detail));
        }

        let completion: wire::Completion = response
            .json()
            .await
            .context("Unreadable chat completion body")?;
        decode(completion)
    }
}

/// Tool calls ride on the assistant message; tool results become `tool` messages
fn encode_messages<'a>(messages: &'a [ChatMessage], system: &'a str) -> Vec<wire::Message<'a>> {
    let mut out = Vec::with_capacity(messages.len() + 1);
    if !system.is_empty() {
        out.push(wire::Message::plain("system", system.to_string()));
    }

    for msg in messages {
        let role = role_name(msg.role);
        let blocks = match &msg.content {
            ChatMessageContent::Text(text) => {
                out.push(wire::Message::plain(role, text.clone()));
                continue;
            }
            ChatMessageContent::Blocks(blocks) => blocks,
        };

        let text: Vec<&str> = blocks
            .iter()
            .filter_map(|b| match b {
                ChatBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect();
        let text = (!text.is_empty()).then(|| text.join("\n"));

        if msg.role == ChatRole::Assistant {
            let calls: Vec<wire::ToolCall<'a>> = blocks
                .iter()
                .filter_map(|b| match b {
                    ChatBlock::ToolCall { id, name, input } => Some(wire::ToolCall {
                        id: id.as_str(),
                        kind: "function",
                        function: wire::FunctionCall {
                            name: name.as_str(),
                            arguments: input.to_string(),
                        },
                    }),
                    _ => None,
                })
                .collect();
            out.push(wire::Message {
                role,
                content: text,
                tool_calls: (!calls.is_empty()).then_some(calls),
                tool_call_id: None,
            });
            continue;
        }

        for block in blocks {
            if let ChatBlock::ToolResult {
                tool_call_id,
                content,
            } = block
            {
                out.push(wire::Message {
                    role: "tool",
                    content: Some(content.clone()),
                    tool_calls: None,
                    tool_call_id: Some(tool_call_id.as_str()),
                });
            }
        }
        if let Some(text) = text {
            out.push(wire::Message::plain(role, text));
        }
    }
    out
}

fn role_name(role: ChatRole) -> &'static str {
    match role {
        ChatRole::User => "user",
        ChatRole::Assistant => "assistant",
        ChatRole::System => "system",
    }
}

fn encode_tool(tool: &ToolDefinition) -> Value {
    json!({
        "type": "function",
        "function": {
            "name": tool.name,
            "description": tool.description,
            "parameters": tool.input_schema,
        }
    })
}

fn decode(completion: wire::Completion) -> Result<ChatResponse> {
    let choice = completion
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("Chat completion returned no choices"))?;

    let mut blocks = Vec::new();
    if let Some(text) = choice.message.content.filter(|t| !t.is_empty()) {
        blocks.push(ChatResponseBlock::Text { text });
    }
    // Unparseable arguments become an empty object; the tool reports what is missing
    blocks.extend(choice.message.tool_calls.unwrap_or_default().into_iter().map(|call| {
        ChatResponseBlock::ToolCall {
            input: serde_json::from_str(&call.function.arguments).unwrap_or_else(|_| json!({})),
            id: call.id,
            name: call.function.name,
        }
    }));

    let stop_reason = match choice.finish_reason.as_deref() {
        Some("stop") => StopReason::EndTurn,
        Some("tool_calls") => StopReason::ToolUse,
        Some("length") => StopReason::MaxTokens,
        _ => StopReason::Unknown,
    };
    let usage = completion
        .usage
        .map(|u| ChatUsage {
            input_tokens: u.prompt_tokens,
            output_tokens: u.completion_tokens,
        })
        .unwrap_or_default();

    Ok(ChatResponse {
        blocks,
        stop_reason,
        usage,
    })
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn provider_name(&self) -> &str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn chat(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
        system: &str,
    ) -> Result<ChatResponse> {
        self.complete(messages, tools, system, self.max_tokens).await
    }

    async fn chat_capped(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
        system: &str,
        max_tokens: u32,
    ) -> Result<ChatResponse> {
        self.complete(messages, tools, system, max_tokens.min(self.max_tokens))
            .await
    }
}

mod wire {
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Serialize)]
    pub struct Message<'a> {
        pub role: &'a str,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub content: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub tool_calls: Option<Vec<ToolCall<'a>>>,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub tool_call_id: Option<&'a str>,
    }

    impl<'a> Message<'a> {
        pub fn plain(role: &'a str, content: String) -> Self {
            Self {
                role,
                content: Some(content),
                tool_calls: None,
                tool_call_id: None,
            }
        }
    }

    #[derive(Debug, Serialize)]
    pub struct ToolCall<'a> {
        pub id: &'a str,
        #[serde(rename = "type")]
        pub kind: &'static str,
        pub function: FunctionCall<'a>,
    }

    #[derive(Debug, Serialize)]
    pub struct FunctionCall<'a> {
        pub name: &'a str,
        pub arguments: String,
    }

    #[derive(Debug, Deserialize)]
    pub struct Completion {
        pub choices: Vec<Choice>,
        #[serde(default)]
        pub usage: Option<Usage>,
    }

    #[derive(Debug, Deserialize)]
    pub struct Choice {
        pub message: ReplyMessage,
        #[serde(default)]
        pub finish_reason: Option<String>,
    }

    #[derive(Debug, Deserialize)]
    pub struct ReplyMessage {
        #[serde(default)]
        pub content: Option<String>,
        #[serde(default)]
        pub tool_calls: Option<Vec<ReplyToolCall>>,
    }

    #[derive(Debug, Deserialize)]
    pub struct ReplyToolCall {
        pub id: String,
        pub function: ReplyFunction,
    }

    #[derive(Debug, Deserialize)]
    pub struct ReplyFunction {
        pub name: String,
        #[serde(default)]
        pub arguments: String,
    }

    #[derive(Debug, Deserialize)]
    pub struct Usage {
        pub prompt_tokens: u32,
        pub completion_tokens: u32,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_prompt_first_and_tool_results_split() {
        let msgs = vec![
            ChatMessage::user("where is order 7?"),
            ChatMessage {
                role: ChatRole::Assistant,
                content: ChatMessageContent::Blocks(vec![ChatBlock::ToolCall {
                    id: "call_1".into(),
                    name: "get_order_status".into(),
                    input: json!({"order_id": 7}),
                }]),
            },
            ChatMessage {
                role: ChatRole::User,
                content: ChatMessageContent::Blocks(vec![ChatBlock::ToolResult {
                    tool_call_id: "call_1".into(),
                    content: r#"{"status":"shipped"}"#.into(),
                }]),
            },
        ];
        let wire = serde_json::to_value(encode_messages(&msgs, "You are the order agent.")).unwrap();
        let wire = wire.as_array().unwrap();
        assert_eq!(wire.len(), 4);
        assert_eq!(wire[0]["role"], "system");
        assert_eq!(wire[2]["role"], "assistant");
        assert!(wire[2].get("content").is_none());
        assert_eq!(wire[2]["tool_calls"][0]["type"], "function");
        assert_eq!(wire[2]["tool_calls"][0]["function"]["arguments"], r#"{"order_id":7}"#);
        assert_eq!(wire[3]["role"], "tool");
        assert_eq!(wire[3]["tool_call_id"], "call_1");
    }

    #[test]
    fn test_empty_system_prompt_is_omitted() {
        let msgs = [ChatMessage::user("hi")];
        let wire = encode_messages(&msgs, "");
        assert_eq!(wire.len(), 1);
        assert_eq!(wire[0].role, "user");
    }

    #[test]
    fn test_tool_defs() {
        let tool = ToolDefinition {
            name: "math_add".into(),
            description: "Add two numbers".into(),
            input_schema: json!({"type": "object"}),
        };
        let def = encode_tool(&tool);
        assert_eq!(def["type"], "function");
        assert_eq!(def["function"]["name"], "math_add");
        assert_eq!(def["function"]["parameters"]["type"], "object");
    }

    #[test]
    fn test_decode_tool_call_with_bad_arguments() {
        let completion: wire::Completion = serde_json::from_value(json!({
            "choices": [{
                "message": {
                    "content": null,
                    "tool_calls": [{
                        "id": "call_9",
                        "type": "function",
                        "function": {"name": "transfer_to_job", "arguments": "not json"}
                    }]
                },
                "finish_reason": "tool_calls"
            }],
            "usage": {"prompt_tokens": 12, "completion_tokens": 3}
        }))
        .unwrap();
        let out = decode(completion).unwrap();
        assert_eq!(out.stop_reason, StopReason::ToolUse);
        assert_eq!(out.usage.input_tokens, 12);
        let (_, name, input) = out.tool_calls().next().unwrap();
        assert_eq!(name, "transfer_to_job");
        assert!(input.as_object().unwrap().is_empty());
    }

    #[test]
    fn test_decode_plain_answer_without_usage() {
        let completion: wire::Completion = serde_json::from_value(json!({
            "choices": [{"message": {"content": "hr"}, "finish_reason": "length"}]
        }))
        .unwrap();
        let out = decode(completion).unwrap();
        assert_eq!(out.text(), "hr");
        assert_eq!(out.stop_reason, StopReason::MaxTokens);
        assert_eq!(out.usage.output_tokens, 0);

        let empty: wire::Completion = serde_json::from_value(json!({"choices": []})).unwrap();
        assert!(decode(empty).is_err());
    }

    #[test]
    fn test_debug_hides_key() {
        let provider = OpenAiProvider::new(
            "sk-secret-key".into(),
            "gpt-4o-mini".into(),
            "https://api.openai.com/".into(),
            1024,
            Duration::from_secs(45),
        )
        .unwrap();
        let debug = format!("{:?}", provider);
        assert!(!debug.contains("sk-secret-key"));
        assert!(debug.contains("https://api.openai.com\""));
    }
}
