//! Routing trace shown next to each reply

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc::UnboundedSender;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TraceEvent {
    Route {
        to: String,
        method: String,
    },
    ToolCall {
        agent: String,
        tool: String,
        args: Value,
    },
    ToolResult {
        agent: String,
        tool: String,
        result: Value,
    },
    Reply {
        agent: String,
        label: String,
    },
}

impl TraceEvent {
    pub fn route(to: impl Into<String>, method: impl Into<String>) -> Self {
        Self::Route {
            to: to.into(),
            method: method.into(),
        }
    }

    pub fn tool_call(agent: &str, tool: &str, args: Value) -> Self {
        Self::ToolCall {
            agent: agent.to_string(),
            tool: tool.to_string(),
            args,
        }
    }

    /// Tool output, kept structured when it parses as JSON
    pub fn tool_result(agent: &str, tool: &str, output: &str) -> Self {
        let result = serde_json::from_str(output).unwrap_or_else(|_| Value::String(output.to_string()));
        Self::ToolResult {
            agent: agent.to_string(),
            tool: tool.to_string(),
            result,
        }
    }

    pub fn reply(agent: &str, text: &str) -> Self {
        Self::Reply {
            agent: agent.to_string(),
            label: format!("Final reply ({} chars)", text.chars().count()),
        }
    }
}

/// Events of one chat turn, optionally mirrored to a live listener
#[derive(Debug, Default)]
pub struct Trace {
    events: Vec<TraceEvent>,
    live: Option<UnboundedSender<TraceEvent>>,
}

impl Trace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_live(live: UnboundedSender<TraceEvent>) -> Self {
        Self {
            events: Vec::new(),
            live: Some(live),
        }
    }

    pub fn push(&mut self, event: TraceEvent) {
        if let Some(live) = &self.live {
            // a closed listener only loses the live copy
            let _ = live.send(event.clone());
        }
        self.events.push(event);
    }

    pub fn events(&self) -> &[TraceEvent] {
        &self.events
    }

    pub fn into_events(self) -> Vec<TraceEvent> {
        self.events
    }
}
