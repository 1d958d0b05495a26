//! WebSocket protocol: JSON requests, responses and events

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use bizdesk_core::TraceEvent;

/// Client → gateway
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayRequest {
    pub method: String,
    #[serde(default)]
    pub params: Value,
    /// Echoed back on the response
    #[serde(default)]
    pub id: Option<String>,
}

/// Gateway → client, answering one request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<GatewayError>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayError {
    pub code: i32,
    pub message: String,
    /// Reply to show in place of an answer, for chat failures
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_reply: Option<String>,
}

/// Gateway → client, unsolicited
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayEvent {
    pub event: String,
    pub data: Value,
}

pub mod methods {
    pub const MESSAGE_SEND: &str = "message.send";
    pub const SESSION_LIST: &str = "session.list";
    pub const SESSION_NEW: &str = "session.new";
    pub const SESSION_HISTORY: &str = "session.history";
    pub const STATUS_GET: &str = "status.get";
}

pub mod events {
    pub const ROUTE_DECIDED: &str = "route.decided";
    pub const TOOL_EXECUTING: &str = "tool.executing";
    pub const TOOL_RESULT: &str = "tool.result";
    pub const MESSAGE_RECEIVED: &str = "message.received";
    pub const SESSION_CREATED: &str = "session.created";
    pub const TYPING_START: &str = "typing.start";
    pub const TYPING_STOP: &str = "typing.stop";
}

pub const ERR_INVALID_METHOD: i32 = -32601;
pub const ERR_INVALID_PARAMS: i32 = -32602;
pub const ERR_INTERNAL: i32 = -32603;
pub const ERR_CHAT_FAILED: i32 = -32001;

impl GatewayResponse {
    pub fn ok(id: Option<String>, result: Value) -> Self {
        Self {
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn err(id: Option<String>, code: i32, message: impl Into<String>) -> Self {
        Self {
            id,
            result: None,
            error: Some(GatewayError {
                code,
                message: message.into(),
                final_reply: None,
            }),
        }
    }

    pub fn chat_failed(id: Option<String>, kind: &str, final_reply: String) -> Self {
        Self {
            id,
            result: None,
            error: Some(GatewayError {
                code: ERR_CHAT_FAILED,
                message: kind.to_string(),
                final_reply: Some(final_reply),
            }),
        }
    }
}

impl GatewayEvent {
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }

    /// Live event for one trace step of `session_id`; replies have none
    pub fn from_trace(session_id: &str, trace: &TraceEvent) -> Option<Self> {
        let event = match trace {
            TraceEvent::Route { .. } => events::ROUTE_DECIDED,
            TraceEvent::ToolCall { .. } => events::TOOL_EXECUTING,
            TraceEvent::ToolResult { .. } => events::TOOL_RESULT,
            TraceEvent::Reply { .. } => return None,
        };
        let mut data = serde_json::to_value(trace).unwrap_or_else(|_| json!({}));
        if let Value::Object(map) = &mut data {
            map.remove("type");
            map.insert("session_id".to_string(), Value::String(session_id.to_string()));
        }
        Some(Self::new(event, data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_deserialize() {
        let req: GatewayRequest = serde_json::from_str(
            r#"{"method":"message.send","params":{"content":"hi","session_id":"main"},"id":"r1"}"#,
        )
        .unwrap();
        assert_eq!(req.method, methods::MESSAGE_SEND);
        assert_eq!(req.params["content"], "hi");
        assert_eq!(req.id.as_deref(), Some("r1"));
    }

    #[test]
    fn test_chat_failed_shape() {
        let resp = GatewayResponse::chat_failed(None, "SupervisorTimeout", "took too long".into());
        let v = serde_json::to_value(&resp).unwrap();
        assert_eq!(v["error"]["code"], ERR_CHAT_FAILED);
        assert_eq!(v["error"]["final_reply"], "took too long");
        assert!(v.get("result").is_none());
    }

    #[test]
    fn test_trace_events() {
        let evt = GatewayEvent::from_trace(
            "s1",
            &TraceEvent::tool_call("order_agent", "get_order_status", json!({"order_id": 3})),
        )
        .unwrap();
        assert_eq!(evt.event, events::TOOL_EXECUTING);
        assert_eq!(evt.data["tool"], "get_order_status");
        assert_eq!(evt.data["session_id"], "s1");
        assert!(evt.data.get("type").is_none());

        assert!(GatewayEvent::from_trace("s1", &TraceEvent::reply("order_agent", "ok")).is_none());
    }
}
