//! Tool server: one tool registry behind `POST /mcp`

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use bizdesk_core::{ToolExecutor, ToolRegistry};

use crate::protocol::{
    InitializeResult, JSONRPC_VERSION, McpTool, PROTOCOL_VERSION, RpcError, RpcRequest, RpcResponse, ServerInfo,
    ToolCallParams, ToolCallResult, methods,
};

/// Serves one tool registry over JSON-RPC
#[derive(Clone)]
pub struct McpServer {
    registry: Arc<ToolRegistry>,
}

impl McpServer {
    pub fn new(registry: ToolRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
        }
    }

    pub fn name(&self) -> &str {
        self.registry.name()
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/mcp", post(rpc_handler))
            .route("/health", get(health_handler))
            .with_state(self.clone())
    }

    /// Serve on `bind` until `shutdown` resolves
    pub async fn run(
        self,
        bind: SocketAddr,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(bind).await?;
        info!("{} listening on http://{}/mcp", self.name(), bind);
        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await?;
        info!("{} stopped", self.name());
        Ok(())
    }

    /// Answer one request; notifications get no response
    pub async fn handle(&self, req: RpcRequest) -> Option<RpcResponse> {
        let Some(id) = req.id.clone() else {
            debug!("{}: notification {}", self.name(), req.method);
            return None;
        };
        let response = match self.dispatch(&req).await {
            Ok(result) => RpcResponse::ok(id, result),
            Err(e) => {
                warn!("{}: {} failed: {}", self.name(), req.method, e);
                RpcResponse::err(id, &e)
            }
        };
        Some(response)
    }

    async fn dispatch(&self, req: &RpcRequest) -> Result<Value, RpcError> {
        match req.method.as_str() {
            methods::INITIALIZE => {
                let result = InitializeResult {
                    protocol_version: PROTOCOL_VERSION.to_string(),
                    capabilities: json!({"tools": {"listChanged": false}}),
                    server_info: ServerInfo {
                        name: self.name().to_string(),
                        version: env!("CARGO_PKG_VERSION").to_string(),
                    },
                };
                to_value(result)
            }
            methods::PING => Ok(json!({})),
            methods::TOOLS_LIST => {
                let tools: Vec<McpTool> = self
                    .registry
                    .list_tools()
                    .into_iter()
                    .map(McpTool::from)
                    .collect();
                Ok(json!({"tools": tools}))
            }
            methods::TOOLS_CALL => {
                let params: ToolCallParams = serde_json::from_value(req.params.clone())
                    .map_err(|e| RpcError::InvalidParams(e.to_string()))?;
                if self.registry.get(&params.name).is_none() {
                    return Err(RpcError::InvalidParams(format!("Unknown tool: {}", params.name)));
                }
                let arguments = match params.arguments {
                    Value::Null => json!({}),
                    Value::Object(map) => Value::Object(map),
                    _ => {
                        return Err(RpcError::InvalidParams(
                            "arguments must be an object".to_string(),
                        ));
                    }
                };
                let result = match self.registry.execute(&params.name, arguments).await {
                    Ok(text) => ToolCallResult::text(text, false),
                    Err(e) => ToolCallResult::text(e.to_string(), true),
                };
                to_value(result)
            }
            other => Err(RpcError::MethodNotFound(other.to_string())),
        }
    }
}

fn to_value<T: serde::Serialize>(value: T) -> Result<Value, RpcError> {
    serde_json::to_value(value).map_err(|e| RpcError::Internal(e.to_string()))
}

async fn rpc_handler(State(server): State<McpServer>, body: String) -> Response {
    let req: RpcRequest = match serde_json::from_str(&body) {
        Ok(r) => r,
        Err(e) => {
            let resp = RpcResponse::err(Value::Null, &RpcError::Parse(e.to_string()));
            return axum::Json(resp).into_response();
        }
    };
    if req.jsonrpc != JSONRPC_VERSION {
        let detail = if req.jsonrpc.is_empty() {
            "missing jsonrpc version".to_string()
        } else {
            format!("unsupported jsonrpc version {}", req.jsonrpc)
        };
        let resp = RpcResponse::err(req.id.unwrap_or(Value::Null), &RpcError::InvalidRequest(detail));
        return axum::Json(resp).into_response();
    }
    match server.handle(req).await {
        Some(resp) => axum::Json(resp).into_response(),
        None => StatusCode::ACCEPTED.into_response(),
    }
}

async fn health_handler(State(server): State<McpServer>) -> impl IntoResponse {
    axum::Json(json!({
        "status": "ok",
        "server": server.name(),
        "tools": server.registry.len(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{ERR_INVALID_PARAMS, ERR_INVALID_REQUEST, ERR_METHOD_NOT_FOUND, ERR_PARSE};
    use bizdesk_core::tools::fusion::MATH_SERVER;
    use bizdesk_store::Store;

    fn math() -> McpServer {
        let store = Store::open_in_memory().unwrap();
        McpServer::new(ToolRegistry::for_server(&MATH_SERVER, &store))
    }

    async fn call(server: &McpServer, method: &str, params: Value) -> RpcResponse {
        server.handle(RpcRequest::new(1, method, params)).await.unwrap()
    }

    #[tokio::test]
    async fn test_initialize_and_list() {
        let server = math();
        let init = call(&server, methods::INITIALIZE, json!({})).await;
        assert_eq!(init.result.unwrap()["serverInfo"]["name"], "MathServer");

        let list = call(&server, methods::TOOLS_LIST, Value::Null).await.result.unwrap();
        let tools = list["tools"].as_array().unwrap();
        assert_eq!(tools.len(), MATH_SERVER.tools.len());
        assert!(tools[0]["inputSchema"]["properties"].is_object());
    }

    #[tokio::test]
    async fn test_tools_call() {
        let server = math();
        let resp = call(
            &server,
            methods::TOOLS_CALL,
            json!({"name": "math_multiply", "arguments": {"a": 6, "b": 7}}),
        )
        .await;
        let result: ToolCallResult = serde_json::from_value(resp.result.unwrap()).unwrap();
        assert!(!result.is_error);
        let payload: Value = serde_json::from_str(&result.joined()).unwrap();
        assert_eq!(payload["result"], 42.0);

        // a handler error is a tool-level error, not a protocol error
        let resp = call(&server, methods::TOOLS_CALL, json!({"name": "math_add", "arguments": {}})).await;
        let result: ToolCallResult = serde_json::from_value(resp.result.unwrap()).unwrap();
        assert!(result.is_error);
        assert_eq!(result.joined(), "Missing 'a' parameter");
    }

    #[tokio::test]
    async fn test_protocol_errors() {
        let server = math();
        let resp = call(&server, "resources/list", json!({})).await;
        assert_eq!(resp.error.unwrap().code, ERR_METHOD_NOT_FOUND);

        let resp = call(&server, methods::TOOLS_CALL, json!({"name": "drop_tables"})).await;
        assert_eq!(resp.error.unwrap().code, ERR_INVALID_PARAMS);

        let resp = call(&server, methods::TOOLS_CALL, json!({"arguments": {}})).await;
        assert_eq!(resp.error.unwrap().code, ERR_INVALID_PARAMS);

        assert!(server.handle(RpcRequest::notification(methods::INITIALIZED)).await.is_none());
    }

    async fn post_body(server: &McpServer, body: &str) -> (StatusCode, Value) {
        let resp = rpc_handler(State(server.clone()), body.to_string()).await;
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    #[tokio::test]
    async fn test_http_envelope_checks() {
        let server = math();

        let (status, body) = post_body(&server, r#"{"jsonrpc":"2.0","id":3,"method":"ping"}"#).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["id"], 3);
        assert_eq!(body["result"], json!({}));

        let (_, body) = post_body(&server, r#"{"id":4,"method":"ping"}"#).await;
        assert_eq!(body["error"]["code"], ERR_INVALID_REQUEST);
        assert_eq!(body["id"], 4);

        let (_, body) = post_body(&server, r#"{"jsonrpc":"1.0","id":5,"method":"ping"}"#).await;
        assert_eq!(body["error"]["code"], ERR_INVALID_REQUEST);

        let (_, body) = post_body(&server, "{not json").await;
        assert_eq!(body["error"]["code"], ERR_PARSE);

        let (status, body) =
            post_body(&server, r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert!(body.is_null());
    }
}
