//! Client side: talk to a remote tool server and use it as a local executor

use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::{debug, info, warn};
use url::Url;

use bizdesk_core::{ToolDefinition, ToolExecutor};

use crate::protocol::{
    InitializeResult, McpTool, PROTOCOL_VERSION, RpcRequest, RpcResponse, ToolCallResult, methods,
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
const PING_TIMEOUT: Duration = Duration::from_millis(700);

pub struct McpClient {
    http: reqwest::Client,
    endpoint: Url,
    next_id: AtomicU64,
}

impl McpClient {
    /// `base` is the server root (`http://127.0.0.1:8101`) or its `/mcp` endpoint
    pub fn new(base: &str) -> Result<Self> {
        let mut endpoint = Url::parse(base).with_context(|| format!("Invalid tool server URL: {}", base))?;
        if !endpoint.path().trim_end_matches('/').ends_with("/mcp") {
            // join() replaces the last segment unless the path ends in '/'
            if !endpoint.path().ends_with('/') {
                let dir = format!("{}/", endpoint.path());
                endpoint.set_path(&dir);
            }
            endpoint = endpoint.join("mcp").context("Invalid tool server URL")?;
        }
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            http,
            endpoint,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    async fn send(&self, req: &RpcRequest, timeout: Option<Duration>) -> Result<reqwest::Response> {
        let mut builder = self.http.post(self.endpoint.clone()).json(req);
        if let Some(t) = timeout {
            builder = builder.timeout(t);
        }
        builder
            .send()
            .await
            .with_context(|| format!("{} unreachable", self.endpoint))
    }

    async fn request(&self, method: &str, params: Value, timeout: Option<Duration>) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let req = RpcRequest::new(id, method, params);
        debug!("-> {} {} #{}", self.endpoint, method, id);

        let resp = self.send(&req, timeout).await?;
        if !resp.status().is_success() {
            return Err(anyhow!("{} returned HTTP {}", self.endpoint, resp.status()));
        }
        let body: RpcResponse = resp.json().await.context("Malformed JSON-RPC response")?;
        if let Some(err) = body.error {
            return Err(anyhow!("Tool server error {}: {}", err.code, err.message));
        }
        body.result.ok_or_else(|| anyhow!("No result in response to {}", method))
    }

    /// Handshake: `initialize` then the `initialized` notification
    pub async fn initialize(&self) -> Result<InitializeResult> {
        let params = json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": {"name": "bizdesk", "version": env!("CARGO_PKG_VERSION")},
        });
        let result = self.request(methods::INITIALIZE, params, None).await?;
        let init: InitializeResult =
            serde_json::from_value(result).context("Malformed initialize result")?;
        let note = RpcRequest::notification(methods::INITIALIZED);
        if let Err(e) = self.send(&note, None).await {
            warn!("initialized notification to {} failed: {}", self.endpoint, e);
        }
        Ok(init)
    }

    pub async fn list_tools(&self) -> Result<Vec<ToolDefinition>> {
        let result = self.request(methods::TOOLS_LIST, json!({}), None).await?;
        let tools: Vec<McpTool> = serde_json::from_value(result["tools"].clone())
            .context("Malformed tools/list result")?;
        Ok(tools.into_iter().map(ToolDefinition::from).collect())
    }

    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<ToolCallResult> {
        let result = self
            .request(methods::TOOLS_CALL, json!({"name": name, "arguments": arguments}), None)
            .await?;
        serde_json::from_value(result).context("Malformed tools/call result")
    }

    pub async fn ping(&self) -> Result<()> {
        self.request(methods::PING, json!({}), Some(PING_TIMEOUT)).await?;
        Ok(())
    }
}

/// A remote tool server used as a [`ToolExecutor`]
pub struct RemoteTools {
    client: McpClient,
    tools: RwLock<Vec<ToolDefinition>>,
}

impl RemoteTools {
    /// Connect and fetch the tool list. An unreachable server is not fatal:
    /// the list is fetched again on the next health check.
    pub async fn connect(base: &str) -> Result<Self> {
        let remote = Self {
            client: McpClient::new(base)?,
            tools: RwLock::new(Vec::new()),
        };
        if let Err(e) = remote.refresh().await {
            warn!("Tool server {} not ready: {:#}", remote.client.endpoint(), e);
        }
        Ok(remote)
    }

    pub fn client(&self) -> &McpClient {
        &self.client
    }

    async fn refresh(&self) -> Result<()> {
        let init = self.client.initialize().await?;
        let tools = self.client.list_tools().await?;
        info!(
            "Connected to {} at {} ({} tools)",
            init.server_info.name,
            self.client.endpoint(),
            tools.len()
        );
        *self.tools.write().unwrap_or_else(|p| p.into_inner()) = tools;
        Ok(())
    }

    fn has_tools(&self) -> bool {
        !self.tools.read().unwrap_or_else(|p| p.into_inner()).is_empty()
    }
}

#[async_trait]
impl ToolExecutor for RemoteTools {
    async fn execute(&self, tool_name: &str, input: Value) -> Result<String> {
        let result = self.client.call_tool(tool_name, input).await?;
        if result.is_error {
            return Err(anyhow!(result.joined()));
        }
        Ok(result.joined())
    }

    fn list_tools(&self) -> Vec<ToolDefinition> {
        self.tools.read().unwrap_or_else(|p| p.into_inner()).clone()
    }

    async fn health(&self) -> Result<()> {
        if !self.has_tools() {
            return self.refresh().await;
        }
        self.client.ping().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::McpServer;
    use bizdesk_core::ToolRegistry;
    use bizdesk_core::tools::fusion::MATH_SERVER;
    use bizdesk_store::Store;
    use std::net::SocketAddr;

    async fn spawn_math() -> SocketAddr {
        let store = Store::open_in_memory().unwrap();
        let server = McpServer::new(ToolRegistry::for_server(&MATH_SERVER, &store));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, server.router()).await.unwrap();
        });
        addr
    }

    #[test]
    fn test_endpoint_normalisation() {
        let c = McpClient::new("http://127.0.0.1:8101").unwrap();
        assert_eq!(c.endpoint().as_str(), "http://127.0.0.1:8101/mcp");
        let c = McpClient::new("http://127.0.0.1:8101/mcp").unwrap();
        assert_eq!(c.endpoint().as_str(), "http://127.0.0.1:8101/mcp");
        let c = McpClient::new("http://tools.internal/finance").unwrap();
        assert_eq!(c.endpoint().as_str(), "http://tools.internal/finance/mcp");
        let c = McpClient::new("http://tools.internal/finance/").unwrap();
        assert_eq!(c.endpoint().as_str(), "http://tools.internal/finance/mcp");
        assert!(McpClient::new("not a url").is_err());
    }

    #[tokio::test]
    async fn test_remote_round_trip() {
        let addr = spawn_math().await;
        let remote = RemoteTools::connect(&format!("http://{}", addr)).await.unwrap();
        assert_eq!(remote.list_tools().len(), MATH_SERVER.tools.len());
        remote.health().await.unwrap();

        let out = remote
            .execute("math_percentage", json!({"value": 250, "percent": 40}))
            .await
            .unwrap();
        let v: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(v["result"], 100.0);

        let err = remote.execute("math_divide", json!({"a": 1})).await.unwrap_err();
        assert_eq!(err.to_string(), "Missing 'b' parameter");

        let err = remote.execute("no_such_tool", json!({})).await.unwrap_err();
        assert!(err.to_string().contains("-32602"));
    }

    #[tokio::test]
    async fn test_unreachable_server() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let remote = RemoteTools::connect(&format!("http://{}", addr)).await.unwrap();
        assert!(remote.list_tools().is_empty());
        let err = remote.health().await.unwrap_err();
        assert!(err.to_string().contains("unreachable"));
    }
}
