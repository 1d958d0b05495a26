//! bizdesk-mcp - Tool servers over an MCP-style JSON-RPC protocol
//!
//! Each specialist's tool server can run as its own HTTP process
//! ([`McpServer`]) and be reached from the pipeline through [`RemoteTools`],
//! which implements the same executor trait as the in-process registry.

pub mod client;
pub mod protocol;
pub mod server;

pub use client::{McpClient, RemoteTools};
pub use protocol::{RpcError, RpcRequest, RpcResponse, ToolCallResult};
pub use server::McpServer;

use bizdesk_core::{AppDefinition, ToolRegistry};
use bizdesk_store::Store;

/// One server per specialist of `app`, in specialist order
pub fn app_servers(app: &AppDefinition, store: &Store) -> Vec<(&'static str, McpServer)> {
    app.specialists
        .iter()
        .map(|s| (s.id, McpServer::new(ToolRegistry::for_server(s.server, store))))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bizdesk_core::apps::hr;

    #[test]
    fn test_app_servers() {
        let store = Store::open_in_memory().unwrap();
        let servers = app_servers(&hr::APP, &store);
        assert_eq!(servers.len(), 7);
        assert_eq!(servers[0].0, "job_agent");
        assert!(!servers[0].1.name().is_empty());
    }
}
