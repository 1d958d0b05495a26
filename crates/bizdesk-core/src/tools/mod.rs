//! Tool registry and executor system
//!
//! Every domain tool is declared as a [`ToolSpec`]: a name, a description, a
//! flat parameter list and a synchronous handler. Handlers that touch the
//! database receive a `&Connection` and run on the blocking pool through
//! [`Store::call`]; pure handlers run inline. A [`ToolServer`] groups the
//! specs one specialist may use.

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

use bizdesk_store::Store;

pub mod fmt;
pub mod params;

pub mod ecommerce;
pub mod finance;
pub mod fusion;
pub mod hospital;
pub mod hr;
pub mod loan;

/// Tool metadata handed to the LLM
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn execute(&self, tool_name: &str, input: Value) -> Result<String>;
    fn list_tools(&self) -> Vec<ToolDefinition>;

    /// Reachability of the backing tool server; in-process executors are always up
    async fn health(&self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
pub trait ToolHandler: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn input_schema(&self) -> Value;
    async fn execute(&self, input: Value) -> Result<String>;

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            input_schema: self.input_schema(),
        }
    }
}

/// Named set of tool handlers
pub struct ToolRegistry {
    name: String,
    tools: HashMap<String, Arc<dyn ToolHandler>>,
    order: Vec<String>,
}

impl ToolRegistry {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tools: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Registry exposing every tool of `server` against `store`
    pub fn for_server(server: &ToolServer, store: &Store) -> Self {
        let mut registry = Self::new(server.name);
        for spec in server.tools {
            registry.register(Arc::new(SpecTool::new(spec, store.clone())));
        }
        registry
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn register(&mut self, handler: Arc<dyn ToolHandler>) {
        let name = handler.name().to_string();
        debug!("Registering tool {} on {}", name, self.name);
        if self.tools.insert(name.clone(), handler).is_none() {
            self.order.push(name);
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ToolHandler>> {
        self.tools.get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.order.clone()
    }

    /// Definitions for only the named tools
    pub fn filter_tools(&self, names: &[String]) -> Vec<ToolDefinition> {
        names
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|handler| handler.definition())
            .collect()
    }
}

#[async_trait]
impl ToolExecutor for ToolRegistry {
    async fn execute(&self, tool_name: &str, input: Value) -> Result<String> {
        debug!("Executing tool {} with input: {}", tool_name, input);

        let handler = self
            .tools
            .get(tool_name)
            .ok_or_else(|| anyhow!("Unknown tool: {}", tool_name))?;

        match handler.execute(input).await {
            Ok(result) => {
                debug!("Tool {} succeeded ({} bytes)", tool_name, result.len());
                Ok(result)
            }
            Err(e) => {
                warn!("Tool {} failed: {}", tool_name, e);
                Err(e)
            }
        }
    }

    /// Registration order, so the LLM always sees a stable list
    fn list_tools(&self) -> Vec<ToolDefinition> {
        self.filter_tools(&self.order)
    }
}

/// Restricts an executor to an allowlist of tool names
pub struct FilteredToolExecutor {
    inner: Arc<dyn ToolExecutor>,
    allowed: HashSet<String>,
}

impl FilteredToolExecutor {
    pub fn new(inner: Arc<dyn ToolExecutor>, allowed: &[String]) -> Self {
        Self {
            inner,
            allowed: allowed.iter().cloned().collect(),
        }
    }

    /// Allow everything the inner executor lists
    pub fn all(inner: Arc<dyn ToolExecutor>) -> Self {
        let allowed = inner.list_tools().into_iter().map(|t| t.name).collect();
        Self { inner, allowed }
    }

    pub fn is_allowed(&self, tool_name: &str) -> bool {
        self.allowed.contains(tool_name)
    }
}

#[async_trait]
impl ToolExecutor for FilteredToolExecutor {
    async fn execute(&self, tool_name: &str, input: Value) -> Result<String> {
        if !self.allowed.contains(tool_name) {
            warn!("Blocked tool '{}' outside the specialist allowlist", tool_name);
            return Err(anyhow!(
                "Tool '{}' is not available for this specialist",
                tool_name
            ));
        }
        self.inner.execute(tool_name, input).await
    }

    fn list_tools(&self) -> Vec<ToolDefinition> {
        self.inner
            .list_tools()
            .into_iter()
            .filter(|t| self.allowed.contains(&t.name))
            .collect()
    }

    async fn health(&self) -> Result<()> {
        self.inner.health().await
    }
}

/// JSON schema for a flat object
pub fn json_schema(properties: Value, required: Vec<&str>) -> Value {
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    String,
    Integer,
    Number,
    Boolean,
    Object,
    Array,
}

impl Kind {
    fn as_str(&self) -> &'static str {
        match self {
            Kind::String => "string",
            Kind::Integer => "integer",
            Kind::Number => "number",
            Kind::Boolean => "boolean",
            Kind::Object => "object",
            Kind::Array => "array",
        }
    }
}

/// One tool parameter
#[derive(Debug, Clone, Copy)]
pub struct Param {
    pub name: &'static str,
    pub kind: Kind,
    pub description: &'static str,
    pub required: bool,
}

impl Param {
    pub const fn req(name: &'static str, kind: Kind, description: &'static str) -> Self {
        Self {
            name,
            kind,
            description,
            required: true,
        }
    }

    pub const fn opt(name: &'static str, kind: Kind, description: &'static str) -> Self {
        Self {
            name,
            kind,
            description,
            required: false,
        }
    }
}

#[derive(Clone, Copy)]
pub enum Handler {
    /// Runs against the app database on the blocking pool
    Sql(fn(&Connection, &Value) -> Result<Value>),
    /// Pure computation
    Pure(fn(&Value) -> Result<Value>),
}

/// Declarative tool definition
pub struct ToolSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub params: &'static [Param],
    pub handler: Handler,
}

impl ToolSpec {
    pub fn input_schema(&self) -> Value {
        let mut properties = Map::new();
        for p in self.params {
            let mut prop = json!({"type": p.kind.as_str(), "description": p.description});
            if p.kind == Kind::Array {
                prop["items"] = json!({"type": "string"});
            }
            properties.insert(p.name.to_string(), prop);
        }
        let required = self
            .params
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name)
            .collect();
        json_schema(Value::Object(properties), required)
    }

    /// Run the handler directly on a connection (tests and batch use)
    pub fn run(&self, conn: &Connection, input: &Value) -> Result<Value> {
        match self.handler {
            Handler::Sql(f) => f(conn, input),
            Handler::Pure(f) => f(input),
        }
    }
}

impl std::fmt::Debug for ToolSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolSpec").field("name", &self.name).finish()
    }
}

/// The tool set behind one specialist
#[derive(Debug)]
pub struct ToolServer {
    pub name: &'static str,
    pub tools: &'static [ToolSpec],
}

impl ToolServer {
    pub fn find(&self, name: &str) -> Option<&'static ToolSpec> {
        self.tools.iter().find(|t| t.name == name)
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.tools.iter().map(|t| t.name.to_string()).collect()
    }
}

/// [`ToolHandler`] over a static [`ToolSpec`]
pub struct SpecTool {
    spec: &'static ToolSpec,
    store: Store,
}

impl SpecTool {
    pub fn new(spec: &'static ToolSpec, store: Store) -> Self {
        Self { spec, store }
    }
}

#[async_trait]
impl ToolHandler for SpecTool {
    fn name(&self) -> &str {
        self.spec.name
    }

    fn description(&self) -> &str {
        self.spec.description
    }

    fn input_schema(&self) -> Value {
        self.spec.input_schema()
    }

    async fn execute(&self, input: Value) -> Result<String> {
        let value = match self.spec.handler {
            Handler::Pure(f) => f(&input)?,
            Handler::Sql(f) => self.store.call(move |conn| f(conn, &input)).await?,
        };
        Ok(serde_json::to_string(&value)?)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use bizdesk_store::AppKind;
    use rusqlite::Connection;

    /// Fresh in-memory database with one app's schema and seed rows
    pub fn seeded(app: AppKind) -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
        conn.execute_batch(app.schema()).unwrap();
        app.seed(&conn).unwrap();
        conn
    }

    /// Run one tool of a server by name
    pub fn run(tools: &[super::ToolSpec], conn: &Connection, name: &str, input: serde_json::Value) -> serde_json::Value {
        let spec = tools
            .iter()
            .find(|t| t.name == name)
            .unwrap_or_else(|| panic!("no tool named {}", name));
        spec.run(conn, &input).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn echo(input: &Value) -> Result<Value> {
        let text = params::req_str(input, "message")?;
        Ok(json!({"echo": text}))
    }

    fn count_threads(conn: &Connection, _input: &Value) -> Result<Value> {
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM thread_memory", [], |r| r.get(0))?;
        Ok(json!({"threads": n}))
    }

    const TEST_TOOLS: &[ToolSpec] = &[
        ToolSpec {
            name: "echo",
            description: "Echo a message",
            params: &[Param::req("message", Kind::String, "Text to echo")],
            handler: Handler::Pure(echo),
        },
        ToolSpec {
            name: "count_threads",
            description: "Count stored threads",
            params: &[Param::opt("tags", Kind::Array, "Unused")],
            handler: Handler::Sql(count_threads),
        },
    ];

    static TEST_SERVER: ToolServer = ToolServer {
        name: "TestServer",
        tools: TEST_TOOLS,
    };

    fn registry() -> ToolRegistry {
        ToolRegistry::for_server(&TEST_SERVER, &Store::open_in_memory().unwrap())
    }

    #[tokio::test]
    async fn test_registry_runs_pure_and_sql_tools() {
        let registry = registry();
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.name(), "TestServer");

        let out = registry.execute("echo", json!({"message": "hi"})).await.unwrap();
        assert_eq!(out, r#"{"echo":"hi"}"#);

        let out = registry.execute("count_threads", json!({})).await.unwrap();
        assert_eq!(out, r#"{"threads":0}"#);
    }

    #[tokio::test]
    async fn test_unknown_tool_and_missing_param() {
        let registry = registry();
        let err = registry.execute("nope", json!({})).await.unwrap_err();
        assert_eq!(err.to_string(), "Unknown tool: nope");

        let err = registry.execute("echo", json!({})).await.unwrap_err();
        assert_eq!(err.to_string(), "Missing 'message' parameter");
    }

    #[test]
    fn test_schema_and_order() {
        let registry = registry();
        let tools = registry.list_tools();
        assert_eq!(tools[0].name, "echo");
        assert_eq!(tools[0].input_schema["required"], json!(["message"]));
        assert_eq!(tools[1].input_schema["properties"]["tags"]["items"]["type"], "string");
        assert_eq!(tools[1].input_schema["required"], json!([]));
    }

    #[tokio::test]
    async fn test_filtered_executor() {
        let inner: Arc<dyn ToolExecutor> = Arc::new(registry());
        let filtered = FilteredToolExecutor::new(inner, &["echo".to_string()]);

        let names: Vec<_> = filtered.list_tools().into_iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["echo"]);
        assert!(filtered.execute("echo", json!({"message": "x"})).await.is_ok());

        let err = filtered.execute("count_threads", json!({})).await.unwrap_err();
        assert!(err.to_string().contains("not available"));
    }
}
