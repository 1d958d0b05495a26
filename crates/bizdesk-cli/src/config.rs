use anyhow::{Context, Result};
use bizdesk_core::{MemoryConfig, PipelineConfig};
use bizdesk_store::AppKind;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::warn;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BizdeskConfig {
    #[serde(default)]
    pub app: AppSection,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub memory: MemorySection,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppSection {
    /// App served when no `--app` flag is given
    #[serde(default = "default_app")]
    pub name: AppKind,
    /// Holds one `<app>.db` per app
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

fn default_app() -> AppKind {
    AppKind::Hr
}

fn default_data_dir() -> String {
    "~/.bizdesk/data".to_string()
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: default_app(),
            data_dir: default_data_dir(),
        }
    }
}

impl AppSection {
    pub fn db_path(&self, app: AppKind) -> PathBuf {
        expand_home(&self.data_dir).join(format!("{}.db", app))
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default)]
    pub temperature: f32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Attempts per provider before failing over
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Tried in order after the primary endpoint
    #[serde(default)]
    pub failover: Vec<FailoverEndpoint>,
}

impl std::fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmConfig")
            .field("api_key", &mask_secret(&self.api_key))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .field("timeout_secs", &self.timeout_secs)
            .field("max_retries", &self.max_retries)
            .field("failover", &self.failover)
            .finish()
    }
}

fn default_base_url() -> String {
    "https://api.openai.com".to_string()
}
fn default_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_max_tokens() -> u32 {
    1024
}
fn default_timeout_secs() -> u64 {
    60
}
fn default_max_retries() -> u32 {
    2
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: default_base_url(),
            model: default_model(),
            max_tokens: default_max_tokens(),
            temperature: 0.0,
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            failover: Vec::new(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct FailoverEndpoint {
    #[serde(default)]
    pub api_key: String,
    pub base_url: String,
    pub model: String,
}

impl std::fmt::Debug for FailoverEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FailoverEndpoint")
            .field("api_key", &mask_secret(&self.api_key))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryBackendKind {
    #[default]
    Sqlite,
    Memory,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SummarizerKind {
    #[default]
    Llm,
    Local,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemorySection {
    #[serde(default)]
    pub backend: MemoryBackendKind,
    #[serde(default)]
    pub summarizer: SummarizerKind,
    #[serde(flatten)]
    pub limits: MemoryConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolMode {
    /// Tool registries run inside the chat process
    #[default]
    Local,
    /// Each specialist talks to a `serve-tools` process over HTTP
    Remote,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    #[serde(default)]
    pub mode: ToolMode,
    #[serde(default = "default_tools_host")]
    pub host: String,
    /// Specialist `i` of an app listens on `base_port + i`
    #[serde(default = "default_base_port")]
    pub base_port: u16,
    /// Per-specialist URL overrides, keyed by specialist id
    #[serde(default)]
    pub urls: HashMap<String, String>,
}

fn default_tools_host() -> String {
    "127.0.0.1".to_string()
}
fn default_base_port() -> u16 {
    8101
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            mode: ToolMode::default(),
            host: default_tools_host(),
            base_port: default_base_port(),
            urls: HashMap::new(),
        }
    }
}

impl ToolsConfig {
    pub fn port_for(&self, index: usize) -> u16 {
        self.base_port.saturating_add(index as u16)
    }

    pub fn url_for(&self, index: usize, specialist_id: &str) -> String {
        self.urls
            .get(specialist_id)
            .cloned()
            .unwrap_or_else(|| format!("http://{}:{}", self.host, self.port_for(index)))
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_gateway_bind")]
    pub bind: String,
    /// Empty disables bearer auth
    #[serde(default)]
    pub auth_token: String,
}

impl std::fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("bind", &self.bind)
            .field("auth_token", &mask_secret(&self.auth_token))
            .finish()
    }
}

fn default_gateway_bind() -> String {
    "127.0.0.1:8080".to_string()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind: default_gateway_bind(),
            auth_token: String::new(),
        }
    }
}

/// First 3 and last 4 chars of long secrets, `***` otherwise
fn mask_secret(s: &str) -> String {
    if s.is_empty() {
        return "(empty)".to_string();
    }
    let chars: Vec<char> = s.chars().collect();
    if chars.len() > 7 {
        let prefix: String = chars[..3].iter().collect();
        let suffix: String = chars[chars.len() - 4..].iter().collect();
        format!("{}...{}", prefix, suffix)
    } else {
        "***".to_string()
    }
}

pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".bizdesk")
}

pub fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(rest),
        None => PathBuf::from(path),
    }
}

impl BizdeskConfig {
    pub fn load(custom_path: &Option<PathBuf>) -> Result<Self> {
        let path = custom_path
            .clone()
            .unwrap_or_else(|| config_dir().join("config.toml"));
        check_permissions(&path)?;

        let content = std::fs::read_to_string(&path).with_context(|| {
            format!(
                "Failed to read config at {}. Run `bizdesk init` first.",
                path.display()
            )
        })?;
        Self::parse(&content).with_context(|| format!("Failed to parse config at {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(&expand_env_vars(content)?)?;

        if config.llm.api_key.starts_with("sk-") {
            warn!(
                "LLM API key is hardcoded in the config file. Prefer api_key = \"${{OPENAI_API_KEY}}\""
            );
        }
        if !config.gateway.auth_token.is_empty() && config.tools.mode == ToolMode::Remote {
            warn!("Gateway auth is on but tool servers accept unauthenticated calls; bind them to localhost");
        }
        Ok(config)
    }

    /// Copy safe to print: every secret masked
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        copy.llm.api_key = mask_secret(&copy.llm.api_key);
        for endpoint in &mut copy.llm.failover {
            endpoint.api_key = mask_secret(&endpoint.api_key);
        }
        copy.gateway.auth_token = mask_secret(&copy.gateway.auth_token);
        copy
    }
}

/// Group or world access to a file that may hold keys is refused
fn check_permissions(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Ok(metadata) = std::fs::metadata(path) {
            let mode = metadata.permissions().mode();
            if mode & 0o077 != 0 {
                anyhow::bail!(
                    "Config file {} is readable by others ({:o}). Fix with: chmod 600 {}",
                    path.display(),
                    mode & 0o777,
                    path.display()
                );
            }
        }
    }
    #[cfg(not(unix))]
    let _ = path;
    Ok(())
}

/// Variables a config file may reference as `${NAME}`
const ALLOWED_ENV_VARS: &[&str] = &[
    "OPENAI_API_KEY",
    "BIZDESK_LLM_API_KEY",
    "BIZDESK_LLM_BASE_URL",
    "BIZDESK_LLM_MODEL",
    "BIZDESK_FAILOVER_API_KEY",
    "BIZDESK_GATEWAY_TOKEN",
    "BIZDESK_DATA_DIR",
    "HOME",
    "USER",
];

/// Replace allowlisted `${NAME}` references; others stay as written
fn expand_env_vars(s: &str) -> Result<String> {
    let pattern = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}")?;
    let expanded = pattern.replace_all(s, |caps: &regex::Captures<'_>| {
        let name = &caps[1];
        if ALLOWED_ENV_VARS.contains(&name) {
            std::env::var(name).unwrap_or_default()
        } else {
            warn!("Not expanding '{}' in config: variable is not allowlisted", name);
            caps[0].to_string()
        }
    });
    Ok(expanded.into_owned())
}
