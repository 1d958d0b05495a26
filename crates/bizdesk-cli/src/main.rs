use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use bizdesk_core::memory::{LlmSummarizer, LocalSummarizer, Summarizer};
use bizdesk_core::{
    ChatPipeline, LlmProvider, ModelRouter, OpenAiProvider, ThreadMemory, ToolExecutor,
    ToolRegistry,
};
use bizdesk_gateway::GatewayServer;
use bizdesk_mcp::RemoteTools;
use bizdesk_store::{AppKind, Store};

mod config;

use config::{BizdeskConfig, LlmConfig, MemoryBackendKind, SummarizerKind, ToolMode};

#[derive(Parser)]
#[command(name = "bizdesk")]
#[command(version)]
#[command(about = "Supervisor and specialist agents for small business back offices")]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// App to run (ecommerce, finance, hr, loan, fusion, hospital); defaults to the config
    #[arg(short, long, global = true)]
    app: Option<String>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the config file and seed every app database
    Init,

    /// Run the app's tool servers, one HTTP port per specialist
    ServeTools,

    /// Run the chat gateway (REST + WebSocket)
    Serve {
        /// Override `gateway.bind`
        #[arg(long)]
        bind: Option<String>,
    },

    /// Send one message through the supervisor
    Ask {
        message: String,

        /// Thread to continue
        #[arg(short, long, default_value = "cli")]
        thread: String,

        /// Print the route and trace as JSON
        #[arg(long)]
        trace: bool,
    },

    /// List the app's specialists and their tools
    Tools,

    /// Show the current configuration with secrets masked
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();

    if let Commands::Init = cli.command {
        return cmd_init().await;
    }

    let cfg = BizdeskConfig::load(&cli.config)?;
    let app = match &cli.app {
        Some(name) => name.parse::<AppKind>()?,
        None => cfg.app.name,
    };

    match cli.command {
        Commands::Init => unreachable!("handled above"),
        Commands::Config => cmd_config(&cfg),
        Commands::Tools => cmd_tools(&cfg, app).await,
        Commands::ServeTools => cmd_serve_tools(&cfg, app).await,
        Commands::Serve { bind } => cmd_serve(&cfg, app, bind).await,
        Commands::Ask {
            message,
            thread,
            trace,
        } => cmd_ask(&cfg, app, &thread, &message, trace).await,
    }
}

async fn cmd_init() -> Result<()> {
    let config_dir = config::config_dir();
    tokio::fs::create_dir_all(&config_dir)
        .await
        .with_context(|| format!("Failed to create config dir: {}", config_dir.display()))?;

    let config_path = config_dir.join("config.toml");
    if config_path.exists() {
        warn!("Config already exists at {}", config_path.display());
    } else {
        tokio::fs::write(&config_path, include_str!("../../../config/default.toml")).await?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&config_path, std::fs::Permissions::from_mode(0o600))?;
        }
        info!("Created default config at {}", config_path.display());
    }

    let cfg = BizdeskConfig::load(&Some(config_path.clone()))?;
    for app in AppKind::ALL {
        open_store(&cfg, app).await?;
        info!("{} database ready at {}", app, cfg.app.db_path(app).display());
    }

    println!("bizdesk initialized at {}", config_dir.display());
    println!("Set OPENAI_API_KEY or edit {} to configure the LLM.", config_path.display());
    Ok(())
}

fn cmd_config(cfg: &BizdeskConfig) -> Result<()> {
    println!("{}", toml::to_string_pretty(&cfg.redacted())?);
    Ok(())
}

async fn cmd_tools(cfg: &BizdeskConfig, kind: AppKind) -> Result<()> {
    let app = bizdesk_core::app(kind);
    let store = open_store(cfg, kind).await?;
    println!("{} ({} routing)", app.title, app.mode.as_str());
    for (i, spec) in app.specialists.iter().enumerate() {
        let registry = ToolRegistry::for_server(spec.server, &store);
        println!();
        println!("{} [{}] on {}", spec.label, spec.id, cfg.tools.url_for(i, spec.id));
        for tool in registry.list_tools() {
            println!("  {:<32} {}", tool.name, tool.description);
        }
    }
    Ok(())
}

async fn cmd_serve_tools(cfg: &BizdeskConfig, kind: AppKind) -> Result<()> {
    let app = bizdesk_core::app(kind);
    let store = open_store(cfg, kind).await?;
    let cancel = CancellationToken::new();
    let mut servers = JoinSet::new();

    for (i, (id, server)) in bizdesk_mcp::app_servers(app, &store).into_iter().enumerate() {
        let addr: SocketAddr = format!("{}:{}", cfg.tools.host, cfg.tools.port_for(i))
            .parse()
            .with_context(|| format!("Invalid tool server address for {}", id))?;
        let shutdown = cancel.clone().cancelled_owned();
        servers.spawn(async move {
            if let Err(e) = server.run(addr, shutdown).await {
                error!("Tool server for {} failed: {:#}", id, e);
            }
        });
    }

    println!(
        "{} tool servers running on {}:{}+. Press Ctrl+C to stop.",
        app.title, cfg.tools.host, cfg.tools.base_port
    );
    signal::ctrl_c().await?;
    info!("Received Ctrl+C, shutting down...");
    cancel.cancel();
    while servers.join_next().await.is_some() {}
    Ok(())
}

async fn cmd_serve(cfg: &BizdeskConfig, kind: AppKind, bind: Option<String>) -> Result<()> {
    let pipeline = Arc::new(build_pipeline(cfg, kind).await?);
    let bind = bind.unwrap_or_else(|| cfg.gateway.bind.clone());
    let addr: SocketAddr = bind
        .parse()
        .with_context(|| format!("Invalid gateway bind address '{}'", bind))?;
    if cfg.gateway.auth_token.is_empty() && !addr.ip().is_loopback() {
        warn!("Gateway bound to {} without an auth token", addr);
    }

    let cancel = CancellationToken::new();
    let server = GatewayServer::new(addr, pipeline, &cfg.gateway.auth_token);
    let mut gateway = tokio::spawn(server.run(cancel.clone().cancelled_owned()));

    println!("{} gateway on http://{}. Press Ctrl+C to stop.", bizdesk_core::app(kind).title, addr);
    tokio::select! {
        result = signal::ctrl_c() => {
            result?;
            info!("Received Ctrl+C, shutting down...");
            cancel.cancel();
            gateway.await??;
        }
        result = &mut gateway => {
            result??;
        }
    }
    Ok(())
}

async fn cmd_ask(
    cfg: &BizdeskConfig,
    kind: AppKind,
    thread: &str,
    message: &str,
    show_trace: bool,
) -> Result<()> {
    let pipeline = build_pipeline(cfg, kind).await?;
    match pipeline.chat(thread, message).await {
        Ok(outcome) => {
            if show_trace {
                println!("{}", serde_json::to_string_pretty(&outcome.route)?);
                println!("{}", serde_json::to_string_pretty(&outcome.trace)?);
                println!();
            }
            println!("{}", outcome.final_reply);
            Ok(())
        }
        Err(e) => {
            println!("{}", e.user_reply());
            Err(anyhow!("{} ({})", e, e.kind()))
        }
    }
}

/// Open the app's database, creating tables and seed rows on first use
async fn open_store(cfg: &BizdeskConfig, kind: AppKind) -> Result<Store> {
    let path = cfg.app.db_path(kind);
    let store = Store::open(&path)
        .with_context(|| format!("Failed to open {} database at {}", kind, path.display()))?;
    store.initialize(kind).await?;
    Ok(store)
}

fn build_provider(llm: &LlmConfig) -> Result<Arc<dyn LlmProvider>> {
    if llm.api_key.is_empty() {
        warn!("No LLM API key configured; LLM calls will fail and routing falls back to keywords");
    }
    let timeout = Duration::from_secs(llm.timeout_secs);
    let primary: Arc<dyn LlmProvider> = Arc::new(
        OpenAiProvider::new(
            llm.api_key.clone(),
            llm.model.clone(),
            llm.base_url.clone(),
            llm.max_tokens,
            timeout,
        )?
        .with_temperature(llm.temperature),
    );

    let mut providers = vec![primary];
    for endpoint in &llm.failover {
        providers.push(Arc::new(
            OpenAiProvider::new(
                endpoint.api_key.clone(),
                endpoint.model.clone(),
                endpoint.base_url.clone(),
                llm.max_tokens,
                timeout,
            )?
            .with_temperature(llm.temperature),
        ));
    }
    let router = ModelRouter::with_failover(providers)?.with_max_retries(llm.max_retries);
    Ok(Arc::new(router))
}

async fn build_pipeline(cfg: &BizdeskConfig, kind: AppKind) -> Result<ChatPipeline> {
    let app = bizdesk_core::app(kind);
    let store = open_store(cfg, kind).await?;
    let provider = build_provider(&cfg.llm)?;

    let limits = cfg.memory.limits.clone();
    let memory = Arc::new(match cfg.memory.backend {
        MemoryBackendKind::Sqlite => {
            let cutoff = chrono::Utc::now().timestamp() - limits.ttl_secs as i64;
            let purged = store.purge_threads_before(cutoff).await?;
            if purged > 0 {
                info!("Dropped {} expired thread(s)", purged);
            }
            ThreadMemory::sqlite(store.clone(), limits)
        }
        MemoryBackendKind::Memory => ThreadMemory::in_memory(limits),
    });

    let pipeline = match cfg.tools.mode {
        ToolMode::Local => ChatPipeline::local(app, provider.clone(), &store, memory),
        ToolMode::Remote => {
            let mut executors: HashMap<&'static str, Arc<dyn ToolExecutor>> = HashMap::new();
            for (i, spec) in app.specialists.iter().enumerate() {
                let url = cfg.tools.url_for(i, spec.id);
                let remote = RemoteTools::connect(&url)
                    .await
                    .with_context(|| format!("Invalid tool server URL for {}: {}", spec.id, url))?;
                executors.insert(spec.id, Arc::new(remote));
            }
            ChatPipeline::new(app, provider.clone(), executors, memory)
        }
    };

    let summarizer: Arc<dyn Summarizer> = match cfg.memory.summarizer {
        SummarizerKind::Llm => Arc::new(LlmSummarizer::new(provider)),
        SummarizerKind::Local => Arc::new(LocalSummarizer),
    };
    info!(
        "{} ready: {} routing, {} specialists, {:?} tools",
        app.title,
        app.mode.as_str(),
        app.specialists.len(),
        cfg.tools.mode
    );
    Ok(pipeline
        .with_config(cfg.pipeline.clone())
        .with_summarizer(summarizer))
}
