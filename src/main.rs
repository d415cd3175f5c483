//! broker-relay: chat-completion relay with broker-issued per-user tokens
//!
//! Sits next to a chat UI host and provides:
//! - Token exchange of OIDC identities at the token broker
//! - Chat-completion forwarding with SSE pass-through
//! - The "enable model access" tool for direct connections

use async_trait::async_trait;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use broker_relay::{
    access::{self, AccessContext},
    catalog,
    client::build_http_client,
    config::AppConfig,
    events::{EventEmitter, UiEvent},
    host::{FileUserStore, MemoryUserStore, UserStore},
    run_server,
};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Trace => write!(f, "trace"),
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Error => write!(f, "error"),
        }
    }
}

#[derive(Parser)]
#[command(name = "broker-relay")]
#[command(version = "0.1.0")]
#[command(about = "Chat-completion relay with broker-issued per-user tokens")]
#[command(long_about = "
broker-relay sits next to a chat UI host and:
  - Exchanges a user's OIDC identity for an API token at the token broker
  - Forwards chat completions to an OpenAI-compatible backend (JSON and SSE)
  - Stores a direct connection in the user's settings on request

Example usage:
  broker-relay run --config config.yaml
  broker-relay enable-access --user-id 3f2c...
")]
struct Cli {
    /// Path to config file (default: config.yaml, config.yml, ./config/config.yaml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Set logging level (trace, debug, info, warn, error)
    #[arg(long, global = true, value_name = "LEVEL")]
    log_level: Option<LogLevel>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the relay server
    Run {
        /// Override listen port
        #[arg(short, long)]
        port: Option<u16>,
        /// Override backend URL (e.g., "https://api.openai.com/v1")
        #[arg(long)]
        backend_url: Option<String>,
    },

    /// Validate configuration file
    CheckConfig,

    /// List the chat models visible with the shared token
    ListModels,

    /// Run the enable-model-access tool for one user
    EnableAccess {
        /// Host user id
        #[arg(long)]
        user_id: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level_filter = if let Some(level) = cli.log_level {
        level.to_string()
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
            .to_string()
    };

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(&level_filter))
        .init();

    match cli.command {
        Commands::Run { port, backend_url } => {
            run_relay(cli.config, port, backend_url).await?;
        }
        Commands::CheckConfig => {
            check_config(cli.config);
        }
        Commands::ListModels => {
            list_models(cli.config).await?;
        }
        Commands::EnableAccess { user_id } => {
            enable_access(cli.config, user_id).await?;
        }
    }

    Ok(())
}

/// Run the relay server
async fn run_relay(
    config_path: Option<PathBuf>,
    port_override: Option<u16>,
    backend_url_override: Option<String>,
) -> anyhow::Result<()> {
    let mut config = load_config_or_exit(config_path.as_deref());

    if let Some(port) = port_override {
        config.server.port = port;
    }
    if let Some(url) = backend_url_override {
        config.backend.url = url;
        config.validate()?;
    }

    tracing::info!(path = ?config_path, "Loaded configuration");

    let store = open_store(&config)?;
    run_server(config, store)
        .await
        .map_err(|e| anyhow::anyhow!("relay server failed: {}", e))
}

fn open_store(config: &AppConfig) -> anyhow::Result<Arc<dyn UserStore>> {
    match config.store.path {
        Some(ref path) => {
            let store = FileUserStore::open(path)?;
            tracing::info!(path = %store.path().display(), "Using file user store");
            Ok(Arc::new(store))
        }
        None => {
            tracing::warn!("No store.path configured, users live in memory only");
            Ok(Arc::new(MemoryUserStore::new()))
        }
    }
}

fn redact(secret: Option<&str>) -> &'static str {
    match secret {
        Some(_) => "[set]",
        None => "[unset]",
    }
}

/// Validate configuration file
fn check_config(config_path: Option<PathBuf>) {
    match AppConfig::load_or_default(config_path.as_deref()) {
        Ok(config) => {
            println!("✓ Configuration file is valid\n");
            println!("Server:");
            println!("  Listen: {}:{}", config.server.host, config.server.port);
            println!("\nBackend:");
            println!("  URL: {}", config.backend.base_url());
            println!("  Timeout: {}s", config.backend.timeout_seconds);
            println!("  Model list timeout: {}s", config.backend.model_list_timeout_seconds);
            println!("  Shared token: {}", redact(config.backend.shared_token()));
            if let Some(ref tls) = config.backend.tls {
                if tls.accept_invalid_certs {
                    println!("  TLS: Accepting invalid certificates");
                }
                if let Some(ref ca) = tls.ca_cert_path {
                    println!("  TLS CA: {}", ca);
                }
            }
            println!("\nBroker:");
            println!("  Token URL: {}", config.broker.token_url);
            println!("  Token name: {}", config.broker.token_name);
            println!("  Token group: {}", config.broker.token_group);
            println!("  Timeout: {}s", config.broker.timeout_seconds);
            println!("\nPortal:");
            println!("  Provider: {}", config.portal.provider_name);
            println!("  Aggregator: {}", config.portal.aggregator_name);
            println!("  URL: {}", config.portal.url);
            println!("\nStore:");
            match config.store.path {
                Some(ref path) => println!("  File: {}", path.display()),
                None => println!("  In-memory"),
            }
        }
        Err(e) => {
            eprintln!("✗ Configuration error: {}", e);
            std::process::exit(1);
        }
    }
}

/// Print the filtered catalog
async fn list_models(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let config = load_config_or_exit(config_path.as_deref());
    let http = build_http_client(&config).map_err(|e| anyhow::anyhow!("{}", e))?;

    if config.backend.shared_token().is_none() {
        println!("No backend.shared_token configured; the catalog is empty.");
        return Ok(());
    }

    let models = catalog::list_models(&http, &config.backend).await?;
    println!("Chat models at {} ({}):", config.backend.base_url(), models.len());
    for model in models {
        if model.name == model.id {
            println!("  - {}", model.id);
        } else {
            println!("  - {} ({})", model.id, model.name);
        }
    }

    Ok(())
}

/// Prints UI events to the terminal
struct TerminalEmitter;

#[async_trait]
impl EventEmitter for TerminalEmitter {
    async fn emit(&self, event: UiEvent) {
        match event {
            UiEvent::Status { description, done } => {
                println!("[{}] {}", if done { "done" } else { "...." }, description);
            }
            UiEvent::Notification { level, content } => {
                println!("[{:?}] {}", level, content);
            }
            UiEvent::Message { content } => println!("{}", content),
        }
    }
}

/// Run the access tool from the terminal
async fn enable_access(config_path: Option<PathBuf>, user_id: String) -> anyhow::Result<()> {
    let config = load_config_or_exit(config_path.as_deref());
    let http = build_http_client(&config).map_err(|e| anyhow::anyhow!("{}", e))?;
    let store = open_store(&config)?;

    let ctx = AccessContext {
        config: &config,
        http: &http,
        store: store.as_ref(),
    };
    let text = access::enable_model_access(&ctx, &user_id, &TerminalEmitter).await;
    println!("\n{}", text);

    Ok(())
}

/// Load configuration or exit with error
fn load_config_or_exit(config_path: Option<&Path>) -> AppConfig {
    match AppConfig::load_or_default(config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading configuration: {}", e);
            eprintln!("\nMake sure you have a config.yaml file.");
            eprintln!("You can copy config.yaml.default and modify it:");
            eprintln!("  cp config.yaml.default config.yaml");
            std::process::exit(1);
        }
    }
}
