#![forbid(unsafe_code)]

//! `chat-relay` server binary.
//!
//! Loads configuration and credentials, wires the time tool client, the
//! store inspector, and the completion client into the HTTP surface, then
//! serves until SIGTERM or ctrl-c.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use chat_relay::completion::{AnthropicClient, CompletionClient};
use chat_relay::config::GlobalConfig;
use chat_relay::context::{ContextAssembler, StoreInspector};
use chat_relay::tools::TimeToolClient;
use chat_relay::web::{self, AppState};
use chat_relay::{AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "chat-relay", about = "Chat backend with tool and store context", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file. Defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the HTTP port from the configuration.
    #[arg(long)]
    port: Option<u16>,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("chat-relay server bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    // ── Load configuration ──────────────────────────────
    let mut config = match &args.config {
        Some(path) => GlobalConfig::load_from_path(path)?,
        None => {
            info!("no config file given; using defaults");
            GlobalConfig::default()
        }
    };
    if let Some(port) = args.port {
        config.http_port = port;
    }
    config.load_credentials().await;

    let config = Arc::new(config);
    info!(
        time_tool = %config.time_tool.command,
        timezone = %config.time_tool.timezone,
        model = %config.completion.model,
        "configuration loaded"
    );

    // ── Context sources ─────────────────────────────────
    let store = match StoreInspector::connect_lazy(&config.store) {
        Ok(store) => Some(store),
        Err(err) => {
            warn!(%err, url = %config.store.database_url, "store disabled");
            None
        }
    };
    let assembler = ContextAssembler::new(
        TimeToolClient::new(config.time_tool.clone()),
        store,
        config.completion.model.clone(),
    );

    let completion = AnthropicClient::from_config(&config.completion)?
        .map(|client| Arc::new(client) as Arc<dyn CompletionClient>);

    let state = Arc::new(AppState {
        config: Arc::clone(&config),
        assembler,
        completion,
    });

    // ── Serve ───────────────────────────────────────────
    let ct = CancellationToken::new();
    let http_ct = ct.clone();
    let http_state = Arc::clone(&state);
    let http_handle = tokio::spawn(async move {
        if let Err(err) = web::serve_http(http_state, http_ct.clone()).await {
            error!(%err, "http server failed");
            http_ct.cancel();
        }
    });

    info!("chat-relay ready");

    tokio::select! {
        () = shutdown_signal() => info!("shutdown signal received"),
        () = ct.cancelled() => warn!("http server stopped unexpectedly"),
    }
    ct.cancel();

    if let Err(err) = http_handle.await {
        error!(%err, "http task join failed");
    }
    info!("chat-relay shut down");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
