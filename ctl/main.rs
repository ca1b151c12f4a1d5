#![forbid(unsafe_code)]

//! `chat-relay-probe`: run one time tool handshake from the command line.
//!
//! Prints the resulting time answer as JSON. Useful for checking that the
//! configured helper starts and answers before pointing the server at it.

use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

use chat_relay::config::GlobalConfig;
use chat_relay::tools::TimeToolClient;
use chat_relay::{AppError, Result};

#[derive(Debug, Parser)]
#[command(
    name = "chat-relay-probe",
    about = "Query the configured time tool once",
    version,
    long_about = None
)]
struct Cli {
    /// Path to the TOML configuration file. Defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the zone passed to the tool.
    #[arg(long)]
    timezone: Option<String>,

    /// Exit non-zero instead of falling back to the host clock.
    #[arg(long)]
    strict: bool,
}

fn main() {
    let args = Cli::parse();

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .try_init();

    if let Err(err) = run(&args) {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

fn run(args: &Cli) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => GlobalConfig::load_from_path(path)?,
        None => GlobalConfig::default(),
    };
    if let Some(zone) = &args.timezone {
        config.time_tool.timezone.clone_from(zone);
    }

    let client = TimeToolClient::new(config.time_tool);
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?;

    let info = runtime.block_on(async {
        if args.strict {
            client.fetch_live().await
        } else {
            Ok(client.fetch_current_time().await)
        }
    })?;

    let rendered = serde_json::to_string_pretty(&info)
        .map_err(|err| AppError::Io(format!("failed to render result: {err}")))?;
    println!("{rendered}");
    Ok(())
}
