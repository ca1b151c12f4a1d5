//! Global configuration parsing, validation, and credential loading.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use crate::{AppError, Result};

/// Keychain service name under which credentials are stored.
pub const KEYRING_SERVICE: &str = "chat-relay";

/// Settings for the time-telling helper process.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", default)]
pub struct TimeToolConfig {
    /// Executable launched for each invocation (e.g. `python3`, `uvx`).
    pub command: String,
    /// Arguments passed to `command`.
    pub args: Vec<String>,
    /// Working directory for the helper; inherits the server's when unset.
    pub working_dir: Option<PathBuf>,
    /// IANA zone requested from the tool (e.g. `Asia/Singapore`).
    pub timezone: String,
    /// Name of the tool invoked via `tools/call`.
    pub tool_name: String,
    /// Grace period after spawn before the first request is written.
    pub startup_grace_ms: u64,
    /// Ceiling for each request/response round trip.
    pub request_timeout_ms: u64,
}

impl Default for TimeToolConfig {
    fn default() -> Self {
        Self {
            command: "python3".into(),
            args: vec![
                "-m".into(),
                "mcp_server_time".into(),
                "--local-timezone".into(),
                "Asia/Singapore".into(),
            ],
            working_dir: None,
            timezone: "Asia/Singapore".into(),
            tool_name: "get_current_time".into(),
            startup_grace_ms: 100,
            request_timeout_ms: 5000,
        }
    }
}

impl TimeToolConfig {
    /// Startup grace period as a [`Duration`].
    #[must_use]
    pub fn startup_grace(&self) -> Duration {
        Duration::from_millis(self.startup_grace_ms)
    }

    /// Per-request wait ceiling as a [`Duration`].
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Settings for the `SQLite` store whose snapshot is fed into the prompt.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", default)]
pub struct StoreConfig {
    /// `sqlx` connection URL (e.g. `sqlite://data/app.db?mode=ro`).
    pub database_url: String,
    /// Number of sample rows pulled from the first table.
    pub sample_rows: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://data/chat-relay.db?mode=rwc".into(),
            sample_rows: 3,
        }
    }
}

/// Settings for the hosted completion API.
///
/// The API key is loaded at runtime via OS keychain or environment
/// variable, never from the TOML file.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", default)]
pub struct CompletionConfig {
    /// Base URL of the Messages API.
    pub api_base: String,
    /// Model identifier.
    pub model: String,
    /// Upper bound on generated tokens.
    pub max_tokens: u32,
    /// Value of the `anthropic-version` header.
    pub api_version: String,
    /// Whole-request timeout for the completion call.
    pub timeout_seconds: u64,
    /// API key (populated at runtime).
    #[serde(skip)]
    pub api_key: Option<String>,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.anthropic.com".into(),
            model: "claude-3-5-sonnet-20240620".into(),
            max_tokens: 1024,
            api_version: "2023-06-01".into(),
            timeout_seconds: 60,
            api_key: None,
        }
    }
}

fn default_http_port() -> u16 {
    3000
}

fn default_bind_address() -> String {
    "127.0.0.1".into()
}

/// Global configuration parsed from `config.toml`.
///
/// Every field has a default, so an empty file yields a usable config.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// Address the HTTP server binds to.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// HTTP port for the chat endpoint.
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    /// Time helper process settings.
    #[serde(default)]
    pub time_tool: TimeToolConfig,
    /// Store snapshot settings.
    #[serde(default)]
    pub store: StoreConfig,
    /// Completion API settings.
    #[serde(default)]
    pub completion: CompletionConfig,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            http_port: default_http_port(),
            time_tool: TimeToolConfig::default(),
            store: StoreConfig::default(),
            completion: CompletionConfig::default(),
        }
    }
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string and validate it.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Load the completion API key from OS keychain with env-var fallback.
    ///
    /// A missing key is not an error here: the chat endpoint reports it
    /// per request so the rest of the service stays usable.
    pub async fn load_credentials(&mut self) {
        match load_credential("anthropic_api_key", "ANTHROPIC_API_KEY").await {
            Ok(key) => self.completion.api_key = Some(key),
            Err(err) => {
                warn!(%err, "completion api key unavailable; chat requests will fail");
                self.completion.api_key = None;
            }
        }
    }

    fn validate(&self) -> Result<()> {
        if self.time_tool.command.trim().is_empty() {
            return Err(AppError::Config(
                "time_tool.command must not be empty".into(),
            ));
        }

        if self.time_tool.timezone.trim().is_empty() {
            return Err(AppError::Config(
                "time_tool.timezone must not be empty".into(),
            ));
        }

        if self.time_tool.request_timeout_ms == 0 {
            return Err(AppError::Config(
                "time_tool.request_timeout_ms must be greater than zero".into(),
            ));
        }

        if self.completion.max_tokens == 0 {
            return Err(AppError::Config(
                "completion.max_tokens must be greater than zero".into(),
            ));
        }

        if self.completion.model.trim().is_empty() {
            return Err(AppError::Config("completion.model must not be empty".into()));
        }

        if self.store.database_url.trim().is_empty() {
            return Err(AppError::Config(
                "store.database_url must not be empty".into(),
            ));
        }

        Ok(())
    }
}

/// Load a single credential from OS keychain with env-var fallback.
async fn load_credential(keyring_key: &str, env_key: &str) -> Result<String> {
    let key = keyring_key.to_owned();

    // keyring is synchronous I/O.
    let keychain_result = tokio::task::spawn_blocking(move || {
        keyring::Entry::new(KEYRING_SERVICE, &key).and_then(|entry| entry.get_password())
    })
    .await
    .map_err(|err| AppError::Config(format!("keychain task panicked: {err}")))?;

    match keychain_result {
        Ok(value) if !value.is_empty() => return Ok(value),
        Ok(_) => {
            warn!(key = keyring_key, "keychain entry is empty, trying env var");
        }
        Err(err) => {
            tracing::debug!(
                key = keyring_key,
                ?err,
                "keychain lookup failed, trying env var"
            );
        }
    }

    match env::var(env_key) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(AppError::Config(format!(
            "credential {keyring_key} not found in keychain or {env_key} env var"
        ))),
    }
}
