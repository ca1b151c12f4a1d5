//! Tool helper process spawner.
//!
//! Launches one helper process per invocation with:
//! - `kill_on_drop(true)` so an abandoned handle never leaks the process.
//! - `env_clear()` + an allowlist so the completion API key and other
//!   secrets never reach the helper.
//! - All three stdio streams piped.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tracing::info;

use crate::config::TimeToolConfig;
use crate::{AppError, Result};

/// Environment variables inherited by the helper process.
///
/// Every other variable from the server's environment is stripped.
pub const ALLOWED_ENV_VARS: &[&str] = &[
    "PATH",
    "HOME",
    "LANG",
    "TZ",
    "PYTHONPATH",
    "VIRTUAL_ENV",
    "RUST_LOG",
    // Windows-specific variables.
    "USERPROFILE",
    "SystemRoot",
    "TEMP",
    "TMP",
    "APPDATA",
    "LOCALAPPDATA",
    "COMSPEC",
];

/// How to launch a helper.
#[derive(Debug, Clone)]
pub struct SpawnConfig {
    /// Label used in logs (e.g. `time`).
    pub tool: String,
    /// Executable to run.
    pub command: String,
    /// Arguments passed to `command`.
    pub args: Vec<String>,
    /// Working directory; inherits the server's when `None`.
    pub working_dir: Option<PathBuf>,
    /// Delay after spawn before the first write, letting the helper's event
    /// loop start. An exit during this window is reported as a crash.
    pub startup_grace: Duration,
}

impl SpawnConfig {
    /// Build a spawn config for the time helper.
    #[must_use]
    pub fn for_time_tool(config: &TimeToolConfig) -> Self {
        Self {
            tool: "time".into(),
            command: config.command.clone(),
            args: config.args.clone(),
            working_dir: config.working_dir.clone(),
            startup_grace: config.startup_grace(),
        }
    }
}

/// Raw stdio handles of a freshly spawned helper.
#[derive(Debug)]
pub struct ToolProcess {
    /// Child process handle; kept alive so `kill_on_drop` works.
    pub child: Child,
    /// Helper's stdin for outbound envelopes.
    pub stdin: ChildStdin,
    /// Helper's stdout carrying responses.
    pub stdout: ChildStdout,
    /// Helper's stderr; drained into the log.
    pub stderr: ChildStderr,
}

/// Spawn a helper process.
///
/// # Errors
///
/// - `AppError::Spawn("failed to spawn …")`: OS spawn failure (missing
///   executable, bad working directory, permissions).
/// - `AppError::Spawn("failed to capture …")`: a stdio pipe was not created.
pub fn spawn_tool(config: &SpawnConfig) -> Result<ToolProcess> {
    let mut cmd = Command::new(&config.command);
    cmd.args(&config.args);

    cmd.env_clear();
    for &key in ALLOWED_ENV_VARS {
        if let Ok(val) = std::env::var(key) {
            cmd.env(key, val);
        }
    }

    if let Some(dir) = &config.working_dir {
        cmd.current_dir(dir);
    }

    cmd.stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd.spawn().map_err(|err| {
        AppError::Spawn(format!(
            "failed to spawn {} helper `{}`: {err}",
            config.tool, config.command
        ))
    })?;

    let stdin = child
        .stdin
        .take()
        .ok_or_else(|| AppError::Spawn("failed to capture helper stdin".into()))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| AppError::Spawn("failed to capture helper stdout".into()))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| AppError::Spawn("failed to capture helper stderr".into()))?;

    info!(
        tool = %config.tool,
        command = %config.command,
        pid = ?child.id(),
        "tool helper spawned"
    );

    Ok(ToolProcess {
        child,
        stdin,
        stdout,
        stderr,
    })
}
