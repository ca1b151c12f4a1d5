//! A live connection to one tool helper process.
//!
//! [`ToolBridge`] offers the two protocol primitives, [`ToolBridge::send`]
//! (fire-and-forget write) and [`ToolBridge::await_response`] (wait for a
//! correlated reply), plus [`ToolBridge::terminate`]. Every failure at the
//! process boundary terminates the helper before the error is returned.

use std::process::ExitStatus;
use std::time::Duration;

use bytes::BytesMut;
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin};
use tokio::task::JoinHandle;
use tokio_util::codec::Encoder;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::bridge::codec::LineCodec;
use crate::bridge::envelope::{Envelope, RpcResponse};
use crate::bridge::router::{drain_stderr, run_reader, ResponseRouter, Slot};
use crate::bridge::spawner::{spawn_tool, SpawnConfig, ToolProcess};
use crate::{AppError, Result};

/// Time a helper gets to exit after stdin closes and `SIGTERM` is sent,
/// before it is force-killed.
pub const KILL_GRACE: Duration = Duration::from_millis(500);

/// Owner of one helper process and its stdio.
#[derive(Debug)]
pub struct ToolBridge {
    tool: String,
    child: Child,
    /// `None` once the bridge has terminated.
    stdin: Option<ChildStdin>,
    router: ResponseRouter,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
    next_id: u64,
    exit_status: Option<ExitStatus>,
}

impl ToolBridge {
    /// Spawn the helper, start its reader tasks, and wait out the startup
    /// grace period.
    ///
    /// # Errors
    ///
    /// - `AppError::Spawn`: the executable could not be started.
    /// - `AppError::Crash`: the helper exited during the grace period.
    pub async fn spawn(config: &SpawnConfig) -> Result<Self> {
        let ToolProcess {
            child,
            stdin,
            stdout,
            stderr,
        } = spawn_tool(config)?;

        let router = ResponseRouter::new();
        let cancel = CancellationToken::new();

        let reader = tokio::spawn(run_reader(
            config.tool.clone(),
            stdout,
            router.clone(),
            cancel.child_token(),
        ));
        let stderr_task = tokio::spawn(drain_stderr(
            config.tool.clone(),
            stderr,
            cancel.child_token(),
        ));

        let mut bridge = Self {
            tool: config.tool.clone(),
            child,
            stdin: Some(stdin),
            router,
            cancel,
            tasks: vec![reader, stderr_task],
            next_id: 1,
            exit_status: None,
        };

        if !config.startup_grace.is_zero() {
            tokio::time::sleep(config.startup_grace).await;
        }

        if bridge.has_exited() {
            let status = bridge.describe_exit();
            bridge.terminate().await;
            return Err(AppError::Crash(format!(
                "{} helper exited during startup: {status}",
                config.tool
            )));
        }

        Ok(bridge)
    }

    /// Allocate the next request id: 1, 2, 3, … Ids are never reused within
    /// a bridge, whether or not the request succeeds.
    pub fn next_request_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// OS process id of the helper, while it is running.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    /// Shared response router (exposed for inspection in tests and logs).
    #[must_use]
    pub fn router(&self) -> &ResponseRouter {
        &self.router
    }

    /// Write one envelope as a single newline-terminated JSON line.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Crash` if the bridge was terminated or the write
    /// fails (broken pipe); the helper is terminated in the latter case.
    pub async fn send(&mut self, envelope: &Envelope) -> Result<()> {
        let line = envelope.to_line()?;
        let mut buf = BytesMut::with_capacity(line.len() + 1);
        LineCodec::new().encode(line, &mut buf)?;

        let Some(stdin) = self.stdin.as_mut() else {
            return Err(AppError::Crash(format!(
                "{} helper already terminated",
                self.tool
            )));
        };

        let written = match stdin.write_all(&buf).await {
            Ok(()) => stdin.flush().await,
            Err(err) => Err(err),
        };

        if let Err(err) = written {
            warn!(tool = %self.tool, method = %envelope.method, %err, "tool bridge: write to stdin failed");
            self.terminate().await;
            return Err(AppError::Crash(format!(
                "write to {} helper failed: {err}",
                self.tool
            )));
        }

        debug!(
            tool = %self.tool,
            method = %envelope.method,
            id = ?envelope.id,
            "tool bridge: envelope sent"
        );
        Ok(())
    }

    /// Wait for the first response whose id equals `id`.
    ///
    /// Unrelated, duplicate, and malformed lines around the match are
    /// skipped. A response that arrived before this call is returned
    /// immediately.
    ///
    /// # Errors
    ///
    /// - `AppError::Timeout`: nothing matched within `timeout`.
    /// - `AppError::Crash`: the helper's output ended first.
    ///
    /// The helper is terminated on either error.
    pub async fn await_response(&mut self, id: u64, timeout: Duration) -> Result<RpcResponse> {
        let rx = match self.router.register(id) {
            Ok(Slot::Ready(response)) => return Ok(response),
            Ok(Slot::Pending(rx)) if self.stdin.is_some() => rx,
            Ok(Slot::Pending(_)) => {
                self.router.forget(id);
                return Err(AppError::Crash(format!(
                    "{} helper already terminated",
                    self.tool
                )));
            }
            Err(err) => {
                self.terminate().await;
                return Err(err);
            }
        };

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_closed)) => {
                let reason = self
                    .router
                    .closed_reason()
                    .unwrap_or_else(|| "stream closed".into());
                self.terminate().await;
                Err(AppError::Crash(format!(
                    "{} helper exited before responding to request {id}: {reason}",
                    self.tool
                )))
            }
            Err(_elapsed) => {
                self.router.forget(id);
                warn!(tool = %self.tool, id, ?timeout, "tool bridge: response timeout");
                self.terminate().await;
                Err(AppError::Timeout(format!(
                    "{} helper did not respond to request {id} within {timeout:?}",
                    self.tool
                )))
            }
        }
    }

    /// Send a request with a fresh id and wait for its response.
    ///
    /// # Errors
    ///
    /// Any error from [`Self::send`] or [`Self::await_response`].
    pub async fn request(
        &mut self,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<RpcResponse> {
        let id = self.next_request_id();
        self.send(&Envelope::request(id, method, params)).await?;
        self.await_response(id, timeout).await
    }

    /// Send a notification; nothing is awaited.
    ///
    /// # Errors
    ///
    /// Any error from [`Self::send`].
    pub async fn notify(&mut self, method: &str, params: Value) -> Result<()> {
        self.send(&Envelope::notification(method, params)).await
    }

    /// Whether the helper process has exited.
    pub fn has_exited(&mut self) -> bool {
        if self.exit_status.is_some() {
            return true;
        }
        match self.child.try_wait() {
            Ok(Some(status)) => {
                self.exit_status = Some(status);
                true
            }
            Ok(None) => false,
            Err(err) => {
                warn!(tool = %self.tool, %err, "tool bridge: failed to poll helper status");
                false
            }
        }
    }

    /// Stop the helper. Idempotent.
    ///
    /// Closes stdin, signals `SIGTERM` (unix), waits up to [`KILL_GRACE`],
    /// then force-kills. Reader tasks are cancelled either way.
    pub async fn terminate(&mut self) {
        let Some(stdin) = self.stdin.take() else {
            return;
        };
        drop(stdin);
        self.cancel.cancel();

        if !self.has_exited() {
            self.stop_running_child().await;
        }

        for task in self.tasks.drain(..) {
            task.abort();
        }

        info!(tool = %self.tool, status = %self.describe_exit(), "tool helper terminated");
    }

    async fn stop_running_child(&mut self) {
        #[cfg(unix)]
        if let Some(pid) = self.child.id() {
            send_sigterm(&self.tool, pid);
        }

        match tokio::time::timeout(KILL_GRACE, self.child.wait()).await {
            Ok(Ok(status)) => {
                self.exit_status = Some(status);
                return;
            }
            Ok(Err(err)) => {
                warn!(tool = %self.tool, %err, "tool bridge: error waiting for helper exit");
            }
            Err(_elapsed) => {
                debug!(tool = %self.tool, "tool bridge: helper ignored SIGTERM, killing");
            }
        }

        if let Err(err) = self.child.kill().await {
            warn!(tool = %self.tool, %err, "tool bridge: failed to kill helper");
        }
        if let Ok(Some(status)) = self.child.try_wait() {
            self.exit_status = Some(status);
        }
    }

    fn describe_exit(&self) -> String {
        self.exit_status.map_or_else(
            || "status unknown".to_owned(),
            |status| {
                status.code().map_or_else(
                    || "terminated by signal".to_owned(),
                    |code| format!("exited with code {code}"),
                )
            },
        )
    }
}

impl Drop for ToolBridge {
    fn drop(&mut self) {
        // The child itself is reaped by `kill_on_drop`.
        self.cancel.cancel();
    }
}

#[cfg(unix)]
fn send_sigterm(tool: &str, pid: u32) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        return;
    };
    if let Err(err) = kill(Pid::from_raw(raw), Signal::SIGTERM) {
        debug!(tool, pid, %err, "tool bridge: SIGTERM failed");
    }
}
