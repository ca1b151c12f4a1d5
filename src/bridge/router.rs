//! Id-correlated response dispatch.
//!
//! The reader task splits complete lines off the helper's stdout (see
//! [`LineCodec`]), parses each one once, and hands responses to the
//! [`ResponseRouter`]. A waiter registered for an id receives the first
//! response carrying that id. Responses that arrive before anyone waits are
//! parked until claimed, so the order of `send` / `await_response` relative
//! to the helper's output never matters.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_util::StreamExt;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::oneshot;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::bridge::codec::LineCodec;
use crate::bridge::envelope::{parse_response_line, InboundLine, RpcResponse};
use crate::{AppError, Result};

#[derive(Debug, Default)]
struct RouterState {
    /// Callers blocked on a response: `id` → completion handle.
    waiters: HashMap<u64, oneshot::Sender<RpcResponse>>,
    /// Responses nobody has asked for yet.
    arrived: HashMap<u64, RpcResponse>,
    /// Ids already handed to a waiter; later duplicates are dropped.
    delivered: HashSet<u64>,
    /// Set once the stream has ended; carries the reason.
    closed: Option<String>,
}

/// Result of registering interest in a response id.
#[derive(Debug)]
pub enum Slot {
    /// The response had already arrived.
    Ready(RpcResponse),
    /// The response will be delivered through this receiver. The sender is
    /// dropped if the stream closes first.
    Pending(oneshot::Receiver<RpcResponse>),
}

/// Shared dispatch table between the reader task and the bridge.
#[derive(Debug, Clone, Default)]
pub struct ResponseRouter {
    state: Arc<Mutex<RouterState>>,
}

impl ResponseRouter {
    /// Create an empty router.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RouterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Parse one line of helper output and route it.
    ///
    /// Returns the id of the response the line carried, if any. Blank,
    /// malformed, and server-initiated lines are logged and skipped.
    pub fn dispatch_line(&self, line: &str) -> Option<u64> {
        match parse_response_line(line) {
            InboundLine::Response(response) => {
                let id = response.id;
                self.deliver(response);
                Some(id)
            }
            InboundLine::ServerMessage { method } => {
                debug!(method = %method, "tool bridge: skipping server-initiated message");
                None
            }
            InboundLine::Ignored { reason } => {
                debug!(reason = %reason, raw_line = line, "tool bridge: skipping line");
                None
            }
        }
    }

    /// Route a parsed response to its waiter, or park it.
    pub fn deliver(&self, response: RpcResponse) {
        let mut state = self.lock();
        let id = response.id;

        if state.delivered.contains(&id) || state.arrived.contains_key(&id) {
            debug!(id, "tool bridge: dropping duplicate response");
            return;
        }

        match state.waiters.remove(&id) {
            Some(tx) => {
                state.delivered.insert(id);
                if tx.send(response).is_err() {
                    debug!(id, "tool bridge: waiter gone before response arrived");
                }
            }
            None => {
                state.arrived.insert(id, response);
            }
        }
    }

    /// Register interest in the response for `id`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Crash` if the stream has already closed and no
    /// response for `id` was received before it did.
    pub fn register(&self, id: u64) -> Result<Slot> {
        let mut state = self.lock();

        if let Some(response) = state.arrived.remove(&id) {
            state.delivered.insert(id);
            return Ok(Slot::Ready(response));
        }

        if let Some(reason) = &state.closed {
            return Err(AppError::Crash(format!(
                "tool exited before responding to request {id}: {reason}"
            )));
        }

        let (tx, rx) = oneshot::channel();
        state.waiters.insert(id, tx);
        Ok(Slot::Pending(rx))
    }

    /// Stop waiting for `id` (after a timeout).
    pub fn forget(&self, id: u64) {
        self.lock().waiters.remove(&id);
    }

    /// Mark the stream as ended. Pending waiters observe a closed channel.
    ///
    /// Only the first reason is kept.
    pub fn close(&self, reason: &str) {
        let mut state = self.lock();
        if state.closed.is_none() {
            state.closed = Some(reason.to_owned());
        }
        state.waiters.clear();
    }

    /// Reason the stream closed, if it has.
    #[must_use]
    pub fn closed_reason(&self) -> Option<String> {
        self.lock().closed.clone()
    }

    /// Number of callers currently blocked on a response.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.lock().waiters.len()
    }
}

/// Reader task: frame `stdout` into lines and feed them to `router`.
///
/// Unusable lines never reach here (see [`LineCodec`]). EOF or a read error
/// closes the router. Cancellation exits without closing it.
pub async fn run_reader<R>(
    tool: String,
    stdout: R,
    router: ResponseRouter,
    cancel: CancellationToken,
) where
    R: AsyncRead + Unpin + Send,
{
    let mut framed = FramedRead::new(stdout, LineCodec::new());

    loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                debug!(tool = %tool, "tool reader: cancellation received, stopping");
                break;
            }

            item = framed.next() => {
                match item {
                    None => {
                        debug!(
                            tool = %tool,
                            skipped = framed.decoder().skipped_lines(),
                            "tool reader: EOF detected"
                        );
                        router.close("stream closed");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(tool = %tool, error = %e, "tool reader: read failed, stopping");
                        router.close(&format!("stream error: {e}"));
                        break;
                    }
                    Some(Ok(line)) => {
                        if let Some(id) = router.dispatch_line(&line) {
                            debug!(tool = %tool, id, "tool reader: response received");
                        }
                    }
                }
            }
        }
    }
}

/// Drain the helper's stderr into the log so the pipe never fills.
pub async fn drain_stderr<R>(tool: String, stderr: R, cancel: CancellationToken)
where
    R: AsyncRead + Unpin + Send,
{
    let mut lines = BufReader::new(stderr).lines();

    loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => break,

            line = lines.next_line() => match line {
                Ok(Some(text)) => debug!(tool = %tool, stderr = %text, "tool stderr"),
                Ok(None) => break,
                Err(err) => {
                    debug!(tool = %tool, %err, "tool stderr: read failed");
                    break;
                }
            },
        }
    }
}
