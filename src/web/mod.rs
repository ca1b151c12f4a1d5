//! HTTP surface for the browser UI.
//!
//! Routes:
//! - `POST /api/chat`: answer a conversation with tool and store context.
//! - `GET /api/store-status`: store connectivity probe.
//! - `GET /health`: liveness.

pub mod handlers;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::completion::CompletionClient;
use crate::config::GlobalConfig;
use crate::context::ContextAssembler;
use crate::{AppError, Result};

/// Shared state handed to every handler.
pub struct AppState {
    /// Loaded configuration.
    pub config: Arc<GlobalConfig>,
    /// Context sources for each chat turn.
    pub assembler: ContextAssembler,
    /// Completion provider; `None` when no API key was loaded.
    pub completion: Option<Arc<dyn CompletionClient>>,
}

/// Build the axum router over `state`.
#[must_use]
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/chat", post(handlers::chat))
        .route("/api/store-status", get(handlers::store_status))
        .route("/health", get(handlers::health))
        .with_state(state)
}

/// Bind `bind_address:http_port` and serve until `ct` is cancelled.
///
/// # Errors
///
/// Returns `AppError::Config` if the address is invalid or cannot be bound.
pub async fn serve_http(state: Arc<AppState>, ct: CancellationToken) -> Result<()> {
    let raw = format!("{}:{}", state.config.bind_address, state.config.http_port);
    let bind: SocketAddr = raw
        .parse()
        .map_err(|err| AppError::Config(format!("invalid bind address {raw}: {err}")))?;

    let listener = TcpListener::bind(bind)
        .await
        .map_err(|err| AppError::Config(format!("failed to bind HTTP on {bind}: {err}")))?;

    serve_listener(listener, state, ct).await
}

/// Serve on an already bound listener until `ct` is cancelled.
///
/// # Errors
///
/// Returns `AppError::Io` if the server stops with an error.
pub async fn serve_listener(
    listener: TcpListener,
    state: Arc<AppState>,
    ct: CancellationToken,
) -> Result<()> {
    let local = listener
        .local_addr()
        .map_err(|err| AppError::Io(format!("listener has no local address: {err}")))?;
    info!(bind = %local, "starting HTTP server");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { ct.cancelled().await })
        .await
        .map_err(|err| AppError::Io(format!("HTTP server error: {err}")))?;

    info!("HTTP server shut down");
    Ok(())
}
