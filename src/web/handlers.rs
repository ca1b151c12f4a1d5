//! Route handlers.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::AppState;
use crate::context::build_prompt;
use crate::context::store::describe_store_error;
use crate::models::chat::{ChatReply, ChatRequest, ErrorBody};
use crate::AppError;

fn error_response(status: StatusCode, error: &str, details: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorBody {
            error: error.to_owned(),
            details: details.into(),
        }),
    )
        .into_response()
}

/// `POST /api/chat`.
pub async fn chat(
    State(state): State<Arc<AppState>>,
    body: Result<Json<ChatRequest>, JsonRejection>,
) -> Response {
    let request_id = Uuid::new_v4();
    let span = info_span!("chat", %request_id);
    answer(&state, body).instrument(span).await
}

async fn answer(state: &AppState, body: Result<Json<ChatRequest>, JsonRejection>) -> Response {
    let request = match body {
        Ok(Json(request)) => request,
        Err(rejection) => {
            warn!(%rejection, "rejected chat body");
            return error_response(StatusCode::BAD_REQUEST, "Invalid request", rejection.body_text());
        }
    };
    if let Err(err) = request.validate() {
        let details = match err {
            AppError::InvalidRequest(msg) => msg,
            other => other.to_string(),
        };
        return error_response(StatusCode::BAD_REQUEST, "Invalid request", details);
    }

    let Some(completion) = state.completion.as_ref() else {
        error!("chat requested without a completion API key");
        return error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "API key not configured",
            "set ANTHROPIC_API_KEY or the keyring entry anthropic_api_key",
        );
    };

    let resources = state.assembler.gather().await;
    let prompt = build_prompt(&resources, &request.messages);
    info!(
        messages = request.messages.len(),
        resources = resources.len(),
        "context assembled"
    );

    match completion.complete(&prompt).await {
        Ok(content) => {
            info!(answer_len = content.len(), "chat answered");
            (StatusCode::OK, Json(ChatReply { content })).into_response()
        }
        Err(err) => {
            error!(%err, "completion failed");
            error_response(
                StatusCode::BAD_GATEWAY,
                "Failed to process chat message",
                err.to_string(),
            )
        }
    }
}

/// `GET /api/store-status`.
pub async fn store_status(State(state): State<Arc<AppState>>) -> Response {
    let outcome = match state.assembler.store() {
        Some(store) => store.ping().await,
        None => Err(AppError::Db("no store configured".into())),
    };

    match outcome {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({
                "status": "connected",
                "message": "Successfully connected to store",
            })),
        )
            .into_response(),
        Err(err) => {
            warn!(%err, "store status probe failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "status": "disconnected",
                    "message": "Failed to connect to store",
                    "error": describe_store_error(&err),
                })),
            )
                .into_response()
        }
    }
}

/// `GET /health`.
pub async fn health() -> &'static str {
    "ok"
}
