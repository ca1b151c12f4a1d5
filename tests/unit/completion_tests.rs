//! Unit tests for the Anthropic client against a fake Messages API.

use std::sync::{Arc, Mutex};

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};

use chat_relay::completion::{AnthropicClient, CompletionClient, NO_ANSWER};
use chat_relay::config::CompletionConfig;
use chat_relay::AppError;

#[derive(Clone)]
struct FakeApi {
    status: StatusCode,
    reply: Value,
    seen: Arc<Mutex<Vec<(HeaderMap, Value)>>>,
}

async fn messages(
    State(api): State<FakeApi>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    api.seen.lock().unwrap().push((headers, body));
    (api.status, Json(api.reply.clone()))
}

/// Serve the fake API on an ephemeral port and return a client pointed at it.
async fn spawn_fake(status: StatusCode, reply: Value) -> (AnthropicClient, FakeApi) {
    let api = FakeApi {
        status,
        reply,
        seen: Arc::default(),
    };
    let app = Router::new()
        .route("/v1/messages", post(messages))
        .with_state(api.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    let config = CompletionConfig {
        api_base: format!("http://{addr}/"),
        model: "claude-test".into(),
        max_tokens: 64,
        api_key: Some("sk-test".into()),
        ..CompletionConfig::default()
    };
    let client = AnthropicClient::from_config(&config)
        .expect("client builds")
        .expect("api key present");
    (client, api)
}

#[test]
fn no_api_key_means_no_client() {
    let config = CompletionConfig::default();
    assert!(AnthropicClient::from_config(&config).unwrap().is_none());
}

#[tokio::test]
async fn text_block_is_the_answer() {
    let (client, api) = spawn_fake(
        StatusCode::OK,
        json!({ "content": [{ "type": "text", "text": "It is noon." }] }),
    )
    .await;

    let answer = client.complete("what time is it?").await.expect("answer");
    assert_eq!(answer, "It is noon.");

    let seen = api.seen.lock().unwrap();
    let (headers, body) = &seen[0];
    assert_eq!(headers["x-api-key"], "sk-test");
    assert_eq!(headers["anthropic-version"], "2023-06-01");
    assert_eq!(body["model"], "claude-test");
    assert_eq!(body["max_tokens"], 64);
    assert_eq!(
        body["messages"],
        json!([{ "role": "user", "content": "what time is it?" }])
    );
}

#[tokio::test]
async fn endpoint_joins_base_without_double_slash() {
    let (client, _api) = spawn_fake(StatusCode::OK, json!({ "content": [] })).await;
    assert!(client.endpoint().ends_with("/v1/messages"));
    assert!(!client.endpoint().contains("//v1"));
}

#[tokio::test]
async fn non_text_reply_uses_apology() {
    let (client, _api) = spawn_fake(
        StatusCode::OK,
        json!({ "content": [{ "type": "tool_use", "id": "t1", "name": "x", "input": {} }] }),
    )
    .await;

    assert_eq!(client.complete("hi").await.unwrap(), NO_ANSWER);
}

#[tokio::test]
async fn empty_reply_uses_apology() {
    let (client, _api) = spawn_fake(StatusCode::OK, json!({ "content": [] })).await;
    assert_eq!(client.complete("hi").await.unwrap(), NO_ANSWER);
}

#[tokio::test]
async fn error_status_is_upstream_error() {
    let (client, _api) = spawn_fake(
        StatusCode::UNAUTHORIZED,
        json!({ "type": "error", "error": { "type": "authentication_error", "message": "invalid x-api-key" } }),
    )
    .await;

    match client.complete("hi").await {
        Err(AppError::Upstream(msg)) => {
            assert!(msg.contains("401"), "got: {msg}");
            assert!(msg.contains("invalid x-api-key"), "got: {msg}");
        }
        other => panic!("expected upstream error, got: {other:?}"),
    }
}
