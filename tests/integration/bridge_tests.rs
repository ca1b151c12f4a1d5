//! Integration tests for the helper process bridge, driven by `sh` stubs.

#![cfg(unix)]

use std::time::Duration;

use serde_json::json;

use chat_relay::bridge::{Envelope, ToolBridge};
use chat_relay::AppError;

use super::test_helpers::{emit, stub_spawn_config, INIT_OK};

const TIMEOUT: Duration = Duration::from_secs(2);

// ── Spawn ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn missing_executable_is_a_spawn_error() {
    let mut config = stub_spawn_config("true");
    config.command = "/nonexistent/chat-relay-helper".into();

    match ToolBridge::spawn(&config).await {
        Err(AppError::Spawn(msg)) => assert!(msg.contains("failed to spawn"), "got: {msg}"),
        other => panic!("expected spawn error, got: {other:?}"),
    }
}

#[tokio::test]
async fn exit_during_startup_is_a_crash() {
    let mut config = stub_spawn_config("exit 3");
    config.startup_grace = Duration::from_millis(300);

    match ToolBridge::spawn(&config).await {
        Err(AppError::Crash(msg)) => assert!(msg.contains("during startup"), "got: {msg}"),
        other => panic!("expected crash, got: {other:?}"),
    }
}

// ── Correlation ─────────────────────────────────────────────────────────────

/// Log chatter, blank lines, and a server-initiated request surround the
/// real reply; the reply is still matched.
#[tokio::test]
async fn noise_around_response_is_skipped() {
    let script = format!(
        "read req; echo 'time server starting'; echo; {}; {}; cat >/dev/null",
        emit(r#"{"jsonrpc":"2.0","id":1,"method":"roots/list"}"#),
        emit(INIT_OK)
    );
    let mut bridge = ToolBridge::spawn(&stub_spawn_config(&script))
        .await
        .expect("spawn");

    let response = bridge
        .request("initialize", json!({}), TIMEOUT)
        .await
        .expect("response");

    assert_eq!(response.id, 1);
    assert_eq!(response.result.unwrap()["serverInfo"]["name"], "stub-time");
    bridge.terminate().await;
}

/// A 1.1 MB line printed in the same burst as the reply is dropped and the
/// reply still arrives before the helper goes quiet.
#[tokio::test]
async fn reply_after_over_long_line_is_delivered() {
    let script = format!(
        "read req; {{ head -c 1100000 /dev/zero | tr '\\000' a; echo; {}; }}; cat >/dev/null",
        emit(INIT_OK)
    );
    let mut bridge = ToolBridge::spawn(&stub_spawn_config(&script))
        .await
        .expect("spawn");

    let response = bridge
        .request("initialize", json!({}), TIMEOUT)
        .await
        .expect("response");

    assert_eq!(response.id, 1);
    bridge.terminate().await;
}

#[tokio::test]
async fn binary_chatter_before_reply_is_skipped() {
    let script = format!(
        "read req; printf 'log \\377\\376 chatter\\n'; {}; cat >/dev/null",
        emit(INIT_OK)
    );
    let mut bridge = ToolBridge::spawn(&stub_spawn_config(&script))
        .await
        .expect("spawn");

    let response = bridge
        .request("initialize", json!({}), TIMEOUT)
        .await
        .expect("response");

    assert_eq!(response.result.unwrap()["serverInfo"]["name"], "stub-time");
    assert!(!bridge.has_exited());
    bridge.terminate().await;
}

/// A reply printed before the request is written is still delivered.
#[tokio::test]
async fn early_response_is_delivered() {
    let script = format!("{}; cat >/dev/null", emit(INIT_OK));
    let mut bridge = ToolBridge::spawn(&stub_spawn_config(&script))
        .await
        .expect("spawn");

    let id = bridge.next_request_id();
    bridge
        .send(&Envelope::request(id, "initialize", json!({})))
        .await
        .expect("send");
    let response = bridge.await_response(id, TIMEOUT).await.expect("response");

    assert_eq!(response.id, 1);
    bridge.terminate().await;
}

#[tokio::test]
async fn request_ids_increase_from_one() {
    let mut bridge = ToolBridge::spawn(&stub_spawn_config("cat >/dev/null"))
        .await
        .expect("spawn");

    assert_eq!(bridge.next_request_id(), 1);
    assert_eq!(bridge.next_request_id(), 2);
    assert_eq!(bridge.next_request_id(), 3);
    bridge.terminate().await;
}

// ── Failure paths ───────────────────────────────────────────────────────────

#[tokio::test]
async fn silent_helper_times_out_and_is_terminated() {
    let mut bridge = ToolBridge::spawn(&stub_spawn_config("cat >/dev/null"))
        .await
        .expect("spawn");
    assert!(bridge.pid().is_some());

    let result = bridge
        .request("initialize", json!({}), Duration::from_millis(150))
        .await;

    assert!(matches!(result, Err(AppError::Timeout(_))), "got: {result:?}");
    assert!(bridge.pid().is_none(), "helper must be reaped after timeout");
    assert_eq!(bridge.router().pending_count(), 0);
}

#[tokio::test]
async fn helper_exit_before_reply_is_a_crash() {
    let mut bridge = ToolBridge::spawn(&stub_spawn_config("read req; exit 0"))
        .await
        .expect("spawn");

    let result = bridge.request("initialize", json!({}), TIMEOUT).await;

    assert!(matches!(result, Err(AppError::Crash(_))), "got: {result:?}");
}

/// A helper that ignores SIGTERM is force-killed after the grace period.
#[tokio::test]
async fn terminate_kills_helper_ignoring_sigterm() {
    let mut bridge = ToolBridge::spawn(&stub_spawn_config("trap '' TERM; while :; do sleep 1; done"))
        .await
        .expect("spawn");

    tokio::time::timeout(Duration::from_secs(5), bridge.terminate())
        .await
        .expect("terminate must finish");
    assert!(bridge.has_exited());

    // Idempotent.
    bridge.terminate().await;
}

#[tokio::test]
async fn send_after_terminate_is_a_crash() {
    let mut bridge = ToolBridge::spawn(&stub_spawn_config("cat >/dev/null"))
        .await
        .expect("spawn");
    bridge.terminate().await;

    let result = bridge.notify("initialized", json!({})).await;
    assert!(matches!(result, Err(AppError::Crash(_))), "got: {result:?}");
}
