//! Unit tests for outbound envelopes and inbound line classification.

use serde_json::{json, Value};

use chat_relay::bridge::envelope::{parse_response_line, InboundLine};
use chat_relay::bridge::{Envelope, RpcResponse};
use chat_relay::AppError;

// ── Outbound ────────────────────────────────────────────────────────────────

#[test]
fn request_serializes_as_single_line_with_id() {
    let line = Envelope::request(1, "initialize", json!({ "protocolVersion": "2024-06-11" }))
        .to_line()
        .expect("serialize");

    assert!(!line.contains('\n'), "envelope must be a single line");
    let value: Value = serde_json::from_str(&line).expect("valid json");
    assert_eq!(value["jsonrpc"], "2.0");
    assert_eq!(value["id"], 1);
    assert_eq!(value["method"], "initialize");
    assert_eq!(value["params"]["protocolVersion"], "2024-06-11");
}

#[test]
fn notification_has_no_id() {
    let envelope = Envelope::notification("initialized", json!({}));
    assert!(envelope.is_notification());

    let value: Value = serde_json::from_str(&envelope.to_line().unwrap()).unwrap();
    assert!(value.get("id").is_none());
}

// ── Inbound classification ──────────────────────────────────────────────────

#[test]
fn result_response_is_classified() {
    let parsed = parse_response_line(r#"{"jsonrpc":"2.0","id":2,"result":{"ok":true}}"#);

    assert_eq!(
        parsed,
        InboundLine::Response(RpcResponse {
            id: 2,
            result: Some(json!({ "ok": true })),
            error: None,
        })
    );
}

#[test]
fn error_response_is_classified() {
    let parsed =
        parse_response_line(r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32601,"message":"nope"}}"#);

    let InboundLine::Response(response) = parsed else {
        panic!("expected a response, got: {parsed:?}");
    };
    let err = response.error.expect("error payload");
    assert_eq!(err.code, -32601);
    assert_eq!(err.message, "nope");
}

/// A server-initiated request carries an id too, but it is never a reply.
#[test]
fn line_with_method_is_a_server_message() {
    let parsed = parse_response_line(r#"{"jsonrpc":"2.0","id":1,"method":"ping","params":{}}"#);
    assert_eq!(
        parsed,
        InboundLine::ServerMessage {
            method: "ping".into()
        }
    );
}

#[test]
fn garbage_and_blank_lines_are_ignored() {
    for line in ["", "   ", "Starting time server...", "{\"id\":", "42"] {
        assert!(
            matches!(parse_response_line(line), InboundLine::Ignored { .. }),
            "line must be ignored: {line:?}"
        );
    }
}

#[test]
fn response_without_id_is_ignored() {
    assert!(matches!(
        parse_response_line(r#"{"jsonrpc":"2.0","result":{}}"#),
        InboundLine::Ignored { .. }
    ));
}

// ── into_result ─────────────────────────────────────────────────────────────

#[test]
fn into_result_surfaces_error_as_protocol() {
    let response = RpcResponse {
        id: 4,
        result: None,
        error: Some(serde_json::from_value(json!({ "code": -1, "message": "boom" })).unwrap()),
    };

    match response.into_result() {
        Err(AppError::Protocol(msg)) => {
            assert!(msg.contains("request 4"), "got: {msg}");
            assert!(msg.contains("boom"), "got: {msg}");
        }
        other => panic!("expected protocol error, got: {other:?}"),
    }
}

#[test]
fn into_result_without_payload_is_null() {
    let response = RpcResponse {
        id: 1,
        result: None,
        error: None,
    };
    assert_eq!(response.into_result().unwrap(), Value::Null);
}
