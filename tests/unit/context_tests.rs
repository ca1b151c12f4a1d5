//! Unit tests for context resources and prompt rendering.

use serde_json::json;

use chat_relay::config::TimeToolConfig;
use chat_relay::context::{
    build_prompt, render_context, system_info_resource, time_info_resource, ContextAssembler,
    PROMPT_PREAMBLE,
};
use chat_relay::models::chat::ChatMessage;
use chat_relay::models::resource::ContextResource;
use chat_relay::models::time::{TimeInfo, TimeSource};
use chat_relay::tools::TimeToolClient;

fn live_time() -> TimeInfo {
    TimeInfo {
        current_time: "2024-01-01T00:00:00+08:00".into(),
        timezone: "Asia/Singapore".into(),
        is_dst: Some(false),
        source: TimeSource::Live,
        local_time: None,
        utc_offset: None,
    }
}

// ── Resources ───────────────────────────────────────────────────────────────

#[test]
fn system_info_names_model_and_version() {
    let resource = system_info_resource("claude-test");

    assert_eq!(resource.name, "system_info");
    assert_eq!(resource.data["app_name"], "chat-relay");
    assert_eq!(resource.data["ai_model"], "claude-test");
    assert_eq!(resource.data["version"], env!("CARGO_PKG_VERSION"));
    assert!(resource.data["features"].is_array());
}

#[test]
fn live_time_resource_reports_connected() {
    let resource = time_info_resource(&live_time());

    assert_eq!(resource.name, "time_info");
    assert_eq!(resource.data["tool_server"], "connected");
    assert_eq!(resource.data["source"], "live");
    assert_eq!(resource.data["timezone"], "Asia/Singapore");
    assert!(resource.description.contains("time tool server"));
}

#[test]
fn fallback_time_resource_reports_error_status() {
    let mut time = live_time();
    time.source = TimeSource::Fallback;

    let resource = time_info_resource(&time);

    assert_eq!(
        resource.data["tool_server"],
        "error - using system time as fallback"
    );
    assert!(resource.description.contains("fallback"));
}

// ── Rendering ───────────────────────────────────────────────────────────────

#[test]
fn context_block_lists_every_resource_in_order() {
    let resources = vec![
        ContextResource::new("first", "First block", json!({ "a": 1 })),
        ContextResource::new("second", "Second block", json!({ "b": [1, 2] })),
    ];

    let rendered = render_context(&resources);

    assert!(rendered.starts_with("Resource: first\nDescription: First block\nData: {\n  \"a\": 1\n}"));
    let first = rendered.find("Resource: first").unwrap();
    let second = rendered.find("Resource: second").unwrap();
    assert!(first < second);
    assert!(rendered.contains("\n\nResource: second\n"));
}

#[test]
fn prompt_layout_matches_expected_sections() {
    let resources = vec![ContextResource::new("r", "d", json!({}))];
    let messages = vec![
        ChatMessage::user("hello"),
        ChatMessage::bot("hi there"),
        ChatMessage::user("what time is it?"),
    ];

    let prompt = build_prompt(&resources, &messages);

    assert_eq!(
        prompt,
        format!(
            "{PROMPT_PREAMBLE}\n\nContext Data:\n\nResource: r\nDescription: d\nData: {{}}\n\n\
             User messages:\nuser: hello\nbot: hi there\nuser: what time is it?"
        )
    );
}

// ── Assembly ────────────────────────────────────────────────────────────────

/// Without a store and with an unusable helper, the context still carries
/// system facts and a fallback time, in that order.
#[tokio::test]
async fn gather_without_store_falls_back_for_time() {
    let config = TimeToolConfig {
        command: "/nonexistent/chat-relay-time-helper".into(),
        args: vec![],
        startup_grace_ms: 0,
        ..TimeToolConfig::default()
    };
    let assembler = ContextAssembler::new(TimeToolClient::new(config), None, "claude-test");

    let resources = assembler.gather().await;

    let names: Vec<&str> = resources.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["system_info", "time_info"]);
    assert_eq!(resources[1].data["source"], "fallback");
}
