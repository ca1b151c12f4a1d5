//! Shared helpers for integration tests.

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use chat_relay::bridge::SpawnConfig;
use chat_relay::completion::CompletionClient;
use chat_relay::config::{GlobalConfig, TimeToolConfig};
use chat_relay::context::{ContextAssembler, StoreInspector};
use chat_relay::tools::TimeToolClient;
use chat_relay::web::{serve_listener, AppState};

/// Successful `initialize` reply.
pub const INIT_OK: &str = r#"{"jsonrpc":"2.0","id":1,"result":{"protocolVersion":"2024-06-11","capabilities":{"tools":{}},"serverInfo":{"name":"stub-time","version":"0.0.1"}}}"#;

/// Successful `tools/call` reply carrying the time at the top level.
pub const CALL_OK: &str = r#"{"jsonrpc":"2.0","id":2,"result":{"datetime":"2024-01-01T00:00:00+08:00","timezone":"Asia/Singapore","is_dst":false}}"#;

/// Time tool config running `script` under `sh -c` with short timings.
pub fn stub_time_config(script: &str) -> TimeToolConfig {
    TimeToolConfig {
        command: "sh".into(),
        args: vec!["-c".into(), script.into()],
        working_dir: None,
        timezone: "Asia/Singapore".into(),
        tool_name: "get_current_time".into(),
        startup_grace_ms: 50,
        request_timeout_ms: 500,
    }
}

/// Bridge spawn config running `script` under `sh -c`.
pub fn stub_spawn_config(script: &str) -> SpawnConfig {
    SpawnConfig::for_time_tool(&stub_time_config(script))
}

/// Shell snippet that prints `line` followed by a newline.
pub fn emit(line: &str) -> String {
    format!("printf '%s\\n' '{line}'")
}

/// Helper script answering the full handshake successfully.
pub fn happy_script() -> String {
    format!(
        "read init; {}; read note; read call; {}; cat >/dev/null",
        emit(INIT_OK),
        emit(CALL_OK)
    )
}

/// Serve the HTTP surface on an ephemeral port.
///
/// Caller must cancel the returned token to shut the server down.
pub async fn spawn_server(
    time: TimeToolConfig,
    store: Option<StoreInspector>,
    completion: Option<Arc<dyn CompletionClient>>,
) -> (String, CancellationToken) {
    let mut config = GlobalConfig::default();
    config.time_tool = time.clone();

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral");
    let addr = listener.local_addr().expect("local addr");
    config.http_port = addr.port();

    let state = Arc::new(AppState {
        assembler: ContextAssembler::new(
            TimeToolClient::new(time),
            store,
            config.completion.model.clone(),
        ),
        config: Arc::new(config),
        completion,
    });

    let ct = CancellationToken::new();
    let server_ct = ct.clone();
    tokio::spawn(async move {
        let _ = serve_listener(listener, state, server_ct).await;
    });

    (format!("http://{addr}"), ct)
}
