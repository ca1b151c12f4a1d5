//! Time tool sequencer.
//!
//! Drives the fixed handshake against a time helper and turns the result
//! into a [`TimeInfo`]:
//!
//! ```text
//! Spawned ──initialize──▶ Initializing ──response──▶ Initialized
//!    ──initialized + tools/call──▶ Calling ──response──▶ Completed
//! (any step) ──timeout / crash / error──▶ Failed
//! ```
//!
//! The helper is terminated on entry to `Completed` or `Failed`.
//! [`TimeToolClient::fetch_current_time`] never fails: on `Failed` it
//! answers from the host clock and tags the result
//! [`TimeSource::Fallback`].

use chrono::{DateTime, Local};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::bridge::{Envelope, SpawnConfig, ToolBridge};
use crate::config::TimeToolConfig;
use crate::models::time::{TimeInfo, TimeSource};
use crate::{AppError, Result};

/// Protocol revision announced in `initialize`.
pub const PROTOCOL_VERSION: &str = "2024-06-11";

/// Client name announced in `initialize`.
pub const CLIENT_NAME: &str = "chat-relay";

/// Notification sent once the `initialize` response is observed.
pub const INITIALIZED_METHOD: &str = "initialized";

/// Progress of one handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    /// Helper running, nothing sent.
    Spawned,
    /// `initialize` sent, awaiting its response.
    Initializing,
    /// `initialize` answered.
    Initialized,
    /// `tools/call` sent, awaiting its response.
    Calling,
    /// Tool result extracted.
    Completed,
    /// Any step failed.
    Failed,
}

impl HandshakeState {
    /// Whether no further transition is possible.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

fn advance(state: &mut HandshakeState, next: HandshakeState) {
    debug!(tool = "time", from = ?*state, to = ?next, "time tool: handshake transition");
    *state = next;
}

/// Client for the time helper. Cheap to clone; each call spawns its own
/// helper process.
#[derive(Debug, Clone)]
pub struct TimeToolClient {
    config: TimeToolConfig,
}

impl TimeToolClient {
    /// Create a client from the time tool section of the config.
    #[must_use]
    pub fn new(config: TimeToolConfig) -> Self {
        Self { config }
    }

    /// Configuration this client launches helpers with.
    #[must_use]
    pub fn config(&self) -> &TimeToolConfig {
        &self.config
    }

    /// Current time from the helper, or from the host clock if the helper
    /// cannot be reached. Never fails.
    pub async fn fetch_current_time(&self) -> TimeInfo {
        match self.fetch_live().await {
            Ok(info) => info,
            Err(err) => {
                warn!(tool = "time", %err, "time tool unavailable, using host clock");
                fallback_time_info()
            }
        }
    }

    /// Current time from the helper only.
    ///
    /// # Errors
    ///
    /// - `AppError::Spawn`: helper could not be started.
    /// - `AppError::Crash`: helper exited or its stdin broke.
    /// - `AppError::Timeout`: a step exceeded `request_timeout_ms`.
    /// - `AppError::Protocol`: error response or unusable result.
    pub async fn fetch_live(&self) -> Result<TimeInfo> {
        let mut bridge = ToolBridge::spawn(&SpawnConfig::for_time_tool(&self.config)).await?;
        let mut state = HandshakeState::Spawned;

        let outcome = run_handshake(&mut bridge, &self.config, &mut state).await;

        match &outcome {
            Ok(_) => advance(&mut state, HandshakeState::Completed),
            Err(_) => advance(&mut state, HandshakeState::Failed),
        }
        bridge.terminate().await;

        if let Ok(info) = &outcome {
            info!(
                tool = "time",
                current_time = %info.current_time,
                timezone = %info.timezone,
                "time tool answered"
            );
        }
        outcome
    }
}

async fn run_handshake(
    bridge: &mut ToolBridge,
    config: &TimeToolConfig,
    state: &mut HandshakeState,
) -> Result<TimeInfo> {
    let timeout = config.request_timeout();

    let init_id = bridge.next_request_id();
    bridge
        .send(&Envelope::request(init_id, "initialize", initialize_params()))
        .await?;
    advance(state, HandshakeState::Initializing);

    bridge
        .await_response(init_id, timeout)
        .await?
        .into_result()?;
    advance(state, HandshakeState::Initialized);

    bridge.notify(INITIALIZED_METHOD, json!({})).await?;

    let call_id = bridge.next_request_id();
    let params = json!({
        "name": config.tool_name,
        "arguments": { "timezone": config.timezone }
    });
    bridge
        .send(&Envelope::request(call_id, "tools/call", params))
        .await?;
    advance(state, HandshakeState::Calling);

    let result = bridge
        .await_response(call_id, timeout)
        .await?
        .into_result()?;

    parse_time_result(&result, &config.timezone)
}

/// Params of the `initialize` request.
#[must_use]
pub fn initialize_params() -> Value {
    json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": {},
        "clientInfo": {
            "name": CLIENT_NAME,
            "version": env!("CARGO_PKG_VERSION")
        }
    })
}

/// Extract a live [`TimeInfo`] from a `tools/call` result.
///
/// `datetime`, `timezone`, and `is_dst` are read from the result itself,
/// else from `structuredContent`, else from the first `content` text item
/// that parses as a JSON object. `default_zone` fills a missing `timezone`.
///
/// # Errors
///
/// Returns `AppError::Protocol` if the result is flagged `isError` or no
/// `datetime` string can be found.
pub fn parse_time_result(result: &Value, default_zone: &str) -> Result<TimeInfo> {
    if result.get("isError").and_then(Value::as_bool) == Some(true) {
        let text = first_text(result).unwrap_or_else(|| "no detail".to_owned());
        return Err(AppError::Protocol(format!("time tool reported an error: {text}")));
    }

    let payload = time_payload(result).ok_or_else(|| {
        AppError::Protocol("time tool result carries no `datetime`".into())
    })?;

    let current_time = payload
        .get("datetime")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_owned();
    let timezone = payload
        .get("timezone")
        .and_then(Value::as_str)
        .unwrap_or(default_zone)
        .to_owned();
    let is_dst = payload.get("is_dst").and_then(Value::as_bool);

    Ok(TimeInfo {
        current_time,
        timezone,
        is_dst,
        source: TimeSource::Live,
        local_time: None,
        utc_offset: None,
    })
}

fn has_datetime(value: &Value) -> bool {
    value.get("datetime").and_then(Value::as_str).is_some()
}

fn time_payload(result: &Value) -> Option<Value> {
    if has_datetime(result) {
        return Some(result.clone());
    }

    if let Some(structured) = result.get("structuredContent").filter(|v| has_datetime(v)) {
        return Some(structured.clone());
    }

    result
        .get("content")
        .and_then(Value::as_array)?
        .iter()
        .filter_map(|item| item.get("text").and_then(Value::as_str))
        .filter_map(|text| serde_json::from_str::<Value>(text).ok())
        .find(has_datetime)
}

fn first_text(result: &Value) -> Option<String> {
    result
        .get("content")
        .and_then(Value::as_array)?
        .iter()
        .find_map(|item| item.get("text").and_then(Value::as_str))
        .map(str::to_owned)
}

/// Host-clock substitute used when the helper fails.
#[must_use]
pub fn fallback_time_info() -> TimeInfo {
    fallback_time_info_at(Local::now())
}

/// Host-clock substitute for a given instant.
#[must_use]
pub fn fallback_time_info_at(now: DateTime<Local>) -> TimeInfo {
    let offset_seconds = now.offset().local_minus_utc();

    TimeInfo {
        current_time: now.to_rfc3339(),
        timezone: host_zone_name(&now),
        is_dst: None,
        source: TimeSource::Fallback,
        local_time: Some(now.format("%Y-%m-%d %H:%M:%S").to_string()),
        utc_offset: Some(f64::from(offset_seconds) / 3600.0),
    }
}

/// Host zone name: `TZ` when set, else the system's IANA zone, else the
/// numeric offset as `UTC±hh:mm`.
fn host_zone_name(now: &DateTime<Local>) -> String {
    if let Some(tz) = std::env::var("TZ")
        .ok()
        .map(|tz| tz.trim_start_matches(':').trim().to_owned())
        .filter(|tz| !tz.is_empty())
    {
        return tz;
    }

    match iana_time_zone::get_timezone() {
        Ok(zone) => zone,
        Err(err) => {
            debug!(%err, "host zone lookup failed, using numeric offset");
            format!("UTC{}", now.format("%:z"))
        }
    }
}
