//! Current-time answer produced by the time tool sequencer.

use serde::{Deserialize, Serialize};

/// Where a [`TimeInfo`] came from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TimeSource {
    /// Reported by the helper process.
    Live,
    /// Computed from the host clock because the helper failed.
    Fallback,
}

/// Current time, zone, and provenance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimeInfo {
    /// ISO 8601 / RFC 3339 timestamp.
    pub current_time: String,
    /// IANA zone name, or `UTC±hh:mm` when the host zone has no name.
    pub timezone: String,
    /// Daylight-saving flag; unknown on the fallback path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_dst: Option<bool>,
    /// Provenance.
    pub source: TimeSource,
    /// Human-readable local time (fallback only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_time: Option<String>,
    /// Offset from UTC in hours (fallback only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utc_offset: Option<f64>,
}

impl TimeInfo {
    /// Whether this answer came from the helper.
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.source == TimeSource::Live
    }
}
