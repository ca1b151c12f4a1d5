//! Error types shared across the application.

use std::fmt::{Display, Formatter};

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all domain failure modes.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing, validation, or credential lookup failure.
    Config(String),
    /// The tool helper executable could not be started.
    Spawn(String),
    /// The tool helper exited or its stdio broke before a reply arrived.
    Crash(String),
    /// No correlated response arrived within the allotted window.
    Timeout(String),
    /// The tool replied with an error or a result that could not be used.
    Protocol(String),
    /// The hosted completion API failed or returned an unusable reply.
    Upstream(String),
    /// Store failure when interacting with `SQLite`.
    Db(String),
    /// Inbound HTTP request body was malformed.
    InvalidRequest(String),
    /// File-system or I/O operation failure.
    Io(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Spawn(msg) => write!(f, "spawn: {msg}"),
            Self::Crash(msg) => write!(f, "crash: {msg}"),
            Self::Timeout(msg) => write!(f, "timeout: {msg}"),
            Self::Protocol(msg) => write!(f, "protocol: {msg}"),
            Self::Upstream(msg) => write!(f, "upstream: {msg}"),
            Self::Db(msg) => write!(f, "db: {msg}"),
            Self::InvalidRequest(msg) => write!(f, "invalid request: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        Self::Db(err.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Upstream(format!("completion request timed out: {err}"))
        } else {
            Self::Upstream(err.to_string())
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
