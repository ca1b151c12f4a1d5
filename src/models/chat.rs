//! Chat request/response bodies exchanged with the browser UI.

use serde::{Deserialize, Serialize};

use crate::{AppError, Result};

/// Author of a chat message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Sender {
    /// Message typed by the person using the UI.
    User,
    /// Earlier reply produced by the assistant.
    Bot,
}

impl Sender {
    /// Label used when rendering the transcript into a prompt.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Bot => "bot",
        }
    }
}

/// One message of the conversation as sent by the UI.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    /// Client-side message id.
    #[serde(default)]
    pub id: Option<String>,
    /// Message text.
    pub content: String,
    /// Author.
    pub sender: Sender,
    /// Client-side timestamp, passed through untouched.
    #[serde(default)]
    pub timestamp: Option<String>,
}

impl ChatMessage {
    /// Convenience constructor for a user message.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            id: None,
            content: content.into(),
            sender: Sender::User,
            timestamp: None,
        }
    }

    /// Convenience constructor for an assistant message.
    #[must_use]
    pub fn bot(content: impl Into<String>) -> Self {
        Self {
            id: None,
            content: content.into(),
            sender: Sender::Bot,
            timestamp: None,
        }
    }
}

/// Body of `POST /api/chat`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatRequest {
    /// Full conversation so far, oldest first.
    pub messages: Vec<ChatMessage>,
}

impl ChatRequest {
    /// Reject requests that carry nothing to answer.
    ///
    /// # Errors
    ///
    /// Returns `AppError::InvalidRequest` if `messages` is empty.
    pub fn validate(&self) -> Result<()> {
        if self.messages.is_empty() {
            return Err(AppError::InvalidRequest(
                "messages must not be empty".into(),
            ));
        }
        Ok(())
    }
}

/// Successful reply body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatReply {
    /// Assistant text.
    pub content: String,
}

/// Failure reply body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorBody {
    /// Short, stable error label.
    pub error: String,
    /// Human-readable cause.
    pub details: String,
}
