//! Hosted completion API client.
//!
//! The [`CompletionClient`] trait is the seam between the chat handler and
//! the model provider; [`AnthropicClient`] is the production implementation
//! over `reqwest`.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::CompletionConfig;
use crate::{AppError, Result};

/// Answer used when the reply carries no text block.
pub const NO_ANSWER: &str = "I'm sorry, I couldn't process that request.";

/// Path appended to `api_base`.
const MESSAGES_PATH: &str = "/v1/messages";

/// Turns a fully rendered prompt into assistant text.
pub trait CompletionClient: Send + Sync {
    /// Send `prompt` as a single user turn and return the answer text.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Upstream` if the provider is unreachable or
    /// answers with a non-success status.
    fn complete<'a>(
        &'a self,
        prompt: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>>;
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: [TurnBody<'a>; 1],
}

#[derive(Debug, Serialize)]
struct TurnBody<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

/// Anthropic Messages API client.
#[derive(Debug, Clone)]
pub struct AnthropicClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    api_version: String,
    model: String,
    max_tokens: u32,
}

impl AnthropicClient {
    /// Build a client from config. Returns `None` when no API key was loaded.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the HTTP client cannot be built.
    pub fn from_config(config: &CompletionConfig) -> Result<Option<Self>> {
        let Some(api_key) = config.api_key.clone() else {
            return Ok(None);
        };

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|err| AppError::Config(format!("failed to build http client: {err}")))?;

        Ok(Some(Self {
            http,
            endpoint: format!("{}{MESSAGES_PATH}", config.api_base.trim_end_matches('/')),
            api_key,
            api_version: config.api_version.clone(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
        }))
    }

    /// Full URL requests are posted to.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn send(&self, prompt: &str) -> Result<String> {
        let body = MessagesRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            messages: [TurnBody {
                role: "user",
                content: prompt,
            }],
        };

        debug!(model = %self.model, prompt_len = prompt.len(), "sending completion request");

        let response = self
            .http
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", &self.api_version)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            warn!(%status, "completion api returned an error");
            return Err(AppError::Upstream(format!(
                "completion api returned {status}: {text}"
            )));
        }

        let reply: MessagesResponse = response.json().await?;
        Ok(answer_text(&reply))
    }
}

impl CompletionClient for AnthropicClient {
    fn complete<'a>(
        &'a self,
        prompt: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>> {
        Box::pin(self.send(prompt))
    }
}

fn answer_text(reply: &MessagesResponse) -> String {
    match reply.content.first() {
        Some(ContentBlock {
            kind,
            text: Some(text),
        }) if kind == "text" => text.clone(),
        _ => NO_ANSWER.to_owned(),
    }
}
