//! Prompt context assembly.
//!
//! Gathers the named resources handed to the model on every chat turn
//! (store snapshot, system facts, current time) and renders them together
//! with the transcript into a single prompt string.

pub mod store;

use std::fmt::Write as _;

use serde_json::json;

use crate::models::chat::ChatMessage;
use crate::models::resource::ContextResource;
use crate::models::time::TimeInfo;
use crate::tools::TimeToolClient;

pub use store::StoreInspector;

/// Application name reported in `system_info`.
pub const APP_NAME: &str = "chat-relay";

/// Opening line of every prompt.
pub const PROMPT_PREAMBLE: &str = "You are an AI assistant with access to tool and store data. \
Use the following context to inform your responses:";

const LIVE_TIME_DESCRIPTION: &str = "Current time and timezone information from the time tool server";
const FALLBACK_TIME_DESCRIPTION: &str =
    "Current time and timezone information (fallback to system time due to tool error)";

/// Collects context resources for one chat turn.
#[derive(Debug, Clone)]
pub struct ContextAssembler {
    time: TimeToolClient,
    store: Option<StoreInspector>,
    model: String,
}

impl ContextAssembler {
    /// Build an assembler. `store` may be absent when no store is configured.
    #[must_use]
    pub fn new(time: TimeToolClient, store: Option<StoreInspector>, model: impl Into<String>) -> Self {
        Self {
            time,
            store,
            model: model.into(),
        }
    }

    /// The store inspector, if any.
    #[must_use]
    pub fn store(&self) -> Option<&StoreInspector> {
        self.store.as_ref()
    }

    /// Resources in prompt order: store, `system_info`, `time_info`.
    ///
    /// Never fails; each source degrades to its own fallback resource.
    pub async fn gather(&self) -> Vec<ContextResource> {
        let (mut resources, time) = match &self.store {
            Some(store) => tokio::join!(store.snapshot(), self.time.fetch_current_time()),
            None => (Vec::new(), self.time.fetch_current_time().await),
        };

        resources.push(system_info_resource(&self.model));
        resources.push(time_info_resource(&time));
        resources
    }
}

/// Static facts about this deployment.
#[must_use]
pub fn system_info_resource(model: &str) -> ContextResource {
    ContextResource::new(
        "system_info",
        "System information",
        json!({
            "app_name": APP_NAME,
            "version": env!("CARGO_PKG_VERSION"),
            "ai_model": model,
            "features": ["time_tool", "store_context", "chat"],
        }),
    )
}

/// Wrap a [`TimeInfo`] with the tool server status.
#[must_use]
pub fn time_info_resource(time: &TimeInfo) -> ContextResource {
    let (description, status) = if time.is_live() {
        (LIVE_TIME_DESCRIPTION, "connected")
    } else {
        (FALLBACK_TIME_DESCRIPTION, "error - using system time as fallback")
    };

    let mut data = serde_json::to_value(time).unwrap_or_else(|_| json!({}));
    if let Some(object) = data.as_object_mut() {
        object.insert("tool_server".into(), json!(status));
    }

    ContextResource::new("time_info", description, data)
}

/// Render resources as the `Context Data` block.
#[must_use]
pub fn render_context(resources: &[ContextResource]) -> String {
    resources
        .iter()
        .map(|resource| {
            let data = serde_json::to_string_pretty(&resource.data)
                .unwrap_or_else(|_| resource.data.to_string());
            format!(
                "Resource: {}\nDescription: {}\nData: {data}",
                resource.name, resource.description
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Full prompt: preamble, context block, then the transcript.
#[must_use]
pub fn build_prompt(resources: &[ContextResource], messages: &[ChatMessage]) -> String {
    let mut prompt = String::new();
    let _ = write!(
        prompt,
        "{PROMPT_PREAMBLE}\n\nContext Data:\n\n{}\n\nUser messages:\n",
        render_context(resources)
    );

    let transcript = messages
        .iter()
        .map(|msg| format!("{}: {}", msg.sender.as_str(), msg.content))
        .collect::<Vec<_>>()
        .join("\n");
    prompt.push_str(&transcript);
    prompt
}
