//! Named context blocks rendered into the prompt.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One block of context data: a store listing, system facts, the time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContextResource {
    /// Stable machine name, e.g. `time_info`.
    pub name: String,
    /// One-line description shown to the model.
    pub description: String,
    /// Arbitrary JSON payload.
    pub data: Value,
}

impl ContextResource {
    /// Build a resource.
    #[must_use]
    pub fn new(name: impl Into<String>, description: impl Into<String>, data: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            data,
        }
    }
}
