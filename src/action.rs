//! Action list returned to the telephony platform

use serde::{Deserialize, Serialize};

/// Schema version of the action contract
pub const SCHEMA_VERSION: &str = "1.0";

/// Ordered list of actions for the platform to execute next
///
/// Actions are opaque to the relay. An empty list means "take no action".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ActionResult {
    #[serde(default = "default_schema_version")]
    pub schema_version: String,

    #[serde(default)]
    pub actions: Vec<serde_json::Value>,
}

fn default_schema_version() -> String {
    SCHEMA_VERSION.to_string()
}

impl ActionResult {
    /// Build a result carrying `actions`
    pub fn new(actions: Vec<serde_json::Value>) -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            actions,
        }
    }

    /// The empty "no instruction" result
    pub fn no_action() -> Self {
        Self::new(Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

impl Default for ActionResult {
    fn default() -> Self {
        Self::no_action()
    }
}
