//! Relay configuration
//!
//! Loaded once at process start and passed by value into the controller.
//! Sources: a JSON file, a JSON string, or the process environment
//! (`CallFlowsDIDMap` holds the route table as a JSON array).

use crate::error::{RelayError, Result};
use crate::nats::NatsConfig;
use crate::queue::QueueConfig;
use crate::routing::{RoutingTable, WorkflowRoute};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Environment variable holding the `[{"DID": ..., "ARN": ...}]` route table
pub const ROUTES_ENV: &str = "CallFlowsDIDMap";

/// Top-level relay configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayConfig {
    /// Ordered DID → workflow template bindings
    #[serde(default)]
    pub routes: Vec<WorkflowRoute>,

    #[serde(default)]
    pub queue: QueueConfig,

    #[serde(default)]
    pub nats: NatsConfig,
}

impl RelayConfig {
    /// Parse configuration from a JSON string
    pub fn from_json(content: &str) -> Result<Self> {
        serde_json::from_str(content)
            .map_err(|e| RelayError::Config(format!("Failed to parse relay config: {}", e)))
    }

    /// Load configuration from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            RelayError::Config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        let config = Self::from_json(&content)?;
        tracing::debug!(
            path = %path.display(),
            routes = config.routes.len(),
            "Configuration loaded"
        );
        Ok(config)
    }

    /// Defaults plus the route table from the environment
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Replace the route table with `CallFlowsDIDMap`, when set
    pub fn apply_env(&mut self) -> Result<()> {
        if let Ok(map) = std::env::var(ROUTES_ENV) {
            self.routes = RoutingTable::from_json(&map)?.routes().to_vec();
        }
        Ok(())
    }

    /// Reject configurations the relay cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.routes.is_empty() {
            return Err(RelayError::Config(
                "No call flow routes configured".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for route in &self.routes {
            if route.did.is_empty() || route.workflow_template_id.is_empty() {
                return Err(RelayError::Config(format!(
                    "Route entries need both a DID and a workflow: {:?}",
                    route
                )));
            }
            if !seen.insert(route.did.as_str()) {
                return Err(RelayError::Config(format!(
                    "Duplicate route for DID {}",
                    route.did
                )));
            }
        }

        self.queue.validate()
    }

    /// Build the read-only routing table
    pub fn routing_table(&self) -> RoutingTable {
        RoutingTable::new(self.routes.clone())
    }
}
