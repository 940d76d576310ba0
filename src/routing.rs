//! DID resolver - map a dialed or calling number to its workflow template
//!
//! The routing table is loaded once at process start and never mutated.

use crate::error::{RelayError, Result};
use crate::event::CallEvent;
use serde::{Deserialize, Serialize};

/// A single `DID → workflow template` binding
///
/// Serialized with the deployment's `{"DID": ..., "ARN": ...}` keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowRoute {
    #[serde(rename = "DID", alias = "did")]
    pub did: String,

    /// Workflow template (state machine) identifier
    #[serde(rename = "ARN", alias = "workflowTemplateId")]
    pub workflow_template_id: String,
}

impl WorkflowRoute {
    pub fn new(did: impl Into<String>, workflow_template_id: impl Into<String>) -> Self {
        Self {
            did: did.into(),
            workflow_template_id: workflow_template_id.into(),
        }
    }
}

/// Ordered, read-only routing table
///
/// Lookups return the first matching entry.
#[derive(Debug, Clone, Default)]
pub struct RoutingTable {
    routes: Vec<WorkflowRoute>,
}

impl RoutingTable {
    pub fn new(routes: Vec<WorkflowRoute>) -> Self {
        Self { routes }
    }

    /// Parse the `[{"DID": ..., "ARN": ...}]` JSON form
    pub fn from_json(json: &str) -> Result<Self> {
        let routes: Vec<WorkflowRoute> = serde_json::from_str(json)
            .map_err(|e| RelayError::Config(format!("Invalid call flow DID map: {}", e)))?;
        Ok(Self::new(routes))
    }

    /// Look up the workflow bound to `number`
    pub fn lookup(&self, number: &str) -> Result<&str> {
        self.routes
            .iter()
            .find(|route| route.did == number)
            .map(|route| route.workflow_template_id.as_str())
            .ok_or_else(|| RelayError::RouteNotFound {
                number: number.to_string(),
            })
    }

    /// Resolve the workflow that owns `event`'s call
    pub fn resolve(&self, event: &CallEvent) -> Result<&str> {
        self.lookup(event.routing_number())
    }

    pub fn routes(&self) -> &[WorkflowRoute] {
        &self.routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
