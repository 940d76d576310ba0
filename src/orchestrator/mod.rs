//! Workflow orchestrator boundary
//!
//! The orchestration is an external, long-running execution that suspends
//! at each step and registers a wait token. The relay starts it once per
//! call and resumes the suspended step with the outcome of each event.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub mod memory;
pub mod nats;

/// Initial input handed to a new orchestration run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StartInput {
    /// Session queue the run deposits its actions on
    pub queue_url: String,
    pub call_id: String,
    pub sip_media_application_id: String,
    pub transaction_id: String,
    /// The call-initiation event as received
    pub event: serde_json::Value,
}

/// Request to start an orchestration run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRequest {
    /// Run name, equal to the session name
    pub run_name: String,
    /// Workflow template the run is created from
    pub template_id: String,
    pub input: StartInput,
}

/// Result of a start request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    /// A run with the same name already exists; nothing was started
    AlreadyRunning,
}

/// Core trait for orchestrator clients
#[async_trait]
pub trait Orchestrator: Send + Sync {
    /// Start a run named `request.run_name`
    ///
    /// Starting a run whose name already exists is not an error.
    async fn start(&self, request: &StartRequest) -> Result<StartOutcome>;

    /// Resume the step waiting on `wait_token` with a success payload
    ///
    /// Fails with `StaleToken` if the token was already resolved or expired.
    async fn resolve_success(&self, wait_token: &str, payload: &serde_json::Value) -> Result<()>;

    /// Resume the step waiting on `wait_token` with a failure
    async fn resolve_failure(&self, wait_token: &str, reason: &str) -> Result<()>;

    /// Orchestrator name (e.g., "memory", "nats")
    fn name(&self) -> &str;
}
