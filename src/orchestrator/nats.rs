//! NATS request/reply orchestrator client
//!
//! Sends JSON requests to `<prefix>.start`, `<prefix>.success` and
//! `<prefix>.failure`. The orchestrator replies with `{"ok": true}` or
//! `{"ok": false, "error": "<code>", "message": "..."}`.

use super::{Orchestrator, StartOutcome, StartRequest};
use crate::error::{RelayError, Result};
use crate::nats::NatsClient;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Error code for a start request whose run name is taken
const EXECUTION_ALREADY_EXISTS: &str = "ExecutionAlreadyExists";

/// Error codes meaning the wait token is no longer resumable
const STALE_TOKEN_CODES: &[&str] = &["TaskDoesNotExist", "TaskTimedOut", "InvalidToken"];

#[derive(Debug, Deserialize)]
struct Reply {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SuccessRequest<'a> {
    task_token: &'a str,
    output: &'a serde_json::Value,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FailureRequest<'a> {
    task_token: &'a str,
    error: &'a str,
}

/// Orchestrator reached over NATS request/reply
pub struct NatsOrchestrator {
    client: NatsClient,
}

impl NatsOrchestrator {
    pub fn new(client: NatsClient) -> Self {
        Self { client }
    }

    async fn call<T: Serialize + Sync>(&self, operation: &str, body: &T) -> Result<Reply> {
        let subject = self.client.config().orchestrator_subject(operation);
        let value = self.client.request_json(&subject, body).await?;
        Ok(serde_json::from_value(value)?)
    }
}

/// Map a resume reply to a result
fn resume_result(reply: Reply, token: &str) -> Result<()> {
    if reply.ok {
        return Ok(());
    }
    let code = reply.error.unwrap_or_default();
    let message = reply.message.unwrap_or_default();
    if STALE_TOKEN_CODES.contains(&code.as_str()) {
        Err(RelayError::StaleToken {
            token: token.to_string(),
            reason: code,
        })
    } else {
        Err(RelayError::Orchestrator(format!("{}: {}", code, message)))
    }
}

#[async_trait]
impl Orchestrator for NatsOrchestrator {
    async fn start(&self, request: &StartRequest) -> Result<StartOutcome> {
        let reply = self.call("start", request).await?;
        if reply.ok {
            return Ok(StartOutcome::Started);
        }
        match reply.error.as_deref() {
            Some(EXECUTION_ALREADY_EXISTS) => Ok(StartOutcome::AlreadyRunning),
            code => Err(RelayError::Orchestrator(format!(
                "start '{}' failed: {}: {}",
                request.run_name,
                code.unwrap_or("unknown"),
                reply.message.as_deref().unwrap_or_default()
            ))),
        }
    }

    async fn resolve_success(&self, wait_token: &str, payload: &serde_json::Value) -> Result<()> {
        let reply = self
            .call(
                "success",
                &SuccessRequest {
                    task_token: wait_token,
                    output: payload,
                },
            )
            .await?;
        resume_result(reply, wait_token)
    }

    async fn resolve_failure(&self, wait_token: &str, reason: &str) -> Result<()> {
        let reply = self
            .call(
                "failure",
                &FailureRequest {
                    task_token: wait_token,
                    error: reason,
                },
            )
            .await?;
        resume_result(reply, wait_token)
    }

    fn name(&self) -> &str {
        "nats"
    }
}
