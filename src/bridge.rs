//! Orchestration bridge - start or resume the orchestration for one event
//!
//! | Event | Transition |
//! |-------|------------|
//! | `NEW_INBOUND_CALL`, `NEW_OUTBOUND_CALL` | create session queue, start run |
//! | `ACTION_INTERRUPTED`, `ACTION_FAILED` on a disconnected leg | nothing (informational) |
//! | `INVALID_RESPONSE`, `HANGUP`, `ACTION_FAILED` | resume step with failure |
//! | anything else | resume step with success, payload = raw event |

use crate::error::{RelayError, Result};
use crate::event::{CallEvent, EventType, LegStatus};
use crate::orchestrator::{Orchestrator, StartInput, StartOutcome, StartRequest};
use crate::queue::{QueueRef, SessionQueueManager};
use std::sync::Arc;

/// Bridge transition selected for an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeAction {
    Start,
    ResumeSuccess,
    ResumeFailure,
    /// Neither start nor resume
    Informational,
}

impl BridgeAction {
    pub fn classify(event: &CallEvent) -> Self {
        match &event.event_type {
            EventType::NewInboundCall | EventType::NewOutboundCall => Self::Start,
            EventType::ActionInterrupted => Self::Informational,
            EventType::ActionFailed if *event.leg_status() == LegStatus::Disconnected => {
                Self::Informational
            }
            EventType::InvalidResponse | EventType::Hangup | EventType::ActionFailed => {
                Self::ResumeFailure
            }
            _ => Self::ResumeSuccess,
        }
    }

    /// Whether the orchestration owes this invocation a next action
    pub fn awaits_next_action(self) -> bool {
        matches!(self, Self::Start | Self::ResumeSuccess)
    }
}

/// What the relay does after the bridge ran
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeOutcome {
    /// Block on this session queue for the next action list
    AwaitNextAction(QueueRef),
    /// Reply with an empty action list
    NoAction,
}

/// Starts and resumes orchestration runs
#[derive(Clone)]
pub struct OrchestrationBridge {
    orchestrator: Arc<dyn Orchestrator>,
    queues: SessionQueueManager,
}

impl OrchestrationBridge {
    pub fn new(orchestrator: Arc<dyn Orchestrator>, queues: SessionQueueManager) -> Self {
        Self {
            orchestrator,
            queues,
        }
    }

    /// Drive the transition for `event`, whose call is owned by `template_id`
    pub async fn drive(&self, event: &CallEvent, template_id: &str) -> Result<BridgeOutcome> {
        match BridgeAction::classify(event) {
            BridgeAction::Start => self.start(event, template_id).await,
            BridgeAction::ResumeSuccess => {
                let queue = self.queues.queue_for(event).await?.ok_or_else(|| {
                    RelayError::QueueNotFound(event.session_name.clone())
                })?;
                let token = wait_token(event)?;
                self.orchestrator.resolve_success(token, &event.raw).await?;
                tracing::debug!(
                    transaction_id = %event.transaction_id,
                    event_type = %event.event_type,
                    "Step resumed with success"
                );
                Ok(BridgeOutcome::AwaitNextAction(queue))
            }
            BridgeAction::ResumeFailure => {
                let token = wait_token(event)?;
                self.orchestrator
                    .resolve_failure(token, event.event_type.as_str())
                    .await?;
                tracing::info!(
                    transaction_id = %event.transaction_id,
                    reason = %event.event_type,
                    "Step resumed with failure"
                );
                Ok(BridgeOutcome::NoAction)
            }
            BridgeAction::Informational => {
                tracing::debug!(
                    transaction_id = %event.transaction_id,
                    event_type = %event.event_type,
                    leg_status = event.leg_status().as_str(),
                    "Informational event, orchestration not contacted"
                );
                Ok(BridgeOutcome::NoAction)
            }
        }
    }

    /// Create the session queue, then start the run that feeds it
    async fn start(&self, event: &CallEvent, template_id: &str) -> Result<BridgeOutcome> {
        let queue = self
            .queues
            .create_session_queue(&event.session_name)
            .await?;

        let request = StartRequest {
            run_name: event.session_name.clone(),
            template_id: template_id.to_string(),
            input: StartInput {
                queue_url: queue.as_str().to_string(),
                call_id: event.leg_id().to_string(),
                sip_media_application_id: event.workflow_engine_id.clone(),
                transaction_id: event.transaction_id.clone(),
                event: event.raw.clone(),
            },
        };

        match self.orchestrator.start(&request).await? {
            StartOutcome::Started => tracing::info!(
                run = %request.run_name,
                template = template_id,
                orchestrator = self.orchestrator.name(),
                "Orchestration run started"
            ),
            StartOutcome::AlreadyRunning => tracing::warn!(
                run = %request.run_name,
                "Orchestration run already exists, treating start as duplicate delivery"
            ),
        }

        Ok(BridgeOutcome::AwaitNextAction(queue))
    }
}

fn wait_token(event: &CallEvent) -> Result<&str> {
    event.wait_token.as_deref().ok_or_else(|| {
        RelayError::MalformedEvent(format!(
            "{} event for {} carries no WaitToken",
            event.event_type, event.transaction_id
        ))
    })
}
