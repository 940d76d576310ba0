//! Relay controller - one call event in, one action list out
//!
//! Per invocation:
//! 1. parse the event (nothing to clean up if this fails)
//! 2. resolve the workflow route (no side effects if this fails)
//! 3. start or resume the orchestration
//! 4. wait for the next action list when the orchestration owes one
//! 5. tear down the session queue when this is the call's final hangup
//!
//! Step 5 runs whenever step 1 succeeded, regardless of how steps 2–4
//! ended (including a panic). Errors never escape `handle`: the platform
//! always gets a well-formed `ActionResult`, empty on failure.

use crate::action::ActionResult;
use crate::bridge::{BridgeOutcome, OrchestrationBridge};
use crate::config::RelayConfig;
use crate::error::{RelayError, Result};
use crate::event::{CallEvent, EventType};
use crate::orchestrator::Orchestrator;
use crate::queue::{QueueConfig, QueueRef, SessionQueueManager, SessionQueueService};
use crate::routing::RoutingTable;
use crate::wait::RendezvousWait;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

/// What happened to the session queue at the end of an invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Teardown {
    /// Not the call's final event
    NotApplicable,
    Deleted(QueueRef),
    /// Final event, but no queue exists for the call
    NoQueue,
    Failed(String),
}

/// Full account of one invocation
#[derive(Debug)]
pub struct RelayReport {
    /// `None` when the event could not be parsed
    pub event_type: Option<EventType>,
    pub transaction_id: Option<String>,
    pub outcome: Result<ActionResult>,
    pub teardown: Teardown,
}

impl RelayReport {
    /// Response for the telephony platform
    pub fn into_response(self) -> ActionResult {
        self.outcome.unwrap_or_else(|_| ActionResult::no_action())
    }
}

/// Composes the event model, router, queue manager, bridge and wait
#[derive(Clone)]
pub struct RelayController {
    routes: Arc<RoutingTable>,
    queues: SessionQueueManager,
    bridge: OrchestrationBridge,
    wait: RendezvousWait,
}

impl RelayController {
    /// Build a controller
    ///
    /// Fails with `Config` when the queue timing is unusable (lease not
    /// longer than the long-poll interval, or a poll interval out of range).
    pub fn new(
        routes: RoutingTable,
        queue_config: QueueConfig,
        queue_service: Arc<dyn SessionQueueService>,
        orchestrator: Arc<dyn Orchestrator>,
    ) -> Result<Self> {
        queue_config.validate()?;

        let wait = RendezvousWait::new(queue_service.clone(), &queue_config);
        let queues = SessionQueueManager::new(queue_service, queue_config);
        Ok(Self {
            routes: Arc::new(routes),
            bridge: OrchestrationBridge::new(orchestrator, queues.clone()),
            queues,
            wait,
        })
    }

    pub fn from_config(
        config: &RelayConfig,
        queue_service: Arc<dyn SessionQueueService>,
        orchestrator: Arc<dyn Orchestrator>,
    ) -> Result<Self> {
        Self::new(
            config.routing_table(),
            config.queue.clone(),
            queue_service,
            orchestrator,
        )
    }

    /// Handle one raw event and return the platform response
    pub async fn handle(&self, raw: serde_json::Value) -> ActionResult {
        self.handle_with_report(raw).await.into_response()
    }

    /// Handle one raw event and report every stage's outcome
    pub async fn handle_with_report(&self, raw: serde_json::Value) -> RelayReport {
        tracing::debug!(event = %raw, "Called with event");

        let event = match CallEvent::parse_with_prefix(raw, &self.queues.config().session_prefix) {
            Ok(event) => event,
            Err(e) => {
                tracing::error!(error = %e, kind = e.kind(), "Rejecting call event");
                return RelayReport {
                    event_type: None,
                    transaction_id: None,
                    outcome: Err(e),
                    teardown: Teardown::NotApplicable,
                };
            }
        };

        let outcome = match AssertUnwindSafe(self.relay(&event)).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(_) => Err(RelayError::Internal(format!(
                "relay panicked handling {} for {}",
                event.event_type, event.transaction_id
            ))),
        };

        if let Err(e) = &outcome {
            tracing::error!(
                transaction_id = %event.transaction_id,
                event_type = %event.event_type,
                kind = e.kind(),
                error = %e,
                "Call event failed, returning no actions"
            );
        }

        let teardown = self.teardown(&event).await;

        RelayReport {
            event_type: Some(event.event_type),
            transaction_id: Some(event.transaction_id),
            outcome,
            teardown,
        }
    }

    async fn relay(&self, event: &CallEvent) -> Result<ActionResult> {
        let template_id = self.routes.resolve(event)?;

        tracing::info!(
            transaction_id = %event.transaction_id,
            event_type = %event.event_type,
            session = %event.session_name,
            leg_tag = event.leg_tag(),
            template = template_id,
            "Relaying call event"
        );

        match self.bridge.drive(event, template_id).await? {
            BridgeOutcome::AwaitNextAction(queue) => self.wait.next_action(&queue).await,
            BridgeOutcome::NoAction => {
                tracing::info!(transaction_id = %event.transaction_id, "Returning no actions");
                Ok(ActionResult::no_action())
            }
        }
    }

    /// Delete the session queue if `event` ends the call
    async fn teardown(&self, event: &CallEvent) -> Teardown {
        if !event.is_final_hangup() {
            return Teardown::NotApplicable;
        }

        let queue = match self.queues.queue_for(event).await {
            Ok(Some(queue)) => queue,
            Ok(None) => {
                tracing::info!(session = %event.session_name, "No session queue to delete");
                return Teardown::NoQueue;
            }
            Err(e) => {
                tracing::error!(session = %event.session_name, error = %e, "Queue lookup failed");
                return Teardown::Failed(e.to_string());
            }
        };

        match self.queues.delete_session_queue(&queue).await {
            Ok(()) => Teardown::Deleted(queue),
            Err(RelayError::QueueNotFound(_)) => {
                tracing::info!(queue = %queue, "Session queue already gone");
                Teardown::NoQueue
            }
            Err(e) => {
                tracing::error!(queue = %queue, error = %e, "Failed to delete session queue");
                Teardown::Failed(e.to_string())
            }
        }
    }

    pub fn routes(&self) -> &RoutingTable {
        &self.routes
    }
}
