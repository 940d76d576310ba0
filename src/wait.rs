//! Rendezvous wait - block until the orchestration deposits its next action
//!
//! One bounded long-poll receive on the session queue. The received message
//! is acknowledged before it is decoded so it reaches this invocation only.

use crate::action::ActionResult;
use crate::error::{RelayError, Result};
use crate::queue::{QueueConfig, QueueRef, SessionQueueService};
use std::sync::Arc;
use std::time::Duration;

/// Local slack on top of the backend's own long-poll interval
const WAIT_GRACE: Duration = Duration::from_secs(2);

/// Waits for the next action list on a session queue
#[derive(Clone)]
pub struct RendezvousWait {
    service: Arc<dyn SessionQueueService>,
    lease: Duration,
    max_wait: Duration,
}

impl RendezvousWait {
    pub fn new(service: Arc<dyn SessionQueueService>, config: &QueueConfig) -> Self {
        Self {
            service,
            lease: config.visibility_timeout(),
            max_wait: config.receive_wait() + WAIT_GRACE,
        }
    }

    /// Receive, acknowledge and decode exactly one message
    ///
    /// Fails with `NoActionAvailable` when nothing arrives in time.
    pub async fn next_action(&self, queue: &QueueRef) -> Result<ActionResult> {
        tracing::debug!(queue = %queue, "Reading message...");

        let received =
            tokio::time::timeout(self.max_wait, self.service.receive_one(queue, self.lease))
                .await
                .map_err(|_| RelayError::NoActionAvailable {
                    queue: queue.to_string(),
                })??;
        let message = received.ok_or_else(|| RelayError::NoActionAvailable {
            queue: queue.to_string(),
        })?;

        if message.receive_count > 1 {
            tracing::warn!(
                queue = %queue,
                message_id = %message.id,
                receive_count = message.receive_count,
                "Message redelivered after an unacknowledged receive"
            );
        }

        // An unacked message reappears once its lease lapses
        if let Err(e) = self.service.ack(queue, &message).await {
            tracing::warn!(
                queue = %queue,
                message_id = %message.id,
                error = %e,
                "Failed to acknowledge message"
            );
        }

        let result: ActionResult = serde_json::from_str(&message.body)?;
        tracing::info!(
            queue = %queue,
            actions = result.actions.len(),
            "Message processed, returning actions"
        );
        Ok(result)
    }
}
