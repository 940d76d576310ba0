//! Session queue - the per-call hand-off channel between the relay and the
//! orchestration
//!
//! All queue backends (in-memory, NATS JetStream) implement
//! `SessionQueueService`. The relay only talks to them through
//! `SessionQueueManager`, which ties a queue's lifetime to its call: it is
//! created on call initiation and deleted on the call's final hangup.

use crate::error::{RelayError, Result};
use crate::event::{CallEvent, DEFAULT_SESSION_PREFIX};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

pub mod memory;
pub mod nats;

/// Upper bound for the long-poll interval
pub const MAX_RECEIVE_WAIT_SECS: u64 = 20;

/// Address of a session queue
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueueRef(String);

impl QueueRef {
    pub fn new(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QueueRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A message received from a session queue, pending acknowledgement
#[derive(Debug, Clone)]
pub struct QueueMessage {
    /// Backend-assigned message id
    pub id: String,

    /// Handle used to acknowledge this particular delivery
    pub receipt: String,

    /// Serialized `ActionResult`
    pub body: String,

    /// Number of times this message has been delivered (1 on first receipt)
    pub receive_count: u32,
}

/// Session queue timing configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QueueConfig {
    /// Long-poll interval of a single receive
    pub receive_wait_secs: u64,

    /// Lease taken on a received message before it becomes visible again
    ///
    /// Must be longer than `receive_wait_secs`.
    pub visibility_timeout_secs: u64,

    /// Prefix of session (queue and run) names
    pub session_prefix: String,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            receive_wait_secs: 18,
            visibility_timeout_secs: 20,
            session_prefix: DEFAULT_SESSION_PREFIX.to_string(),
        }
    }
}

impl QueueConfig {
    pub fn receive_wait(&self) -> Duration {
        Duration::from_secs(self.receive_wait_secs)
    }

    pub fn visibility_timeout(&self) -> Duration {
        Duration::from_secs(self.visibility_timeout_secs)
    }

    /// Check the long-poll and lease timings are usable
    pub fn validate(&self) -> Result<()> {
        if self.receive_wait_secs == 0 || self.receive_wait_secs > MAX_RECEIVE_WAIT_SECS {
            return Err(RelayError::Config(format!(
                "receiveWaitSecs must be between 1 and {}, got {}",
                MAX_RECEIVE_WAIT_SECS, self.receive_wait_secs
            )));
        }
        if self.visibility_timeout_secs <= self.receive_wait_secs {
            return Err(RelayError::Config(format!(
                "visibilityTimeoutSecs ({}) must exceed receiveWaitSecs ({})",
                self.visibility_timeout_secs, self.receive_wait_secs
            )));
        }
        if self.session_prefix.is_empty() {
            return Err(RelayError::Config("sessionPrefix must not be empty".to_string()));
        }
        Ok(())
    }
}

/// Core trait for session queue backends
#[async_trait]
pub trait SessionQueueService: Send + Sync {
    /// Create a queue, or return the existing one with the same name
    async fn create(&self, name: &str, config: &QueueConfig) -> Result<QueueRef>;

    /// Delete a queue and any messages left on it
    async fn delete(&self, queue: &QueueRef) -> Result<()>;

    /// Find a queue by name
    async fn lookup(&self, name: &str) -> Result<Option<QueueRef>>;

    /// Long-poll for a single message
    ///
    /// Waits at most the queue's receive interval. Returns `Ok(None)` when
    /// nothing arrived. A returned message stays invisible to other
    /// receivers for `lease`; if it is not acknowledged in that time it is
    /// delivered again.
    async fn receive_one(&self, queue: &QueueRef, lease: Duration) -> Result<Option<QueueMessage>>;

    /// Acknowledge (remove) a received message
    async fn ack(&self, queue: &QueueRef, message: &QueueMessage) -> Result<()>;

    /// Enqueue a message body (orchestration side)
    async fn send(&self, queue: &QueueRef, body: &str) -> Result<()>;

    /// Backend name (e.g., "memory", "nats")
    fn name(&self) -> &str;
}

/// Creates and deletes session queues on behalf of the relay
#[derive(Clone)]
pub struct SessionQueueManager {
    service: Arc<dyn SessionQueueService>,
    config: QueueConfig,
}

impl SessionQueueManager {
    pub fn new(service: Arc<dyn SessionQueueService>, config: QueueConfig) -> Self {
        Self { service, config }
    }

    /// Create the session queue for a new call
    ///
    /// Safe to call again for the same session; the existing queue is returned.
    pub async fn create_session_queue(&self, session_name: &str) -> Result<QueueRef> {
        let queue = self.service.create(session_name, &self.config).await?;
        tracing::info!(
            session = session_name,
            queue = %queue,
            backend = self.service.name(),
            "Session queue created"
        );
        Ok(queue)
    }

    /// Delete the session queue of a finished call
    pub async fn delete_session_queue(&self, queue: &QueueRef) -> Result<()> {
        self.service.delete(queue).await?;
        tracing::info!(queue = %queue, "Session queue deleted");
        Ok(())
    }

    /// Queue reference for `event`'s call
    ///
    /// Uses the reference carried in the event's transaction attributes,
    /// falling back to a lookup by session name.
    pub async fn queue_for(&self, event: &CallEvent) -> Result<Option<QueueRef>> {
        match &event.queue_ref {
            Some(url) => Ok(Some(QueueRef::new(url.clone()))),
            None => self.service.lookup(&event.session_name).await,
        }
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    pub fn service(&self) -> &Arc<dyn SessionQueueService> {
        &self.service
    }
}
