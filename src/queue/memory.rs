//! In-memory session queue backend for testing and single-process use
//!
//! Queues live in a `HashMap` behind a tokio `Mutex`. Receives long-poll on
//! a per-queue `Notify` and never wait past the queue's receive interval.
//! Received messages are leased: until acknowledged they are hidden from
//! other receivers, and they reappear once the lease expires.

use super::{QueueConfig, QueueMessage, QueueRef, SessionQueueService};
use crate::error::{RelayError, Result};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

const URL_SCHEME: &str = "memory://";

struct StoredMessage {
    id: String,
    body: String,
    receipt: Option<String>,
    visible_at: Instant,
    receive_count: u32,
}

struct MemoryQueue {
    receive_wait: Duration,
    messages: VecDeque<StoredMessage>,
    notify: Arc<Notify>,
}

/// Lifecycle counters, for asserting create/delete discipline
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    /// Queues actually created (idempotent repeats not counted)
    pub created: usize,
    /// Queues actually deleted
    pub deleted: usize,
    /// Queues currently live
    pub live: usize,
}

/// In-memory session queue service
#[derive(Default)]
pub struct MemoryQueueService {
    queues: Mutex<HashMap<String, MemoryQueue>>,
    created: AtomicUsize,
    deleted: AtomicUsize,
}

impl MemoryQueueService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue reference the service assigns to `name`
    pub fn queue_ref(name: &str) -> QueueRef {
        QueueRef::new(format!("{}{}", URL_SCHEME, name))
    }

    pub fn stats(&self) -> QueueStats {
        let created = self.created.load(Ordering::SeqCst);
        let deleted = self.deleted.load(Ordering::SeqCst);
        QueueStats {
            created,
            deleted,
            live: created.saturating_sub(deleted),
        }
    }

    /// Whether a queue with this name currently exists
    pub async fn exists(&self, name: &str) -> bool {
        self.queues.lock().await.contains_key(name)
    }

    /// Number of messages (visible or leased) on a queue
    pub async fn depth(&self, queue: &QueueRef) -> Result<usize> {
        let queues = self.queues.lock().await;
        let q = queues
            .get(queue_name(queue)?)
            .ok_or_else(|| RelayError::QueueNotFound(queue.to_string()))?;
        Ok(q.messages.len())
    }
}

fn queue_name(queue: &QueueRef) -> Result<&str> {
    queue
        .as_str()
        .strip_prefix(URL_SCHEME)
        .ok_or_else(|| RelayError::Queue(format!("Not a memory queue reference: {}", queue)))
}

#[async_trait]
impl SessionQueueService for MemoryQueueService {
    async fn create(&self, name: &str, config: &QueueConfig) -> Result<QueueRef> {
        let mut queues = self.queues.lock().await;
        if !queues.contains_key(name) {
            queues.insert(
                name.to_string(),
                MemoryQueue {
                    receive_wait: config.receive_wait(),
                    messages: VecDeque::new(),
                    notify: Arc::new(Notify::new()),
                },
            );
            self.created.fetch_add(1, Ordering::SeqCst);
        } else {
            tracing::debug!(queue = name, "Queue already exists");
        }
        Ok(Self::queue_ref(name))
    }

    async fn delete(&self, queue: &QueueRef) -> Result<()> {
        let name = queue_name(queue)?;
        let removed = self.queues.lock().await.remove(name);
        match removed {
            Some(q) => {
                self.deleted.fetch_add(1, Ordering::SeqCst);
                // Wake any receiver so it observes the deletion
                q.notify.notify_waiters();
                Ok(())
            }
            None => Err(RelayError::QueueNotFound(queue.to_string())),
        }
    }

    async fn lookup(&self, name: &str) -> Result<Option<QueueRef>> {
        let queues = self.queues.lock().await;
        Ok(queues.contains_key(name).then(|| Self::queue_ref(name)))
    }

    async fn receive_one(&self, queue: &QueueRef, lease: Duration) -> Result<Option<QueueMessage>> {
        let name = queue_name(queue)?;
        let mut started: Option<Instant> = None;

        loop {
            let (notify, wake_at) = {
                let mut queues = self.queues.lock().await;
                let q = queues
                    .get_mut(name)
                    .ok_or_else(|| RelayError::QueueNotFound(queue.to_string()))?;

                let now = Instant::now();
                let deadline = *started.get_or_insert(now) + q.receive_wait;

                if let Some(msg) = q.messages.iter_mut().find(|m| m.visible_at <= now) {
                    let receipt = uuid::Uuid::new_v4().to_string();
                    msg.receipt = Some(receipt.clone());
                    msg.visible_at = now + lease;
                    msg.receive_count += 1;
                    return Ok(Some(QueueMessage {
                        id: msg.id.clone(),
                        receipt,
                        body: msg.body.clone(),
                        receive_count: msg.receive_count,
                    }));
                }

                if now >= deadline {
                    return Ok(None);
                }

                let next_visible = q.messages.iter().map(|m| m.visible_at).min();
                let wake_at = next_visible.map_or(deadline, |t| t.min(deadline));
                (q.notify.clone(), wake_at)
            };

            let _ = tokio::time::timeout_at(wake_at, notify.notified()).await;
        }
    }

    async fn ack(&self, queue: &QueueRef, message: &QueueMessage) -> Result<()> {
        let mut queues = self.queues.lock().await;
        let q = queues
            .get_mut(queue_name(queue)?)
            .ok_or_else(|| RelayError::QueueNotFound(queue.to_string()))?;

        let position = q
            .messages
            .iter()
            .position(|m| m.receipt.as_deref() == Some(message.receipt.as_str()))
            .ok_or_else(|| {
                RelayError::Ack(format!(
                    "Receipt for message {} is no longer valid on {}",
                    message.id, queue
                ))
            })?;
        q.messages.remove(position);
        Ok(())
    }

    async fn send(&self, queue: &QueueRef, body: &str) -> Result<()> {
        let mut queues = self.queues.lock().await;
        let q = queues
            .get_mut(queue_name(queue)?)
            .ok_or_else(|| RelayError::QueueNotFound(queue.to_string()))?;

        q.messages.push_back(StoredMessage {
            id: format!("msg-{}", uuid::Uuid::new_v4()),
            body: body.to_string(),
            receipt: None,
            visible_at: Instant::now(),
            receive_count: 0,
        });
        q.notify.notify_one();
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}
