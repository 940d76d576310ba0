//! NATS JetStream session queue backend
//!
//! Each session gets its own work-queue stream (stream name = session
//! name) read through a durable pull consumer whose `ack_wait` is the
//! lease. The queue reference is the stream name.

use super::{QueueConfig, QueueMessage, QueueRef, SessionQueueService};
use crate::error::{RelayError, Result};
use crate::nats::NatsClient;
use async_nats::jetstream;
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;

/// Durable consumer name used by the relay on every session stream
const CONSUMER_NAME: &str = "relay";

/// Slack given to the server-side fetch expiry before giving up locally
const RECEIVE_GRACE: Duration = Duration::from_secs(2);

/// JetStream-backed session queue service
///
/// The long-poll interval comes from the service's `QueueConfig`, since
/// JetStream streams do not carry a receive wait of their own.
pub struct NatsQueueService {
    client: NatsClient,
    config: QueueConfig,

    /// Received, not yet acknowledged messages (receipt → (stream, message))
    pending: Mutex<HashMap<String, (String, jetstream::Message)>>,
}

impl NatsQueueService {
    pub fn new(client: NatsClient, config: QueueConfig) -> Self {
        Self {
            client,
            config,
            pending: Mutex::new(HashMap::new()),
        }
    }

    async fn consumer(
        &self,
        queue: &QueueRef,
        lease: Duration,
    ) -> Result<jetstream::consumer::PullConsumer> {
        let stream = self
            .client
            .session_stream(queue.as_str())
            .await?
            .ok_or_else(|| RelayError::QueueNotFound(queue.to_string()))?;

        stream
            .get_or_create_consumer(
                CONSUMER_NAME,
                jetstream::consumer::pull::Config {
                    durable_name: Some(CONSUMER_NAME.to_string()),
                    ack_policy: jetstream::consumer::AckPolicy::Explicit,
                    ack_wait: lease,
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| {
                RelayError::Queue(format!(
                    "Failed to create consumer on '{}': {}",
                    queue, e
                ))
            })
    }
}

#[async_trait]
impl SessionQueueService for NatsQueueService {
    async fn create(&self, name: &str, _config: &QueueConfig) -> Result<QueueRef> {
        self.client.ensure_session_stream(name).await?;
        Ok(QueueRef::new(name))
    }

    async fn delete(&self, queue: &QueueRef) -> Result<()> {
        if self.client.session_stream(queue.as_str()).await?.is_none() {
            return Err(RelayError::QueueNotFound(queue.to_string()));
        }
        self.client.delete_session_stream(queue.as_str()).await?;
        self.pending
            .lock()
            .await
            .retain(|_, (stream, _)| stream != queue.as_str());
        Ok(())
    }

    async fn lookup(&self, name: &str) -> Result<Option<QueueRef>> {
        Ok(self
            .client
            .session_stream(name)
            .await?
            .map(|_| QueueRef::new(name)))
    }

    async fn receive_one(&self, queue: &QueueRef, lease: Duration) -> Result<Option<QueueMessage>> {
        let consumer = self.consumer(queue, lease).await?;
        let wait = self.config.receive_wait();

        let batch = consumer
            .fetch()
            .max_messages(1)
            .expires(wait)
            .messages()
            .await
            .map_err(|e| RelayError::Queue(format!("Failed to fetch from '{}': {}", queue, e)))?;
        let mut batch = std::pin::pin!(batch);

        let message = match tokio::time::timeout(wait + RECEIVE_GRACE, batch.next()).await {
            Err(_) | Ok(None) => return Ok(None),
            Ok(Some(Err(e))) => {
                return Err(RelayError::Queue(format!(
                    "Failed to receive from '{}': {}",
                    queue, e
                )))
            }
            Ok(Some(Ok(message))) => message,
        };

        let (id, receive_count) = match message.info() {
            Ok(info) => (
                format!("{}-{}", info.stream, info.stream_sequence),
                info.delivered.max(1) as u32,
            ),
            Err(_) => (format!("{}-unknown", queue), 1),
        };
        let body = String::from_utf8(message.payload.to_vec())
            .map_err(|e| RelayError::Queue(format!("Non UTF-8 message on '{}': {}", queue, e)))?;
        let receipt = uuid::Uuid::new_v4().to_string();

        self.pending
            .lock()
            .await
            .insert(receipt.clone(), (queue.as_str().to_string(), message));

        Ok(Some(QueueMessage {
            id,
            receipt,
            body,
            receive_count,
        }))
    }

    async fn ack(&self, queue: &QueueRef, message: &QueueMessage) -> Result<()> {
        let (_, pending) = self
            .pending
            .lock()
            .await
            .remove(&message.receipt)
            .ok_or_else(|| {
                RelayError::Ack(format!(
                    "Unknown receipt for message {} on {}",
                    message.id, queue
                ))
            })?;

        pending
            .ack()
            .await
            .map_err(|e| RelayError::Ack(format!("{} on {}: {}", message.id, queue, e)))
    }

    async fn send(&self, queue: &QueueRef, body: &str) -> Result<()> {
        self.client
            .publish_to_session(queue.as_str(), Bytes::from(body.to_string()))
            .await?;
        Ok(())
    }

    fn name(&self) -> &str {
        "nats"
    }
}
