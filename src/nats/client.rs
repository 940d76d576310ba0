//! NATS client - connect, per-session JetStream streams, request/reply

use super::config::{NatsConfig, StorageType};
use crate::error::{RelayError, Result};
use async_nats::jetstream;
use async_nats::jetstream::context::GetStreamErrorKind;
use bytes::Bytes;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// NATS client
///
/// Holds the core connection (request/reply) and the JetStream context
/// (session streams). Cheap to clone.
#[derive(Clone)]
pub struct NatsClient {
    client: async_nats::Client,
    jetstream: jetstream::Context,
    config: Arc<NatsConfig>,
}

impl NatsClient {
    /// Connect to NATS
    pub async fn connect(config: NatsConfig) -> Result<Self> {
        let client = build_connect_options(&config)
            .connect(&config.url)
            .await
            .map_err(|e| RelayError::Connection(format!("{}: {}", config.url, e)))?;

        tracing::info!(url = %config.url, "Connected to NATS");

        let jetstream = jetstream::new(client.clone());
        Ok(Self {
            client,
            jetstream,
            config: Arc::new(config),
        })
    }

    /// Get or create the work-queue stream backing a session
    pub async fn ensure_session_stream(&self, session: &str) -> Result<jetstream::stream::Stream> {
        let storage = match self.config.storage {
            StorageType::File => jetstream::stream::StorageType::File,
            StorageType::Memory => jetstream::stream::StorageType::Memory,
        };

        let stream_config = jetstream::stream::Config {
            name: session.to_string(),
            subjects: vec![self.config.session_subject(session)],
            storage,
            retention: jetstream::stream::RetentionPolicy::WorkQueue,
            max_age: Duration::from_secs(self.config.session_max_age_secs),
            ..Default::default()
        };

        let stream = self
            .jetstream
            .get_or_create_stream(stream_config)
            .await
            .map_err(|e| {
                RelayError::Queue(format!("Failed to create/get stream '{}': {}", session, e))
            })?;

        tracing::debug!(stream = session, "Session stream ready");
        Ok(stream)
    }

    /// Get an existing session stream, `None` if it does not exist
    pub async fn session_stream(&self, session: &str) -> Result<Option<jetstream::stream::Stream>> {
        match self.jetstream.get_stream(session).await {
            Ok(stream) => Ok(Some(stream)),
            Err(e) => match e.kind() {
                GetStreamErrorKind::JetStream(err)
                    if err.error_code() == jetstream::ErrorCode::STREAM_NOT_FOUND =>
                {
                    Ok(None)
                }
                _ => Err(RelayError::Queue(format!(
                    "Failed to get stream '{}': {}",
                    session, e
                ))),
            },
        }
    }

    /// Delete a session stream and its consumers
    pub async fn delete_session_stream(&self, session: &str) -> Result<()> {
        self.jetstream
            .delete_stream(session)
            .await
            .map_err(|e| RelayError::Queue(format!("Failed to delete stream '{}': {}", session, e)))?;
        Ok(())
    }

    /// Publish to a session stream and wait for the JetStream ack
    pub async fn publish_to_session(&self, session: &str, body: Bytes) -> Result<u64> {
        let subject = self.config.session_subject(session);
        let ack = self
            .jetstream
            .publish(subject.clone(), body)
            .await
            .map_err(|e| RelayError::Queue(format!("Failed to publish to '{}': {}", subject, e)))?
            .await
            .map_err(|e| RelayError::Queue(format!("Publish ack failed on '{}': {}", subject, e)))?;
        Ok(ack.sequence)
    }

    /// JSON request/reply bounded by the configured request timeout
    pub async fn request_json<T: Serialize + ?Sized>(
        &self,
        subject: &str,
        body: &T,
    ) -> Result<serde_json::Value> {
        let payload = Bytes::from(serde_json::to_vec(body)?);
        let timeout = Duration::from_secs(self.config.request_timeout_secs);

        let reply = tokio::time::timeout(timeout, self.client.request(subject.to_string(), payload))
            .await
            .map_err(|_| {
                RelayError::Timeout(format!(
                    "No reply on '{}' after {}s",
                    subject, self.config.request_timeout_secs
                ))
            })?
            .map_err(|e| RelayError::Connection(format!("Request on '{}' failed: {}", subject, e)))?;

        Ok(serde_json::from_slice(&reply.payload)?)
    }

    /// Get the underlying NATS client
    pub fn nats_client(&self) -> &async_nats::Client {
        &self.client
    }

    /// Get the JetStream context
    pub fn jetstream_context(&self) -> &jetstream::Context {
        &self.jetstream
    }

    pub fn config(&self) -> &NatsConfig {
        &self.config
    }
}

/// Build NATS connect options from config
fn build_connect_options(config: &NatsConfig) -> async_nats::ConnectOptions {
    let mut opts = async_nats::ConnectOptions::new()
        .connection_timeout(Duration::from_secs(config.connect_timeout_secs))
        .request_timeout(Some(Duration::from_secs(config.request_timeout_secs)));

    if let Some(ref token) = config.token {
        opts = opts.token(token.clone());
    }

    opts
}
