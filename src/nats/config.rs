//! NATS connection and subject configuration

use serde::{Deserialize, Serialize};

/// JetStream storage backend for session streams
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StorageType {
    File,
    #[default]
    Memory,
}

/// NATS configuration shared by the queue, orchestrator and host backends
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NatsConfig {
    /// Server URL
    pub url: String,

    /// Optional auth token
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    pub connect_timeout_secs: u64,

    /// Timeout for request/reply calls (orchestrator, call placement)
    pub request_timeout_secs: u64,

    /// Subject prefix of session queue streams (`<prefix>.<session>`)
    pub queue_subject_prefix: String,

    /// Subject prefix of orchestrator requests (`<prefix>.start`, ...)
    pub orchestrator_subject_prefix: String,

    /// Subject the `serve` host listens on for call events
    pub events_subject: String,

    /// Subject of outbound call placement requests
    pub place_call_subject: String,

    pub storage: StorageType,

    /// Upper bound on a session stream's message age (0 = unlimited)
    pub session_max_age_secs: u64,
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self {
            url: "nats://127.0.0.1:4222".to_string(),
            token: None,
            connect_timeout_secs: 5,
            request_timeout_secs: 5,
            queue_subject_prefix: "callrelay.session".to_string(),
            orchestrator_subject_prefix: "callrelay.orchestrator".to_string(),
            events_subject: "callrelay.events".to_string(),
            place_call_subject: "callrelay.telephony.place_call".to_string(),
            storage: StorageType::Memory,
            session_max_age_secs: 3600,
        }
    }
}

impl NatsConfig {
    /// Subject carrying messages for one session queue
    pub fn session_subject(&self, session: &str) -> String {
        format!("{}.{}", self.queue_subject_prefix, session)
    }

    /// Subject of an orchestrator operation
    pub fn orchestrator_subject(&self, operation: &str) -> String {
        format!("{}.{}", self.orchestrator_subject_prefix, operation)
    }
}
