//! Error types for call-relay

use thiserror::Error;

/// Errors that can occur while relaying a call event
#[derive(Debug, Error)]
pub enum RelayError {
    /// Inbound event is missing required fields or is not valid JSON
    #[error("Malformed call event: {0}")]
    MalformedEvent(String),

    /// No workflow is bound to the routing number
    #[error("No call flow found for number: {number}")]
    RouteNotFound { number: String },

    /// The orchestrator no longer recognizes the wait token
    #[error("Wait token '{token}' rejected by orchestrator: {reason}")]
    StaleToken { token: String, reason: String },

    /// The rendezvous wait elapsed without a message on the session queue
    #[error("No action available on session queue '{queue}'")]
    NoActionAvailable { queue: String },

    /// Session queue does not exist
    #[error("Session queue not found: {0}")]
    QueueNotFound(String),

    /// Session queue backend error (create, delete, receive, send)
    #[error("Queue error: {0}")]
    Queue(String),

    /// Acknowledgement failure
    #[error("Failed to acknowledge message: {0}")]
    Ack(String),

    /// Orchestrator rejected or failed a request
    #[error("Orchestrator error: {0}")]
    Orchestrator(String),

    /// Backend connection failure
    #[error("Connection error: {0}")]
    Connection(String),

    /// Serialization/deserialization failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Timeout
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Outbound call placement failure
    #[error("Failed to place outbound call: {0}")]
    Placement(String),

    /// Unexpected failure inside the relay itself
    #[error("Internal error: {0}")]
    Internal(String),
}

impl RelayError {
    /// Short stable label for structured log fields
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MalformedEvent(_) => "malformed_event",
            Self::RouteNotFound { .. } => "route_not_found",
            Self::StaleToken { .. } => "stale_token",
            Self::NoActionAvailable { .. } => "no_action_available",
            Self::QueueNotFound(_) => "queue_not_found",
            Self::Queue(_) => "queue",
            Self::Ack(_) => "ack",
            Self::Orchestrator(_) => "orchestrator",
            Self::Connection(_) => "connection",
            Self::Serialization(_) => "serialization",
            Self::Config(_) => "config",
            Self::Timeout(_) => "timeout",
            Self::Placement(_) => "placement",
            Self::Internal(_) => "internal",
        }
    }
}

/// Result type alias for relay operations
pub type Result<T> = std::result::Result<T, RelayError>;
