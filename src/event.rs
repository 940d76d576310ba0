//! Call event model
//!
//! Parses the raw inbound telephony event into a typed [`CallEvent`].
//! The wire format uses PascalCase keys (`InvocationEventType`,
//! `CallDetails.Participants[].ParticipantTag`, ...). Parsing is pure:
//! no I/O, no side effects.

use crate::error::{RelayError, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;

/// Prefix applied to the transaction id to form the session name
pub const DEFAULT_SESSION_PREFIX: &str = "call_flow_";

/// Leg tag of the originating call leg
pub const ORIGINATING_LEG_TAG: &str = "LEG-A";

/// Invocation event type
///
/// Unknown values are preserved in [`EventType::Other`] and follow the
/// success path, so new platform event types degrade gracefully.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventType {
    NewInboundCall,
    NewOutboundCall,
    ActionSuccessful,
    ActionFailed,
    ActionInterrupted,
    /// `INVALID_RESPONSE` (also accepts the platform's `INVALID_LAMBDA_RESPONSE`)
    InvalidResponse,
    Hangup,
    Other(String),
}

impl EventType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::NewInboundCall => "NEW_INBOUND_CALL",
            Self::NewOutboundCall => "NEW_OUTBOUND_CALL",
            Self::ActionSuccessful => "ACTION_SUCCESSFUL",
            Self::ActionFailed => "ACTION_FAILED",
            Self::ActionInterrupted => "ACTION_INTERRUPTED",
            Self::InvalidResponse => "INVALID_RESPONSE",
            Self::Hangup => "HANGUP",
            Self::Other(s) => s.as_str(),
        }
    }

    /// Whether this event begins a new call instance
    pub fn is_call_initiation(&self) -> bool {
        matches!(self, Self::NewInboundCall | Self::NewOutboundCall)
    }
}

impl From<&str> for EventType {
    fn from(s: &str) -> Self {
        match s {
            "NEW_INBOUND_CALL" => Self::NewInboundCall,
            "NEW_OUTBOUND_CALL" => Self::NewOutboundCall,
            "ACTION_SUCCESSFUL" => Self::ActionSuccessful,
            "ACTION_FAILED" => Self::ActionFailed,
            "ACTION_INTERRUPTED" => Self::ActionInterrupted,
            "INVALID_RESPONSE" | "INVALID_LAMBDA_RESPONSE" => Self::InvalidResponse,
            "HANGUP" => Self::Hangup,
            other => Self::Other(other.to_string()),
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connection status of a call leg
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum LegStatus {
    #[default]
    Connected,
    Disconnected,
    Other(String),
}

impl LegStatus {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Connected => "Connected",
            Self::Disconnected => "Disconnected",
            Self::Other(s) => s.as_str(),
        }
    }
}

impl From<&str> for LegStatus {
    fn from(s: &str) -> Self {
        if s.eq_ignore_ascii_case("connected") {
            Self::Connected
        } else if s.eq_ignore_ascii_case("disconnected") {
            Self::Disconnected
        } else {
            Self::Other(s.to_string())
        }
    }
}

/// One participant (call leg) of a call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    /// Platform call id of this leg
    pub leg_id: String,
    /// Leg tag, e.g. `LEG-A` for the originating leg
    pub leg_tag: String,
    pub to_number: String,
    pub from_number: String,
    /// `Inbound` / `Outbound`, when the platform reports it
    pub direction: Option<String>,
    /// Defaults to [`LegStatus::Connected`] when absent
    pub leg_status: LegStatus,
}

/// A parsed call event
///
/// Constructed fresh per invocation and never mutated afterwards.
#[derive(Debug, Clone)]
pub struct CallEvent {
    pub event_type: EventType,
    pub transaction_id: String,
    /// Media-control application handling this call
    pub workflow_engine_id: String,
    /// Non-empty, in platform order
    pub participants: Vec<Participant>,
    /// Suspended orchestration step awaiting this call's next event
    pub wait_token: Option<String>,
    /// Session queue reference, once created
    pub queue_ref: Option<String>,
    /// Deterministic queue and run name derived from `transaction_id`
    pub session_name: String,
    /// The event exactly as received
    pub raw: serde_json::Value,
}

impl CallEvent {
    /// Parse a raw event using the default session prefix
    pub fn parse(raw: serde_json::Value) -> Result<Self> {
        Self::parse_with_prefix(raw, DEFAULT_SESSION_PREFIX)
    }

    /// Parse a raw event from JSON bytes
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let raw: serde_json::Value = serde_json::from_slice(bytes)
            .map_err(|e| RelayError::MalformedEvent(format!("invalid JSON: {}", e)))?;
        Self::parse(raw)
    }

    /// Parse a raw event, deriving the session name with `prefix`
    pub fn parse_with_prefix(raw: serde_json::Value, prefix: &str) -> Result<Self> {
        let wire = WireEvent::deserialize(&raw)
            .map_err(|e| RelayError::MalformedEvent(e.to_string()))?;

        let event_type = wire
            .invocation_event_type
            .ok_or_else(|| missing("InvocationEventType"))?;
        let details = wire.call_details.ok_or_else(|| missing("CallDetails"))?;
        let transaction_id = details
            .transaction_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| missing("CallDetails.TransactionId"))?;

        let participants: Vec<Participant> = details
            .participants
            .unwrap_or_default()
            .into_iter()
            .map(Participant::from)
            .collect();
        if participants.is_empty() {
            return Err(missing("CallDetails.Participants[0]"));
        }

        let attr = |key: &str| {
            details
                .transaction_attributes
                .as_ref()
                .and_then(|attrs| attrs.get(key))
                .filter(|v| !v.is_empty())
                .cloned()
        };

        Ok(Self {
            event_type: EventType::from(event_type.as_str()),
            session_name: session_name(prefix, &transaction_id),
            wait_token: attr("WaitToken"),
            queue_ref: attr("QueueUrl"),
            transaction_id,
            workflow_engine_id: details.sip_media_application_id.unwrap_or_default(),
            participants,
            raw,
        })
    }

    /// First participant, which carries the event's call identifiers
    pub fn primary(&self) -> &Participant {
        &self.participants[0]
    }

    pub fn to_number(&self) -> &str {
        &self.primary().to_number
    }

    pub fn from_number(&self) -> &str {
        &self.primary().from_number
    }

    pub fn leg_id(&self) -> &str {
        &self.primary().leg_id
    }

    pub fn leg_tag(&self) -> &str {
        &self.primary().leg_tag
    }

    pub fn leg_status(&self) -> &LegStatus {
        &self.primary().leg_status
    }

    /// Number used for workflow routing
    ///
    /// Outbound calls are routed by the calling number, everything else
    /// by the dialed number.
    pub fn routing_number(&self) -> &str {
        match self.event_type {
            EventType::NewOutboundCall => self.from_number(),
            _ => self.to_number(),
        }
    }

    /// Whether this is the last event of the call: a hangup with only the
    /// originating leg remaining
    pub fn is_final_hangup(&self) -> bool {
        self.event_type == EventType::Hangup
            && self.participants.len() == 1
            && self.leg_tag() == ORIGINATING_LEG_TAG
    }
}

/// Derive the session (queue and orchestration run) name for a transaction
///
/// ASCII letters, digits and `-` are kept; every other byte, `_` included,
/// is written as `_xHH`. The encoding is reversible, so distinct
/// transactions never share a session.
pub fn session_name(prefix: &str, transaction_id: &str) -> String {
    let mut name = String::with_capacity(prefix.len() + transaction_id.len());
    name.push_str(prefix);
    for byte in transaction_id.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' {
            name.push(char::from(byte));
        } else {
            name.push_str(&format!("_x{:02X}", byte));
        }
    }
    name
}

fn missing(field: &str) -> RelayError {
    RelayError::MalformedEvent(format!("missing required field '{}'", field))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireEvent {
    invocation_event_type: Option<String>,
    call_details: Option<WireCallDetails>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireCallDetails {
    transaction_id: Option<String>,
    #[serde(default)]
    transaction_attributes: Option<HashMap<String, String>>,
    sip_media_application_id: Option<String>,
    participants: Option<Vec<WireParticipant>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct WireParticipant {
    call_id: String,
    participant_tag: String,
    to: String,
    from: String,
    direction: Option<String>,
    status: Option<String>,
}

impl From<WireParticipant> for Participant {
    fn from(p: WireParticipant) -> Self {
        Self {
            leg_id: p.call_id,
            leg_tag: p.participant_tag,
            to_number: p.to,
            from_number: p.from,
            direction: p.direction,
            leg_status: p
                .status
                .as_deref()
                .map(LegStatus::from)
                .unwrap_or_default(),
        }
    }
}
