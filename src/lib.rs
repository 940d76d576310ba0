//! # call-relay
//!
//! Relays telephony call-lifecycle events into a long-running workflow
//! orchestration, using a per-call session queue as the rendezvous point.
//!
//! ## Overview
//!
//! Each invocation handles one event for one call leg. A call-initiation
//! event creates the call's session queue and starts an orchestration run
//! with the same name; every later event resumes the run's suspended step
//! with a success or failure outcome. The relay then blocks, boundedly, on
//! the session queue until the orchestration deposits its next action list,
//! and returns that list to the telephony platform.
//!
//! ## Quick Start
//!
//! ```rust
//! use call_relay::{
//!     MemoryOrchestrator, MemoryQueueService, QueueConfig, RelayController, RoutingTable,
//!     WorkflowRoute,
//! };
//! use std::sync::Arc;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> call_relay::Result<()> {
//! let controller = RelayController::new(
//!     RoutingTable::new(vec![WorkflowRoute::new("+15551230000", "arn:flow:main")]),
//!     QueueConfig::default(),
//!     Arc::new(MemoryQueueService::new()),
//!     Arc::new(MemoryOrchestrator::new()),
//! )?;
//!
//! // An interrupted action is informational: the orchestration is not
//! // contacted and the platform gets an empty action list.
//! let actions = controller
//!     .handle(serde_json::json!({
//!         "InvocationEventType": "ACTION_INTERRUPTED",
//!         "CallDetails": {
//!             "TransactionId": "7b3c9a10-22d4",
//!             "Participants": [{
//!                 "CallId": "c1",
//!                 "ParticipantTag": "LEG-A",
//!                 "To": "+15551230000",
//!                 "From": "+15559990000"
//!             }]
//!         }
//!     }))
//!     .await;
//! assert!(actions.actions.is_empty());
//! # Ok(())
//! # }
//! ```
//!
//! ## Backends
//!
//! - **memory** - in-process session queues and orchestrator, for tests and
//!   single-process use
//! - **nats** - JetStream work-queue streams per session, request/reply
//!   orchestrator client
//!
//! ## Architecture
//!
//! - **CallEvent** - typed view of the raw platform event
//! - **RoutingTable** - static DID → workflow template bindings
//! - **SessionQueueService** trait / **SessionQueueManager** - queue lifecycle
//! - **Orchestrator** trait / **OrchestrationBridge** - start and resume runs
//! - **RendezvousWait** - bounded wait for the next action list
//! - **RelayController** - composes the above, guarantees queue teardown

pub mod action;
pub mod bridge;
pub mod config;
pub mod error;
pub mod event;
pub mod host;
pub mod nats;
pub mod orchestrator;
pub mod outbound;
pub mod queue;
pub mod relay;
pub mod routing;
pub mod wait;

// Re-export core types
pub use action::ActionResult;
pub use bridge::{BridgeAction, BridgeOutcome, OrchestrationBridge};
pub use config::RelayConfig;
pub use error::{RelayError, Result};
pub use event::{CallEvent, EventType, LegStatus, Participant};
pub use orchestrator::{Orchestrator, StartInput, StartOutcome, StartRequest};
pub use outbound::{place_outbound_call, CallPlacer, OutboundCallRequest, OutboundCallResponse};
pub use queue::{QueueConfig, QueueMessage, QueueRef, SessionQueueManager, SessionQueueService};
pub use relay::{RelayController, RelayReport, Teardown};
pub use routing::{RoutingTable, WorkflowRoute};
pub use wait::RendezvousWait;

// Re-export backends for convenience
pub use nats::{NatsClient, NatsConfig, StorageType};
pub use orchestrator::memory::MemoryOrchestrator;
pub use orchestrator::nats::NatsOrchestrator;
pub use queue::memory::MemoryQueueService;
pub use queue::nats::NatsQueueService;
