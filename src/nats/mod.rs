//! NATS transport shared by the JetStream session queue, the orchestrator
//! client and the outbound call placer

mod client;
mod config;

pub use client::NatsClient;
pub use config::{NatsConfig, StorageType};
