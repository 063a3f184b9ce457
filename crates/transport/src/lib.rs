//! Session Bus, ingestion stream, and Connection Fabric:
//! the transport-facing half of the relay, independent of the translation
//! pipeline and the HTTP/WebSocket shell.

pub mod bus;
pub mod fabric;
pub mod ingestion;

pub use bus::SessionBus;
pub use fabric::ConnectionFabric;
pub use ingestion::{IngestionRecord, IngestionStream};

use thiserror::Error;

/// Transport-scoped error type
#[derive(Error, Debug, Clone, Copy)]
pub enum TransportError {
    #[error("session bus channel closed")]
    BusClosed,

    #[error("ingestion stream is at capacity for this key")]
    IngestionBackpressure,

    #[error("acknowledgement for an unknown ingestion key")]
    Ack,
}
