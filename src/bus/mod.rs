//! Durable message bus
//!
//! Samples and session events are appended to named streams and read back
//! through consumer groups with at-least-once delivery:
//!
//! ```text
//! SamplePublisher ──► publish ──► [mikrotik:traffic:customers] ──► read_group ──► BusRelay ──► sink
//!                                        (max_len, trimmed)         (group)         │
//!                                                                     ▲             └─► ack
//!                                                   pending until ack ┘
//! ```
//!
//! [`MemoryBus`] implements the consumer-group model in process. With the
//! `redis` feature, [`RedisBus`] maps the same operations to Redis Streams.

pub mod config;
pub mod events;
pub mod id;
pub mod memory;
pub mod publisher;
#[cfg(feature = "redis")]
pub mod redis;
pub mod relay;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use config::{BusConfig, RelayConfig};
pub use events::{EventOutcome, SessionEvent, SessionEvents, SessionStatus};
pub use id::StreamId;
pub use memory::MemoryBus;
pub use publisher::SamplePublisher;
#[cfg(feature = "redis")]
pub use self::redis::RedisBus;
pub use relay::{BusRelay, RelayCounters, RelaySink, SinkError};

/// Error type for bus operations
#[derive(Debug, Error)]
pub enum BusError {
    #[error("bus backend error: {0}")]
    Backend(String),

    #[error("consumer group {group} does not exist on stream {stream}")]
    UnknownGroup { stream: String, group: String },

    #[error("invalid stream id: {0}")]
    InvalidId(String),

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// One entry read from a stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusEntry {
    pub id: StreamId,
    pub payload: String,
}

/// Where a group read starts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadFrom {
    /// Entries never delivered to the group
    New,
    /// Entries already delivered to this consumer but not acknowledged
    Pending,
}

/// Append-only streams with consumer groups
#[async_trait]
pub trait StreamBus: Send + Sync {
    /// Append a payload, trimming the stream to its retention cap
    async fn publish(&self, stream: &str, payload: &str) -> Result<StreamId, BusError>;

    /// Create a consumer group starting at the beginning of the stream
    ///
    /// Creates the stream if needed. An existing group is left untouched.
    async fn ensure_group(&self, stream: &str, group: &str) -> Result<(), BusError>;

    /// Read up to `count` entries for `consumer`
    ///
    /// [`ReadFrom::New`] waits up to `block` for entries (zero returns at
    /// once); delivered entries become pending for this consumer.
    /// [`ReadFrom::Pending`] re-reads this consumer's pending entries and
    /// never blocks.
    async fn read_group(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        from: ReadFrom,
        count: usize,
        block: Duration,
    ) -> Result<Vec<BusEntry>, BusError>;

    /// Acknowledge an entry; false if it was not pending
    async fn ack(&self, stream: &str, group: &str, id: StreamId) -> Result<bool, BusError>;

    /// Take over entries pending longer than `min_idle` on any consumer
    async fn claim_idle(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        min_idle: Duration,
        count: usize,
    ) -> Result<Vec<BusEntry>, BusError>;

    /// Number of entries currently retained
    async fn stream_len(&self, stream: &str) -> Result<usize, BusError>;

    /// Number of entries delivered to the group but not acknowledged
    async fn pending_count(&self, stream: &str, group: &str) -> Result<usize, BusError>;
}
