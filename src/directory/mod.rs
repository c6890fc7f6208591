//! Subscriber directory
//!
//! The persistent store lives outside this crate; the engine only needs to
//! look subscribers up and record session changes. [`MemoryDirectory`] is a
//! complete in-process implementation.

mod memory;
mod subscriber;

use async_trait::async_trait;
use thiserror::Error;

pub use memory::MemoryDirectory;
pub use subscriber::{ServiceType, Subscriber, SubscriberStatus};

/// Error type for directory operations
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DirectoryError {
    #[error("subscriber not found: {0}")]
    NotFound(String),

    #[error("directory backend error: {0}")]
    Backend(String),
}

/// Session details recorded on connect/disconnect
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRecord {
    pub status: SubscriberStatus,
    pub assigned_ip: Option<String>,
    pub mac_address: Option<String>,
}

/// Subscriber lookup and session bookkeeping
#[async_trait]
pub trait Directory: Send + Sync {
    /// Look up a subscriber by id
    async fn get_subscriber(&self, id: &str) -> Result<Subscriber, DirectoryError>;

    /// Look up a subscriber by PPPoE username
    async fn find_by_username(&self, pppoe_username: &str) -> Result<Subscriber, DirectoryError>;

    /// Record a session status change
    async fn record_session(&self, id: &str, record: SessionRecord) -> Result<(), DirectoryError>;
}
