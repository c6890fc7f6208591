//! Viewer broadcast hub
//!
//! Holds the live viewer connections and pushes every relayed message to
//! all of them. A connection whose write fails or times out is evicted and
//! closed; the others still receive the message.

mod broadcast;
mod config;
mod connection;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use broadcast::{BroadcastHub, ConnectionId};
pub use config::HubConfig;
pub use connection::ChannelConnection;

/// Error type for viewer writes
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HubError {
    #[error("connection closed")]
    Closed,

    #[error("write timed out after {0:?}")]
    Timeout(Duration),
}

/// A network-facing viewer connection
#[async_trait]
pub trait ViewerConnection: Send + Sync {
    /// Write one text message
    async fn send_text(&self, message: &str) -> Result<(), HubError>;

    /// Close the connection; later writes fail with [`HubError::Closed`]
    async fn close(&self);

    /// Remote address, for logging
    fn peer(&self) -> &str;
}
