//! Channel-backed viewer connection

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};

use super::{HubError, ViewerConnection};

/// Viewer connection that writes into an mpsc channel
///
/// The receiving half is owned by whatever drives the real socket (a
/// WebSocket writer task, a test). A full channel counts as a slow viewer:
/// the write waits up to `write_timeout` and then fails.
pub struct ChannelConnection {
    peer: String,
    tx: Mutex<Option<mpsc::Sender<String>>>,
    write_timeout: Duration,
}

impl ChannelConnection {
    /// Create a connection and the receiver that drains it
    pub fn new(
        peer: impl Into<String>,
        buffer: usize,
        write_timeout: Duration,
    ) -> (Self, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let connection = Self {
            peer: peer.into(),
            tx: Mutex::new(Some(tx)),
            write_timeout,
        };
        (connection, rx)
    }
}

#[async_trait]
impl ViewerConnection for ChannelConnection {
    async fn send_text(&self, message: &str) -> Result<(), HubError> {
        let tx = self.tx.lock().await.clone().ok_or(HubError::Closed)?;

        match tokio::time::timeout(self.write_timeout, tx.send(message.to_string())).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(HubError::Closed),
            Err(_) => Err(HubError::Timeout(self.write_timeout)),
        }
    }

    async fn close(&self) {
        self.tx.lock().await.take();
    }

    fn peer(&self) -> &str {
        &self.peer
    }
}
