//! Connection set and broadcast

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use tokio::sync::{mpsc, RwLock};

use crate::bus::{RelaySink, SinkError};

use super::{ChannelConnection, HubConfig, ViewerConnection};

pub type ConnectionId = u64;

/// Fans relayed messages out to every live viewer connection
pub struct BroadcastHub {
    connections: RwLock<HashMap<ConnectionId, Arc<dyn ViewerConnection>>>,
    next_id: AtomicU64,
    config: HubConfig,
}

impl BroadcastHub {
    /// Create a hub with no connections
    pub fn new(config: HubConfig) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            config,
        }
    }

    /// Get the hub configuration
    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    /// Register a connection
    pub async fn join(&self, connection: Arc<dyn ViewerConnection>) -> ConnectionId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let peer = connection.peer().to_string();

        let count = {
            let mut connections = self.connections.write().await;
            connections.insert(id, connection);
            connections.len()
        };

        tracing::info!(connection = id, peer = %peer, connections = count, "Viewer connected");
        id
    }

    /// Register a channel-backed connection using the hub's buffer and timeout
    pub async fn channel_connection(
        &self,
        peer: impl Into<String>,
    ) -> (ConnectionId, mpsc::Receiver<String>) {
        let (connection, rx) = ChannelConnection::new(
            peer,
            self.config.connection_buffer,
            self.config.write_timeout,
        );
        let id = self.join(Arc::new(connection)).await;
        (id, rx)
    }

    /// Remove and close a connection; false if it was not registered
    pub async fn leave(&self, id: ConnectionId) -> bool {
        let removed = self.connections.write().await.remove(&id);

        match removed {
            Some(connection) => {
                connection.close().await;
                tracing::info!(connection = id, peer = %connection.peer(), "Viewer disconnected");
                true
            }
            None => false,
        }
    }

    /// Write `message` to every connection, returning how many accepted it
    ///
    /// Writes run concurrently under the read lock. Connections that failed
    /// are evicted and closed afterwards.
    pub async fn broadcast(&self, message: &str) -> usize {
        let results: Vec<(ConnectionId, bool)> = {
            let connections = self.connections.read().await;
            let writes = connections.iter().map(|(id, connection)| async move {
                let result = connection.send_text(message).await;
                if let Err(e) = &result {
                    tracing::warn!(
                        connection = *id,
                        peer = %connection.peer(),
                        error = %e,
                        "Viewer write failed"
                    );
                }
                (*id, result.is_ok())
            });
            join_all(writes).await
        };

        let delivered = results.iter().filter(|(_, ok)| *ok).count();
        let failed: Vec<ConnectionId> = results
            .into_iter()
            .filter(|(_, ok)| !ok)
            .map(|(id, _)| id)
            .collect();

        if !failed.is_empty() {
            let evicted: Vec<_> = {
                let mut connections = self.connections.write().await;
                failed
                    .iter()
                    .filter_map(|id| connections.remove(id))
                    .collect()
            };
            for connection in &evicted {
                connection.close().await;
            }
            tracing::info!(evicted = evicted.len(), "Evicted failed viewers");
        }

        tracing::trace!(delivered, failed = failed.len(), "Broadcast");
        delivered
    }

    /// Number of joined connections
    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Close and remove every connection
    pub async fn close_all(&self) {
        let drained: Vec<_> = self.connections.write().await.drain().map(|(_, c)| c).collect();
        for connection in drained {
            connection.close().await;
        }
    }
}

#[async_trait]
impl RelaySink for BroadcastHub {
    async fn deliver(&self, payload: &str) -> Result<(), SinkError> {
        self.broadcast(payload).await;
        Ok(())
    }
}
