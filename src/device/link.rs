//! Resilient device link
//!
//! Wraps the current [`Connection`] and replaces it when a command fails
//! with a transient error. Each command is retried at most once, on the
//! replacement connection.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio_util::sync::CancellationToken;

use crate::protocol::{Attributes, Command, Reply};

use super::config::DeviceConfig;
use super::connection::Connection;
use super::error::DeviceError;
use super::Device;

/// Shared, self-healing link to one device
pub struct DeviceLink {
    config: DeviceConfig,
    current: RwLock<Arc<Connection>>,
    reconnect_lock: Mutex<()>,
}

impl DeviceLink {
    /// Connect and log in
    ///
    /// Failure here is not retried.
    pub async fn connect(config: DeviceConfig) -> Result<Self, DeviceError> {
        let connection = Connection::connect(&config, 1).await?;

        Ok(Self {
            config,
            current: RwLock::new(connection),
            reconnect_lock: Mutex::new(()),
        })
    }

    /// Link configuration
    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    /// Generation of the current connection, starting at 1
    pub async fn generation(&self) -> u64 {
        self.current.read().await.generation()
    }

    /// Close the current connection
    ///
    /// Pending commands fail and open streams end. A later command will
    /// reconnect.
    pub async fn close(&self) {
        self.current().await.close().await;
    }

    async fn current(&self) -> Arc<Connection> {
        Arc::clone(&*self.current.read().await)
    }

    /// Replace the connection with generation `failed`
    ///
    /// Does nothing when another caller already replaced it.
    async fn reconnect(&self, failed: u64) -> Result<(), DeviceError> {
        let _guard = self.reconnect_lock.lock().await;

        let current = self.current().await;
        if current.generation() != failed {
            tracing::debug!(
                failed = failed,
                current = current.generation(),
                "Connection already replaced"
            );
            return Ok(());
        }

        let next = failed + 1;
        tracing::info!(addr = %self.config.addr(), generation = next, "Reconnecting to device");

        let connection = Connection::connect(&self.config, next).await?;
        let old = std::mem::replace(&mut *self.current.write().await, connection);
        old.close().await;

        Ok(())
    }

    async fn with_retry<T, F, Fut>(&self, command: &Command, op: F) -> Result<T, DeviceError>
    where
        F: Fn(Arc<Connection>) -> Fut,
        Fut: Future<Output = Result<T, DeviceError>>,
    {
        let connection = self.current().await;
        let generation = connection.generation();

        match op(connection).await {
            Err(e) if e.is_transient() => {
                tracing::warn!(
                    command = %command,
                    generation = generation,
                    error = %e,
                    "Transient device error, reconnecting"
                );

                if let Err(reconnect_err) = self.reconnect(generation).await {
                    tracing::warn!(error = %reconnect_err, "Reconnect failed");
                    return Err(e);
                }

                op(self.current().await).await
            }
            other => other,
        }
    }
}

#[async_trait]
impl Device for DeviceLink {
    async fn execute(&self, command: Command) -> Result<Reply, DeviceError> {
        self.with_retry(&command, |connection| {
            let command = command.clone();
            async move { connection.execute(&command).await }
        })
        .await
    }

    async fn open_stream(
        &self,
        command: Command,
        cancel: CancellationToken,
    ) -> Result<mpsc::Receiver<Attributes>, DeviceError> {
        self.with_retry(&command, |connection| {
            let command = command.clone();
            let cancel = cancel.clone();
            async move { connection.open_stream(&command, cancel).await }
        })
        .await
    }
}
