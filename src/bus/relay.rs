//! Consumer-group relay
//!
//! Reads entries from one stream as a member of a consumer group and hands
//! each payload to a [`RelaySink`]. Entries are acknowledged only after the
//! sink accepts them, so a relay that dies mid-batch leaves the rest pending
//! and re-delivers them when it restarts under the same consumer name.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::{BusEntry, ReadFrom, RelayConfig, StreamBus};

/// A sink refused a message
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("sink rejected message: {0}")]
pub struct SinkError(pub String);

/// Destination for relayed payloads
#[async_trait]
pub trait RelaySink: Send + Sync {
    async fn deliver(&self, payload: &str) -> Result<(), SinkError>;
}

#[async_trait]
impl RelaySink for mpsc::Sender<String> {
    async fn deliver(&self, payload: &str) -> Result<(), SinkError> {
        self.send(payload.to_string())
            .await
            .map_err(|_| SinkError("receiver closed".to_string()))
    }
}

/// Running totals for one relay
#[derive(Debug, Default)]
pub struct RelayCounters {
    pub delivered: AtomicU64,
    pub invalid: AtomicU64,
    pub failed: AtomicU64,
}

/// One consumer-group member relaying a stream to a sink
pub struct BusRelay {
    bus: Arc<dyn StreamBus>,
    sink: Arc<dyn RelaySink>,
    stream: String,
    config: RelayConfig,
    counters: Arc<RelayCounters>,
}

impl BusRelay {
    /// Create a relay from `stream` into `sink`
    pub fn new(
        bus: Arc<dyn StreamBus>,
        sink: Arc<dyn RelaySink>,
        stream: impl Into<String>,
        config: RelayConfig,
    ) -> Self {
        Self {
            bus,
            sink,
            stream: stream.into(),
            config,
            counters: Arc::new(RelayCounters::default()),
        }
    }

    /// Get the shared delivery counters
    pub fn counters(&self) -> Arc<RelayCounters> {
        self.counters.clone()
    }

    /// Run the relay on its own task
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(cancel))
    }

    /// Relay entries until `cancel` fires
    pub async fn run(self, cancel: CancellationToken) {
        if !self.join_group(&cancel).await {
            return;
        }

        tracing::info!(
            stream = %self.stream,
            group = %self.config.group,
            consumer = %self.config.consumer,
            "Relay started"
        );

        self.drain_pending(&cancel).await;
        let mut last_claim = Instant::now();
        self.claim_idle(&cancel).await;

        loop {
            if let Some(idle) = self.config.claim_idle_after {
                if last_claim.elapsed() >= idle {
                    self.claim_idle(&cancel).await;
                    last_claim = Instant::now();
                }
            }

            let read = tokio::select! {
                _ = cancel.cancelled() => break,
                read = self.bus.read_group(
                    &self.stream,
                    &self.config.group,
                    &self.config.consumer,
                    ReadFrom::New,
                    self.config.batch_size,
                    self.config.block,
                ) => read,
            };

            match read {
                Ok(entries) => {
                    for entry in entries {
                        self.handle(entry).await;
                    }
                }
                Err(e) => {
                    tracing::warn!(stream = %self.stream, error = %e, "Failed to read from bus");
                    if !self.backoff(&cancel).await {
                        break;
                    }
                }
            }
        }

        tracing::info!(stream = %self.stream, consumer = %self.config.consumer, "Relay stopped");
    }

    /// Create the group, retrying until it succeeds or `cancel` fires
    async fn join_group(&self, cancel: &CancellationToken) -> bool {
        loop {
            match self.bus.ensure_group(&self.stream, &self.config.group).await {
                Ok(()) => return true,
                Err(e) => {
                    tracing::warn!(
                        stream = %self.stream,
                        group = %self.config.group,
                        error = %e,
                        "Failed to create consumer group"
                    );
                    if !self.backoff(cancel).await {
                        return false;
                    }
                }
            }
        }
    }

    /// Re-deliver entries this consumer read but never acknowledged
    async fn drain_pending(&self, cancel: &CancellationToken) {
        loop {
            if cancel.is_cancelled() {
                return;
            }

            let entries = match self
                .bus
                .read_group(
                    &self.stream,
                    &self.config.group,
                    &self.config.consumer,
                    ReadFrom::Pending,
                    self.config.batch_size,
                    std::time::Duration::ZERO,
                )
                .await
            {
                Ok(entries) => entries,
                Err(e) => {
                    tracing::warn!(stream = %self.stream, error = %e, "Failed to read pending entries");
                    return;
                }
            };

            if entries.is_empty() {
                return;
            }

            tracing::info!(
                stream = %self.stream,
                entries = entries.len(),
                "Re-delivering pending entries"
            );

            // A failed delivery stays pending; stop rather than loop on it
            let mut all_acked = true;
            for entry in entries {
                all_acked &= self.handle(entry).await;
            }
            if !all_acked {
                return;
            }
        }
    }

    async fn claim_idle(&self, cancel: &CancellationToken) {
        let Some(min_idle) = self.config.claim_idle_after else {
            return;
        };
        if cancel.is_cancelled() {
            return;
        }

        match self
            .bus
            .claim_idle(
                &self.stream,
                &self.config.group,
                &self.config.consumer,
                min_idle,
                self.config.batch_size,
            )
            .await
        {
            Ok(entries) => {
                if !entries.is_empty() {
                    tracing::info!(
                        stream = %self.stream,
                        entries = entries.len(),
                        "Claimed idle entries"
                    );
                }
                for entry in entries {
                    self.handle(entry).await;
                }
            }
            Err(e) => {
                tracing::warn!(stream = %self.stream, error = %e, "Failed to claim idle entries");
            }
        }
    }

    /// Deliver one entry, returning whether it was acknowledged
    async fn handle(&self, entry: BusEntry) -> bool {
        if serde_json::from_str::<serde::de::IgnoredAny>(&entry.payload).is_err() {
            tracing::warn!(
                stream = %self.stream,
                id = %entry.id,
                "Dropping entry with invalid JSON payload"
            );
            self.counters.invalid.fetch_add(1, Ordering::Relaxed);
            return self.ack(&entry).await;
        }

        match self.sink.deliver(&entry.payload).await {
            Ok(()) => {
                self.counters.delivered.fetch_add(1, Ordering::Relaxed);
                self.ack(&entry).await
            }
            Err(e) => {
                tracing::warn!(
                    stream = %self.stream,
                    id = %entry.id,
                    error = %e,
                    "Sink rejected entry, leaving it pending"
                );
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    async fn ack(&self, entry: &BusEntry) -> bool {
        match self
            .bus
            .ack(&self.stream, &self.config.group, entry.id)
            .await
        {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(stream = %self.stream, id = %entry.id, error = %e, "Failed to ack entry");
                false
            }
        }
    }

    /// Sleep for the error backoff; false if cancelled first
    async fn backoff(&self, cancel: &CancellationToken) -> bool {
        tokio::select! {
            _ = cancel.cancelled() => false,
            _ = tokio::time::sleep(self.config.error_backoff) => true,
        }
    }
}
