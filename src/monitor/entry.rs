//! Per-resource monitor state and subscriber handles

use std::pin::Pin;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;

use futures::Stream;
use tokio::sync::{mpsc, RwLock};
use tokio::time::Instant;
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::directory::Subscriber;

use super::fanout::{ObserverId, ObserverSet};
use super::sample::Sample;

/// One running monitor
pub struct Monitor {
    /// Distinguishes successive monitors for the same resource
    pub(super) generation: u64,
    pub(super) resource_id: String,
    pub(super) interface: String,
    pub(super) subscriber: Subscriber,
    pub(super) cancel: CancellationToken,

    /// Interested callers; only changed under the resource's key lock
    pub(super) clients: AtomicUsize,
    pub(super) observers: RwLock<ObserverSet<Sample>>,

    pub(super) restarts: AtomicU32,
    pub(super) delivered: AtomicU64,
    pub(super) dropped: AtomicU64,
    pub(super) created_at: Instant,
}

impl Monitor {
    pub(super) fn new(
        generation: u64,
        resource_id: &str,
        interface: String,
        subscriber: Subscriber,
    ) -> Self {
        Self {
            generation,
            resource_id: resource_id.to_string(),
            interface,
            subscriber,
            cancel: CancellationToken::new(),
            clients: AtomicUsize::new(1),
            observers: RwLock::new(ObserverSet::new()),
            restarts: AtomicU32::new(0),
            delivered: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            created_at: Instant::now(),
        }
    }

    /// Hand a sample to every observer
    pub(super) async fn fan_out(&self, sample: &Sample) {
        let delivery = self.observers.read().await.broadcast(sample);

        self.delivered
            .fetch_add(delivery.delivered as u64, Ordering::Relaxed);

        if delivery.dropped > 0 {
            let total = self
                .dropped
                .fetch_add(delivery.dropped as u64, Ordering::Relaxed)
                + delivery.dropped as u64;
            tracing::debug!(
                resource = %self.resource_id,
                dropped = delivery.dropped,
                total_dropped = total,
                "Observer buffer full, sample dropped"
            );
        }

        if delivery.closed > 0 {
            self.observers.write().await.prune_closed();
        }
    }

    pub(super) async fn stats(&self) -> MonitorStats {
        MonitorStats {
            resource_id: self.resource_id.clone(),
            interface: self.interface.clone(),
            clients: self.clients.load(Ordering::SeqCst),
            observers: self.observers.read().await.len(),
            restarts: self.restarts.load(Ordering::Relaxed),
            delivered_samples: self.delivered.load(Ordering::Relaxed),
            dropped_samples: self.dropped.load(Ordering::Relaxed),
            uptime: self.created_at.elapsed(),
        }
    }
}

/// Point-in-time view of a monitor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorStats {
    pub resource_id: String,
    pub interface: String,
    pub clients: usize,
    pub observers: usize,
    pub restarts: u32,
    pub delivered_samples: u64,
    pub dropped_samples: u64,
    pub uptime: Duration,
}

/// A caller's live feed of samples for one resource
///
/// The channel closes when the monitor stops. Dropping the subscription
/// releases it as if the caller's cancellation token had fired.
pub struct Subscription {
    resource_id: String,
    observer_id: ObserverId,
    rx: mpsc::Receiver<Sample>,
    _release: DropGuard,
}

impl Subscription {
    pub(super) fn new(
        resource_id: &str,
        observer_id: ObserverId,
        rx: mpsc::Receiver<Sample>,
        release: CancellationToken,
    ) -> Self {
        Self {
            resource_id: resource_id.to_string(),
            observer_id,
            rx,
            _release: release.drop_guard(),
        }
    }

    /// Resource this subscription watches
    pub fn resource_id(&self) -> &str {
        &self.resource_id
    }

    /// Id of this subscription's observer
    pub fn observer_id(&self) -> ObserverId {
        self.observer_id
    }

    /// Next sample, or `None` once the monitor has stopped
    pub async fn recv(&mut self) -> Option<Sample> {
        self.rx.recv().await
    }

    /// Take a sample without waiting
    pub fn try_recv(&mut self) -> Result<Sample, mpsc::error::TryRecvError> {
        self.rx.try_recv()
    }
}

impl Stream for Subscription {
    type Item = Sample;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Sample>> {
        self.rx.poll_recv(cx)
    }
}
