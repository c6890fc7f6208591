//! Service assembly
//!
//! Wires the device link, monitor registry, bus and broadcast hub together:
//!
//! ```text
//! DeviceLink ──► MonitorRegistry ──► Subscription (local observers)
//!                      │
//!                      └─► SamplePublisher ──► bus ──► BusRelay ──► BroadcastHub ──► viewers
//! ```

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::bus::{BusRelay, MemoryBus, RelayCounters, SamplePublisher, SessionEvents, StreamBus};
use crate::config::Config;
use crate::device::{Device, DeviceLink};
use crate::diagnostic::{probe_subscriber, ProbeEvent, ProbeOptions};
use crate::directory::Directory;
use crate::error::Result;
use crate::hub::BroadcastHub;
use crate::monitor::MonitorRegistry;

/// A running telemetry service
pub struct TelemetryService {
    config: Config,
    device: Arc<dyn Device>,
    link: Option<Arc<DeviceLink>>,
    directory: Arc<dyn Directory>,
    bus: Arc<dyn StreamBus>,
    registry: Arc<MonitorRegistry>,
    hub: Arc<BroadcastHub>,
    events: SessionEvents,
    relay_counters: Arc<RelayCounters>,
    relay_task: Mutex<Option<JoinHandle<()>>>,
    cancel: CancellationToken,
}

impl TelemetryService {
    /// Connect to the device and bus, then start the relay
    ///
    /// Failing to reach the device here is fatal; later link failures are
    /// recovered by reconnecting.
    pub async fn start(config: Config, directory: Arc<dyn Directory>) -> Result<Self> {
        let link = Arc::new(DeviceLink::connect(config.device.clone()).await?);
        let (bus, relay_bus) = open_buses(&config).await?;

        tracing::info!(
            device = %config.device.addr(),
            traffic_stream = %config.bus.traffic_stream,
            "Telemetry service started"
        );

        let mut service = Self::build(config, link.clone(), directory, bus, relay_bus);
        service.link = Some(link);
        Ok(service)
    }

    /// Assemble a service from existing parts, sharing one bus
    ///
    /// Spawns the relay task, so it must be called inside a Tokio runtime.
    pub fn with_parts(
        config: Config,
        device: Arc<dyn Device>,
        directory: Arc<dyn Directory>,
        bus: Arc<dyn StreamBus>,
    ) -> Self {
        Self::build(config, device, directory, bus.clone(), bus)
    }

    fn build(
        config: Config,
        device: Arc<dyn Device>,
        directory: Arc<dyn Directory>,
        bus: Arc<dyn StreamBus>,
        relay_bus: Arc<dyn StreamBus>,
    ) -> Self {
        let cancel = CancellationToken::new();

        let publisher = SamplePublisher::new(bus.clone(), config.bus.traffic_stream.clone());
        let registry = Arc::new(
            MonitorRegistry::new(device.clone(), directory.clone(), config.registry.clone())
                .with_publisher(publisher),
        );

        let hub = Arc::new(BroadcastHub::new(config.hub.clone()));
        let relay = BusRelay::new(
            relay_bus,
            hub.clone(),
            config.bus.traffic_stream.clone(),
            config.relay.clone(),
        );
        let relay_counters = relay.counters();
        let relay_task = relay.spawn(cancel.child_token());

        let events = SessionEvents::new(
            directory.clone(),
            bus.clone(),
            config.bus.events_stream.clone(),
        );

        Self {
            config,
            device,
            link: None,
            directory,
            bus,
            registry,
            hub,
            events,
            relay_counters,
            relay_task: Mutex::new(Some(relay_task)),
            cancel,
        }
    }

    /// Get the service configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get the monitor registry
    pub fn registry(&self) -> &Arc<MonitorRegistry> {
        &self.registry
    }

    /// Get the viewer broadcast hub
    pub fn hub(&self) -> &Arc<BroadcastHub> {
        &self.hub
    }

    /// Get the publishing bus
    pub fn bus(&self) -> &Arc<dyn StreamBus> {
        &self.bus
    }

    /// Get the shared device
    pub fn device(&self) -> &Arc<dyn Device> {
        &self.device
    }

    /// Session connect/disconnect reporting
    pub fn events(&self) -> &SessionEvents {
        &self.events
    }

    /// Get the relay delivery counters
    pub fn relay_counters(&self) -> &Arc<RelayCounters> {
        &self.relay_counters
    }

    /// Ping a subscriber's address until `cancel` fires
    pub async fn probe(
        &self,
        cancel: CancellationToken,
        subscriber_id: &str,
        options: ProbeOptions,
    ) -> Result<mpsc::Receiver<ProbeEvent>> {
        let cancel = linked_token(&self.cancel, cancel);
        Ok(probe_subscriber(
            self.directory.as_ref(),
            self.device.clone(),
            cancel,
            subscriber_id,
            options,
        )
        .await?)
    }

    /// Stop every monitor, the relay and the viewer connections
    pub async fn shutdown(&self) {
        tracing::info!("Shutting down telemetry service");

        self.cancel.cancel();
        self.registry.shutdown().await;

        if let Some(task) = self.relay_task.lock().await.take() {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "Relay task failed");
            }
        }

        self.hub.close_all().await;
        if let Some(link) = &self.link {
            link.close().await;
        }
    }
}

/// Publisher and relay buses for the configured backend
#[cfg(feature = "redis")]
async fn open_buses(config: &Config) -> Result<(Arc<dyn StreamBus>, Arc<dyn StreamBus>)> {
    use crate::bus::RedisBus;

    let Some(url) = &config.bus.redis_url else {
        return Ok(memory_buses(config));
    };

    // The relay blocks on reads, so it gets its own connection
    let bus: Arc<dyn StreamBus> = Arc::new(RedisBus::connect(url, config.bus.max_len).await?);
    let relay_bus: Arc<dyn StreamBus> = Arc::new(RedisBus::connect(url, config.bus.max_len).await?);
    Ok((bus, relay_bus))
}

#[cfg(not(feature = "redis"))]
async fn open_buses(config: &Config) -> Result<(Arc<dyn StreamBus>, Arc<dyn StreamBus>)> {
    if config.bus.redis_url.is_some() {
        tracing::warn!("Redis configured but the redis feature is disabled, using the in-memory bus");
    }
    Ok(memory_buses(config))
}

fn memory_buses(config: &Config) -> (Arc<dyn StreamBus>, Arc<dyn StreamBus>) {
    let bus: Arc<dyn StreamBus> = Arc::new(MemoryBus::new(config.bus.max_len));
    (bus.clone(), bus)
}

/// A child of `parent` that is also cancelled when `other` fires
fn linked_token(parent: &CancellationToken, other: CancellationToken) -> CancellationToken {
    let linked = parent.child_token();
    let watcher = linked.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = other.cancelled() => watcher.cancel(),
            _ = watcher.cancelled() => {}
        }
    });
    linked
}
