//! Monitor registry implementation
//!
//! Reference-counted lifecycle of per-resource monitors. All lifecycle
//! changes for one resource id run under that id's key lock, so there is at
//! most one monitor per id and its client count always equals the number
//! of attached observers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;

use crate::bus::SamplePublisher;
use crate::device::Device;
use crate::directory::{Directory, DirectoryError};

use super::config::RegistryConfig;
use super::entry::{Monitor, MonitorStats, Subscription};
use super::fanout::ObserverId;
use super::resolver::resolve_interface;
use super::runner::MonitorRunner;
use super::sample::Sample;
use super::SubscribeError;

/// Registry of on-demand monitors
pub struct MonitorRegistry {
    device: Arc<dyn Device>,
    directory: Arc<dyn Directory>,
    publisher: Option<SamplePublisher>,
    config: RegistryConfig,

    monitors: RwLock<HashMap<String, Arc<Monitor>>>,

    /// Lazily created, never removed
    key_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,

    next_generation: AtomicU64,
}

impl MonitorRegistry {
    /// Create an empty registry
    pub fn new(
        device: Arc<dyn Device>,
        directory: Arc<dyn Directory>,
        config: RegistryConfig,
    ) -> Self {
        Self {
            device,
            directory,
            publisher: None,
            config,
            monitors: RwLock::new(HashMap::new()),
            key_locks: Mutex::new(HashMap::new()),
            next_generation: AtomicU64::new(1),
        }
    }

    /// Also publish every sample to the bus
    pub fn with_publisher(mut self, publisher: SamplePublisher) -> Self {
        self.publisher = Some(publisher);
        self
    }

    /// Get the registry configuration
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Subscribe to samples for a resource
    ///
    /// Starts a monitor if none runs for `resource_id`. The subscription is
    /// released when `cancel` fires or the [`Subscription`] is dropped.
    pub async fn subscribe(
        self: &Arc<Self>,
        cancel: &CancellationToken,
        resource_id: &str,
    ) -> Result<Subscription, SubscribeError> {
        let lock = self.key_lock(resource_id).await;
        let _guard = lock.lock().await;

        let existing = self.monitors.read().await.get(resource_id).cloned();

        let (monitor, runner) = match existing {
            Some(monitor) => {
                let clients = monitor.clients.fetch_add(1, Ordering::SeqCst) + 1;
                tracing::info!(resource = %resource_id, clients = clients, "Client joined monitor");
                (monitor, None)
            }
            None => {
                let (monitor, runner) = self.create_monitor(resource_id).await?;
                (monitor, Some(runner))
            }
        };

        let (observer_id, rx) = monitor
            .observers
            .write()
            .await
            .attach(self.config.observer_capacity);

        // The first observer is attached before the runner produces samples
        if let Some(runner) = runner {
            tokio::spawn(runner.run());
        }

        let release = cancel.child_token();
        self.spawn_release_watcher(&monitor, observer_id, release.clone());

        Ok(Subscription::new(resource_id, observer_id, rx, release))
    }

    /// Drop one client of a resource
    ///
    /// Detaches the most recently attached observer. The monitor stops when
    /// no clients remain. Does nothing when no monitor runs.
    pub async fn unsubscribe(&self, resource_id: &str) {
        let Some(lock) = self.existing_key_lock(resource_id).await else {
            return;
        };
        let _guard = lock.lock().await;

        let Some(monitor) = self.monitors.read().await.get(resource_id).cloned() else {
            return;
        };

        monitor.observers.write().await.detach_latest();
        let remaining = monitor.clients.load(Ordering::SeqCst).saturating_sub(1);
        monitor.clients.store(remaining, Ordering::SeqCst);

        tracing::info!(resource = %resource_id, clients = remaining, "Client left monitor");

        if remaining == 0 {
            self.stop_locked(&monitor, "no clients left").await;
        }
    }

    /// Ids of all running monitors, sorted
    pub async fn active_monitors(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.monitors.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Snapshot of one monitor, `None` when it is not running
    pub async fn monitor_stats(&self, resource_id: &str) -> Option<MonitorStats> {
        let monitor = self.monitors.read().await.get(resource_id).cloned()?;
        Some(monitor.stats().await)
    }

    /// Number of running monitors
    pub async fn monitor_count(&self) -> usize {
        self.monitors.read().await.len()
    }

    /// Stop every monitor and close all subscriptions
    pub async fn shutdown(&self) {
        let monitors: Vec<Arc<Monitor>> = self
            .monitors
            .write()
            .await
            .drain()
            .map(|(_, monitor)| monitor)
            .collect();

        for monitor in &monitors {
            monitor.cancel.cancel();
            monitor.observers.write().await.close_all();
        }

        tracing::info!(stopped = monitors.len(), "Monitor registry shut down");
    }

    /// Register a new monitor; the caller spawns the returned runner
    async fn create_monitor(
        self: &Arc<Self>,
        resource_id: &str,
    ) -> Result<(Arc<Monitor>, MonitorRunner), SubscribeError> {
        let subscriber = self
            .directory
            .get_subscriber(resource_id)
            .await
            .map_err(|e| match e {
                DirectoryError::NotFound(id) => SubscribeError::NotFound(id),
                DirectoryError::Backend(message) => SubscribeError::ResolutionFailed(message),
            })?;

        let interface = resolve_interface(self.device.as_ref(), &subscriber).await?;

        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let monitor = Arc::new(Monitor::new(generation, resource_id, interface, subscriber));

        self.monitors
            .write()
            .await
            .insert(resource_id.to_string(), Arc::clone(&monitor));

        let runner = MonitorRunner {
            registry: Arc::clone(self),
            monitor: Arc::clone(&monitor),
            device: Arc::clone(&self.device),
            publisher: self.publisher.clone(),
        };

        tracing::info!(
            resource = %resource_id,
            subscriber = %monitor.subscriber.name,
            interface = %monitor.interface,
            generation = generation,
            "Monitor started"
        );

        Ok((monitor, runner))
    }

    fn spawn_release_watcher(
        self: &Arc<Self>,
        monitor: &Arc<Monitor>,
        observer_id: ObserverId,
        release: CancellationToken,
    ) {
        let registry = Arc::clone(self);
        let resource_id = monitor.resource_id.clone();
        let generation = monitor.generation;
        let stopped = monitor.cancel.clone();

        tokio::spawn(async move {
            tokio::select! {
                _ = stopped.cancelled() => {}
                _ = release.cancelled() => {
                    registry.release(&resource_id, generation, observer_id).await;
                }
            }
        });
    }

    /// Release one specific observer, if it is still attached
    async fn release(&self, resource_id: &str, generation: u64, observer_id: ObserverId) {
        let Some(lock) = self.existing_key_lock(resource_id).await else {
            return;
        };
        let _guard = lock.lock().await;

        let Some(monitor) = self
            .monitors
            .read()
            .await
            .get(resource_id)
            .filter(|m| m.generation == generation)
            .cloned()
        else {
            return;
        };

        if !monitor.observers.write().await.detach(observer_id) {
            return;
        }

        let remaining = monitor.clients.load(Ordering::SeqCst).saturating_sub(1);
        monitor.clients.store(remaining, Ordering::SeqCst);
        tracing::info!(
            resource = %resource_id,
            observer = observer_id,
            clients = remaining,
            "Subscription released"
        );

        if remaining == 0 {
            self.stop_locked(&monitor, "no clients left").await;
        }
    }

    /// Tear down a monitor that exhausted its restart budget
    pub(super) async fn terminate(&self, monitor: &Arc<Monitor>) {
        let lock = self.key_lock(&monitor.resource_id).await;
        let _guard = lock.lock().await;

        if monitor.cancel.is_cancelled() {
            return;
        }

        let sample = Sample::terminal(&monitor.resource_id, &monitor.subscriber, &monitor.interface);
        monitor.observers.read().await.broadcast(&sample);
        monitor.clients.store(0, Ordering::SeqCst);

        self.stop_locked(monitor, "restart budget exhausted").await;
    }

    /// Stop a monitor; caller holds its key lock
    async fn stop_locked(&self, monitor: &Arc<Monitor>, reason: &str) {
        monitor.cancel.cancel();

        {
            let mut monitors = self.monitors.write().await;
            let is_current = monitors
                .get(&monitor.resource_id)
                .map(|m| Arc::ptr_eq(m, monitor))
                .unwrap_or(false);
            if is_current {
                monitors.remove(&monitor.resource_id);
            }
        }

        monitor.observers.write().await.close_all();

        tracing::info!(
            resource = %monitor.resource_id,
            generation = monitor.generation,
            reason = reason,
            "Monitor stopped"
        );
    }

    async fn key_lock(&self, resource_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.key_locks.lock().await;
        Arc::clone(locks.entry(resource_id.to_string()).or_default())
    }

    async fn existing_key_lock(&self, resource_id: &str) -> Option<Arc<Mutex<()>>> {
        self.key_locks.lock().await.get(resource_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{MemoryBus, ReadFrom, StreamBus};
    use crate::device::mock::{MockDevice, StreamScript};
    use crate::directory::{MemoryDirectory, Subscriber};
    use std::future::Future;
    use std::time::Duration;

    const TICK: Duration = Duration::from_millis(10);

    fn registry_with(device: MockDevice, config: RegistryConfig) -> (Arc<MonitorRegistry>, Arc<MockDevice>) {
        let device = Arc::new(device);
        let directory = Arc::new(MemoryDirectory::with_subscribers([
            Subscriber::pppoe("c1", "Alice", "alice"),
            Subscriber::pppoe("c2", "Bob", "bob"),
        ]));
        let registry = Arc::new(MonitorRegistry::new(
            device.clone(),
            directory,
            config,
        ));
        (registry, device)
    }

    async fn wait_for<F, Fut>(condition: F)
    where
        F: Fn() -> Fut,
        Fut: Future<Output = bool>,
    {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !condition().await {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached");
    }

    #[tokio::test]
    async fn test_subscribe_receives_samples_in_order() {
        let device = MockDevice::new()
            .with_interfaces(["<pppoe-alice>"])
            .with_script(StreamScript::traffic("<pppoe-alice>", 3, TICK, true));
        let (registry, device) = registry_with(device, RegistryConfig::default());

        let mut sub = registry
            .subscribe(&CancellationToken::new(), "c1")
            .await
            .unwrap();

        for n in 1..=3u64 {
            let sample = sub.recv().await.unwrap();
            assert_eq!(sample.resource_id, "c1");
            assert_eq!(sample.subscriber_name, "Alice");
            assert_eq!(sample.interface, "<pppoe-alice>");
            assert_eq!(sample.rx_bits_per_second, n * 1000);
        }

        assert_eq!(registry.active_monitors().await, vec!["c1".to_string()]);
        assert_eq!(device.opened()[0].arg("interface"), Some("<pppoe-alice>"));
    }

    #[tokio::test]
    async fn test_second_subscriber_shares_monitor() {
        let device = MockDevice::new()
            .with_interfaces(["<pppoe-alice>"])
            .with_script(StreamScript::traffic("<pppoe-alice>", 1, TICK, true));
        let (registry, device) = registry_with(device, RegistryConfig::default());
        let cancel = CancellationToken::new();

        let _a = registry.subscribe(&cancel, "c1").await.unwrap();
        let _b = registry.subscribe(&cancel, "c1").await.unwrap();

        let stats = registry.monitor_stats("c1").await.unwrap();
        assert_eq!(stats.clients, 2);
        assert_eq!(stats.observers, 2);
        assert_eq!(device.executed().len(), 1);
        wait_for(|| async { device.opens() == 1 }).await;

        registry.unsubscribe("c1").await;
        let stats = registry.monitor_stats("c1").await.unwrap();
        assert_eq!(stats.clients, 1);
        assert_eq!(stats.observers, 1);

        registry.unsubscribe("c1").await;
        assert_eq!(registry.monitor_count().await, 0);

        wait_for(|| async { device.active() == 0 }).await;
        assert_eq!(device.opens(), 1);
        assert_eq!(device.cancels(), 1);
    }

    #[tokio::test]
    async fn test_n_subscribes_m_unsubscribes() {
        let device = MockDevice::new()
            .with_interfaces(["<pppoe-alice>"])
            .with_fallback(StreamScript::traffic("<pppoe-alice>", 1, TICK, true));
        let (registry, _device) = registry_with(device, RegistryConfig::default());
        let cancel = CancellationToken::new();

        let mut subs = Vec::new();
        for _ in 0..5 {
            subs.push(registry.subscribe(&cancel, "c1").await.unwrap());
        }
        for _ in 0..3 {
            registry.unsubscribe("c1").await;
        }

        let stats = registry.monitor_stats("c1").await.unwrap();
        assert_eq!(stats.clients, 2);
        assert_eq!(stats.observers, 2);

        registry.unsubscribe("c1").await;
        registry.unsubscribe("c1").await;
        assert!(registry.monitor_stats("c1").await.is_none());

        // Extra unsubscribes are no-ops
        registry.unsubscribe("c1").await;
        registry.unsubscribe("unknown").await;
        assert_eq!(registry.monitor_count().await, 0);
    }

    #[tokio::test]
    async fn test_concurrent_subscribes_start_one_monitor() {
        let device = MockDevice::new()
            .with_interfaces(["<pppoe-alice>"])
            .with_fallback(StreamScript::traffic("<pppoe-alice>", 1, TICK, true));
        let (registry, device) = registry_with(device, RegistryConfig::default());
        let cancel = CancellationToken::new();

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let registry = Arc::clone(&registry);
                let cancel = cancel.clone();
                tokio::spawn(async move { registry.subscribe(&cancel, "c1").await })
            })
            .collect();

        let mut subs = Vec::new();
        for handle in handles {
            subs.push(handle.await.unwrap().unwrap());
        }

        assert_eq!(registry.monitor_count().await, 1);
        assert_eq!(registry.monitor_stats("c1").await.unwrap().clients, 10);
        assert_eq!(device.executed().len(), 1);
        wait_for(|| async { device.opens() == 1 }).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_first_sample_reaches_creating_subscriber() {
        for _ in 0..50 {
            let device = MockDevice::new()
                .with_interfaces(["<pppoe-alice>"])
                .with_script(StreamScript::traffic("<pppoe-alice>", 3, Duration::ZERO, true));
            let (registry, _device) = registry_with(device, RegistryConfig::default());

            let mut sub = registry
                .subscribe(&CancellationToken::new(), "c1")
                .await
                .unwrap();
            assert_eq!(sub.recv().await.unwrap().rx_bits_per_second, 1000);

            drop(sub);
            wait_for(|| async { registry.monitor_count().await == 0 }).await;
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_subscribe_and_unsubscribe_keep_one_monitor() {
        let device = MockDevice::new()
            .with_interfaces(["<pppoe-alice>"])
            .with_fallback(StreamScript::traffic("<pppoe-alice>", 1, TICK, true));
        let (registry, device) = registry_with(device, RegistryConfig::default());
        let cancel = CancellationToken::new();

        let mut subscribes = Vec::new();
        let mut unsubscribes = Vec::new();
        for _ in 0..50 {
            let registry_a = Arc::clone(&registry);
            let cancel = cancel.clone();
            subscribes.push(tokio::spawn(async move {
                registry_a.subscribe(&cancel, "c1").await
            }));

            let registry_b = Arc::clone(&registry);
            unsubscribes.push(tokio::spawn(async move {
                registry_b.unsubscribe("c1").await
            }));
        }

        let mut subs = Vec::new();
        for handle in subscribes {
            subs.push(handle.await.unwrap().unwrap());
        }
        for handle in unsubscribes {
            handle.await.unwrap();
        }

        assert!(registry.monitor_count().await <= 1);
        if let Some(stats) = registry.monitor_stats("c1").await {
            assert_eq!(stats.clients, stats.observers);
            assert!(stats.clients >= 1);
        }

        drop(subs);
        wait_for(|| async { registry.monitor_count().await == 0 }).await;
        wait_for(|| async { device.active() == 0 }).await;
    }

    #[tokio::test]
    async fn test_subscribe_errors() {
        let device = MockDevice::new().with_interfaces(["<pppoe-bob>"]);
        let (registry, _device) = registry_with(device, RegistryConfig::default());
        let cancel = CancellationToken::new();

        let result = registry.subscribe(&cancel, "missing").await;
        assert!(matches!(result, Err(SubscribeError::NotFound(id)) if id == "missing"));

        let result = registry.subscribe(&cancel, "c1").await;
        assert!(matches!(result, Err(SubscribeError::NoActiveSession(_))));

        assert_eq!(registry.monitor_count().await, 0);
    }

    #[tokio::test]
    async fn test_caller_cancel_releases_subscription() {
        let device = MockDevice::new()
            .with_interfaces(["<pppoe-alice>"])
            .with_fallback(StreamScript::traffic("<pppoe-alice>", 1, TICK, true));
        let (registry, device) = registry_with(device, RegistryConfig::default());

        let first = CancellationToken::new();
        let second = CancellationToken::new();
        let mut a = registry.subscribe(&first, "c1").await.unwrap();
        let _b = registry.subscribe(&second, "c1").await.unwrap();

        first.cancel();
        wait_for(|| async {
            registry
                .monitor_stats("c1")
                .await
                .map(|s| s.clients == 1)
                .unwrap_or(false)
        })
        .await;

        // The cancelled observer's channel is closed
        while a.recv().await.is_some() {}

        second.cancel();
        wait_for(|| async { registry.monitor_count().await == 0 }).await;
        wait_for(|| async { device.active() == 0 }).await;
    }

    #[tokio::test]
    async fn test_dropping_subscription_releases() {
        let device = MockDevice::new()
            .with_interfaces(["<pppoe-alice>"])
            .with_fallback(StreamScript::traffic("<pppoe-alice>", 1, TICK, true));
        let (registry, _device) = registry_with(device, RegistryConfig::default());

        let sub = registry
            .subscribe(&CancellationToken::new(), "c1")
            .await
            .unwrap();
        assert_eq!(sub.resource_id(), "c1");
        drop(sub);

        wait_for(|| async { registry.monitor_count().await == 0 }).await;
    }

    #[tokio::test]
    async fn test_unsubscribe_then_drop_does_not_double_release() {
        let device = MockDevice::new()
            .with_interfaces(["<pppoe-alice>"])
            .with_fallback(StreamScript::traffic("<pppoe-alice>", 1, TICK, true));
        let (registry, _device) = registry_with(device, RegistryConfig::default());
        let cancel = CancellationToken::new();

        let a = registry.subscribe(&cancel, "c1").await.unwrap();
        let b = registry.subscribe(&cancel, "c1").await.unwrap();
        let c = registry.subscribe(&cancel, "c1").await.unwrap();

        // Detaches `c`, the latest observer
        registry.unsubscribe("c1").await;
        drop(c);
        tokio::time::sleep(Duration::from_millis(20)).await;

        let stats = registry.monitor_stats("c1").await.unwrap();
        assert_eq!(stats.clients, 2);
        assert_eq!(stats.observers, 2);

        drop(a);
        drop(b);
        wait_for(|| async { registry.monitor_count().await == 0 }).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_budget_exhausted() {
        let device = MockDevice::new()
            .with_interfaces(["<pppoe-alice>"])
            .with_fallback(StreamScript::Fail("no such item".into()));
        let (registry, device) = registry_with(device, RegistryConfig::default());

        let mut sub = registry
            .subscribe(&CancellationToken::new(), "c1")
            .await
            .unwrap();

        let last = sub.recv().await.unwrap();
        assert!(last.terminal);
        assert_eq!(last.resource_id, "c1");
        assert_eq!(last.interface, "<pppoe-alice>");
        assert!(sub.recv().await.is_none());

        assert_eq!(device.opens(), 3);
        assert_eq!(registry.monitor_count().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_restarts_after_close() {
        let device = MockDevice::new()
            .with_interfaces(["<pppoe-alice>"])
            .with_script(StreamScript::traffic("<pppoe-alice>", 2, TICK, false))
            .with_script(StreamScript::traffic("<pppoe-alice>", 1, TICK, true));
        let (registry, device) = registry_with(device, RegistryConfig::default());

        let mut sub = registry
            .subscribe(&CancellationToken::new(), "c1")
            .await
            .unwrap();

        let rates: Vec<u64> = vec![
            sub.recv().await.unwrap().rx_bits_per_second,
            sub.recv().await.unwrap().rx_bits_per_second,
            sub.recv().await.unwrap().rx_bits_per_second,
        ];
        assert_eq!(rates, vec![1000, 2000, 1000]);
        assert_eq!(device.opens(), 2);
        assert_eq!(registry.monitor_stats("c1").await.unwrap().restarts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_healthy_stream_resets_restart_counter() {
        let config = RegistryConfig::default()
            .max_restarts(2)
            .restart_reset_after(Some(Duration::from_secs(1)));
        let device = MockDevice::new()
            .with_interfaces(["<pppoe-alice>"])
            .with_script(StreamScript::Fail("busy".into()))
            .with_script(StreamScript::traffic("<pppoe-alice>", 3, Duration::from_secs(1), false))
            .with_script(StreamScript::traffic("<pppoe-alice>", 1, TICK, true));
        let (registry, device) = registry_with(device, config);

        let mut sub = registry
            .subscribe(&CancellationToken::new(), "c1")
            .await
            .unwrap();

        for _ in 0..4 {
            assert!(!sub.recv().await.unwrap().terminal);
        }

        assert_eq!(device.opens(), 3);
        assert_eq!(registry.monitor_stats("c1").await.unwrap().restarts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_observer_does_not_block_others() {
        let device = MockDevice::new()
            .with_interfaces(["<pppoe-alice>"])
            .with_script(StreamScript::traffic("<pppoe-alice>", 5, TICK, true));
        let (registry, _device) = registry_with(device, RegistryConfig::default().observer_capacity(2));
        let cancel = CancellationToken::new();

        let mut idle = registry.subscribe(&cancel, "c1").await.unwrap();
        let mut active = registry.subscribe(&cancel, "c1").await.unwrap();

        for n in 1..=5u64 {
            assert_eq!(active.recv().await.unwrap().rx_bits_per_second, n * 1000);
        }

        let stats = registry.monitor_stats("c1").await.unwrap();
        assert_eq!(stats.dropped_samples, 3);
        assert_eq!(idle.try_recv().unwrap().rx_bits_per_second, 1000);
        assert_eq!(idle.try_recv().unwrap().rx_bits_per_second, 2000);
        assert!(idle.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_observer_does_not_delay_bus() {
        let device = Arc::new(
            MockDevice::new()
                .with_interfaces(["<pppoe-alice>"])
                .with_script(StreamScript::traffic("<pppoe-alice>", 5, TICK, true)),
        );
        let directory = Arc::new(MemoryDirectory::with_subscribers([Subscriber::pppoe(
            "c1", "Alice", "alice",
        )]));
        let bus = Arc::new(MemoryBus::default());
        let registry = Arc::new(
            MonitorRegistry::new(
                device,
                directory,
                RegistryConfig::default().observer_capacity(1),
            )
            .with_publisher(SamplePublisher::new(bus.clone(), "traffic")),
        );

        let _stalled = registry
            .subscribe(&CancellationToken::new(), "c1")
            .await
            .unwrap();

        wait_for(|| async { bus.stream_len("traffic").await.unwrap_or(0) == 5 }).await;

        bus.ensure_group("traffic", "g").await.unwrap();
        let entries = bus
            .read_group("traffic", "g", "c", ReadFrom::New, 10, Duration::ZERO)
            .await
            .unwrap();
        let rates: Vec<u64> = entries
            .iter()
            .map(|e| serde_json::from_str::<Sample>(&e.payload).unwrap().rx_bits_per_second)
            .collect();
        assert_eq!(rates, vec![1000, 2000, 3000, 4000, 5000]);
        assert_eq!(registry.monitor_stats("c1").await.unwrap().dropped_samples, 4);
    }

    #[tokio::test]
    async fn test_shutdown_closes_subscriptions() {
        let device = MockDevice::new()
            .with_interfaces(["<pppoe-alice>", "<pppoe-bob>"])
            .with_fallback(StreamScript::traffic("<pppoe-x>", 1, TICK, true));
        let (registry, device) = registry_with(device, RegistryConfig::default());
        let cancel = CancellationToken::new();

        let mut a = registry.subscribe(&cancel, "c1").await.unwrap();
        let mut b = registry.subscribe(&cancel, "c2").await.unwrap();
        assert_eq!(registry.active_monitors().await, vec!["c1".to_string(), "c2".to_string()]);

        registry.shutdown().await;

        while a.recv().await.is_some() {}
        while b.recv().await.is_some() {}
        assert_eq!(registry.monitor_count().await, 0);
        wait_for(|| async { device.active() == 0 }).await;
    }
}
