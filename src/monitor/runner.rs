//! Background stream loop of one monitor

use std::sync::atomic::Ordering;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::bus::SamplePublisher;
use crate::device::{monitor_traffic, Device, InterfaceTraffic};

use super::entry::Monitor;
use super::sample::Sample;
use super::store::MonitorRegistry;

pub(super) struct MonitorRunner {
    pub(super) registry: Arc<MonitorRegistry>,
    pub(super) monitor: Arc<Monitor>,
    pub(super) device: Arc<dyn Device>,
    pub(super) publisher: Option<SamplePublisher>,
}

impl MonitorRunner {
    pub(super) async fn run(self) {
        let config = self.registry.config().clone();
        let monitor = &self.monitor;

        loop {
            if monitor.cancel.is_cancelled() {
                break;
            }

            let stream_cancel = monitor.cancel.child_token();
            let opened_at = Instant::now();

            let opened = match monitor_traffic(
                self.device.as_ref(),
                &monitor.interface,
                stream_cancel.clone(),
            )
            .await
            {
                Ok(traffic) => {
                    tracing::info!(
                        resource = %monitor.resource_id,
                        interface = %monitor.interface,
                        "Monitor stream active"
                    );
                    self.pump(traffic).await;
                    true
                }
                Err(e) => {
                    tracing::warn!(
                        resource = %monitor.resource_id,
                        interface = %monitor.interface,
                        error = %e,
                        "Failed to open traffic stream"
                    );
                    false
                }
            };

            // Releases the device-side stream if it is still open
            stream_cancel.cancel();

            if monitor.cancel.is_cancelled() {
                break;
            }

            if let Some(healthy_for) = config.restart_reset_after {
                if opened && opened_at.elapsed() >= healthy_for {
                    monitor.restarts.store(0, Ordering::Relaxed);
                }
            }

            let restarts = monitor.restarts.fetch_add(1, Ordering::Relaxed) + 1;
            if restarts >= config.max_restarts {
                tracing::warn!(
                    resource = %monitor.resource_id,
                    restarts = restarts,
                    "Max restart attempts reached, stopping monitor"
                );
                self.registry.terminate(monitor).await;
                break;
            }

            tracing::info!(
                resource = %monitor.resource_id,
                restarts = restarts,
                max_restarts = config.max_restarts,
                delay_ms = config.restart_delay.as_millis() as u64,
                "Traffic stream ended, restarting"
            );

            tokio::select! {
                _ = monitor.cancel.cancelled() => break,
                _ = tokio::time::sleep(config.restart_delay) => {}
            }
        }

        tracing::debug!(resource = %monitor.resource_id, "Monitor task exited");
    }

    /// Forward frames until the stream ends or the monitor is cancelled
    async fn pump(&self, mut traffic: mpsc::Receiver<InterfaceTraffic>) {
        let monitor = &self.monitor;

        loop {
            let frame = tokio::select! {
                _ = monitor.cancel.cancelled() => return,
                frame = traffic.recv() => match frame {
                    Some(frame) => frame,
                    None => {
                        tracing::info!(resource = %monitor.resource_id, "Traffic stream closed");
                        return;
                    }
                },
            };

            let sample = Sample::from_traffic(&monitor.resource_id, &monitor.subscriber, &frame);
            tracing::trace!(
                resource = %monitor.resource_id,
                rx = sample.rx_bits_per_second,
                tx = sample.tx_bits_per_second,
                "Sample"
            );

            monitor.fan_out(&sample).await;
            if let Some(publisher) = &self.publisher {
                publisher.publish(&sample).await;
            }
        }
    }
}
