//! Sample publishing

use std::sync::Arc;

use crate::monitor::Sample;

use super::{StreamBus, StreamId};

/// Publishes monitor samples to the traffic stream
///
/// Failures are logged and swallowed; a slow or broken bus never stops a
/// monitor.
#[derive(Clone)]
pub struct SamplePublisher {
    bus: Arc<dyn StreamBus>,
    stream: String,
}

impl SamplePublisher {
    /// Create a publisher for `stream`
    pub fn new(bus: Arc<dyn StreamBus>, stream: impl Into<String>) -> Self {
        Self {
            bus,
            stream: stream.into(),
        }
    }

    /// Get the target stream name
    pub fn stream(&self) -> &str {
        &self.stream
    }

    /// Publish one sample, returning its entry id on success
    pub async fn publish(&self, sample: &Sample) -> Option<StreamId> {
        let payload = match serde_json::to_string(sample) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(resource = %sample.resource_id, error = %e, "Failed to encode sample");
                return None;
            }
        };

        match self.bus.publish(&self.stream, &payload).await {
            Ok(id) => {
                tracing::trace!(resource = %sample.resource_id, id = %id, "Published sample");
                Some(id)
            }
            Err(e) => {
                tracing::warn!(
                    resource = %sample.resource_id,
                    stream = %self.stream,
                    error = %e,
                    "Failed to publish sample"
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{MemoryBus, ReadFrom};
    use crate::device::InterfaceTraffic;
    use crate::directory::Subscriber;
    use std::time::Duration;

    #[tokio::test]
    async fn test_publish_writes_json_sample() {
        let bus = Arc::new(MemoryBus::default());
        bus.ensure_group("traffic", "g").await.unwrap();
        let publisher = SamplePublisher::new(bus.clone(), "traffic");

        let subscriber = Subscriber::pppoe("r1", "Alice", "alice");
        let traffic = InterfaceTraffic {
            name: "<pppoe-alice>".to_string(),
            rx_bits_per_second: 2_000_000,
            tx_bits_per_second: 500_000,
            ..Default::default()
        };
        let sample = Sample::from_traffic("r1", &subscriber, &traffic);

        let id = publisher.publish(&sample).await.unwrap();

        let entries = bus
            .read_group("traffic", "g", "c", ReadFrom::New, 10, Duration::ZERO)
            .await
            .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].id, id);

        let decoded: Sample = serde_json::from_str(&entries[0].payload).unwrap();
        assert_eq!(decoded, sample);
        assert_eq!(decoded.download_speed, "2.00 Mbps");
    }
}
