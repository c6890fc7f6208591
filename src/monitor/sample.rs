//! Telemetry samples

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::device::InterfaceTraffic;
use crate::directory::{ServiceType, Subscriber};

const SPEED_UNITS: [&str; 4] = ["bps", "Kbps", "Mbps", "Gbps"];

/// One traffic reading for a monitored subscriber
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sample {
    pub resource_id: String,
    pub subscriber_name: String,
    pub username: String,
    pub service_type: ServiceType,
    pub interface: String,
    pub rx_bits_per_second: u64,
    pub tx_bits_per_second: u64,
    pub rx_packets_per_second: u64,
    pub tx_packets_per_second: u64,
    pub download_speed: String,
    pub upload_speed: String,
    pub timestamp: DateTime<Utc>,

    /// Set on the last sample of a monitor that gave up
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub terminal: bool,
}

impl Sample {
    /// Build a sample from a traffic frame
    pub fn from_traffic(resource_id: &str, subscriber: &Subscriber, traffic: &InterfaceTraffic) -> Self {
        Self {
            resource_id: resource_id.to_string(),
            subscriber_name: subscriber.name.clone(),
            username: subscriber.username.clone(),
            service_type: subscriber.service_type,
            interface: traffic.name.clone(),
            rx_bits_per_second: traffic.rx_bits_per_second,
            tx_bits_per_second: traffic.tx_bits_per_second,
            rx_packets_per_second: traffic.rx_packets_per_second,
            tx_packets_per_second: traffic.tx_packets_per_second,
            download_speed: format_speed(traffic.rx_bits_per_second),
            upload_speed: format_speed(traffic.tx_bits_per_second),
            timestamp: Utc::now(),
            terminal: false,
        }
    }

    /// Final notification for observers of a monitor that gave up
    pub fn terminal(resource_id: &str, subscriber: &Subscriber, interface: &str) -> Self {
        Self {
            terminal: true,
            ..Self::from_traffic(
                resource_id,
                subscriber,
                &InterfaceTraffic {
                    name: interface.to_string(),
                    ..Default::default()
                },
            )
        }
    }
}

/// Human-readable rate, e.g. `12.35 Mbps`
pub fn format_speed(bits_per_second: u64) -> String {
    if bits_per_second == 0 {
        return "0 bps".to_string();
    }

    let mut value = bits_per_second as f64;
    let mut unit = 0;
    while value >= 1000.0 && unit < SPEED_UNITS.len() - 1 {
        value /= 1000.0;
        unit += 1;
    }

    format!("{:.2} {}", value, SPEED_UNITS[unit])
}
