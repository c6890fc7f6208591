//! Interface traffic monitoring (`/interface/monitor-traffic`)

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::protocol::{Attributes, Command};

use super::error::DeviceError;
use super::frame::{counter, required, required_counter, spawn_parsed, FrameError};
use super::Device;

/// Command path for live interface counters
pub const MONITOR_TRAFFIC_COMMAND: &str = "/interface/monitor-traffic";

const TRAFFIC_BUFFER: usize = 16;

/// One traffic frame for an interface, rates per second
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InterfaceTraffic {
    pub name: String,

    pub rx_bits_per_second: u64,
    pub rx_packets_per_second: u64,
    pub tx_bits_per_second: u64,
    pub tx_packets_per_second: u64,

    /// Fast-path counters
    pub fp_rx_bits_per_second: u64,
    pub fp_rx_packets_per_second: u64,
    pub fp_tx_bits_per_second: u64,
    pub fp_tx_packets_per_second: u64,

    pub rx_drops_per_second: u64,
    pub rx_errors_per_second: u64,
    pub tx_drops_per_second: u64,
    pub tx_queue_drops_per_second: u64,
    pub tx_errors_per_second: u64,
}

impl InterfaceTraffic {
    /// Parse a `monitor-traffic` frame
    ///
    /// `name` and the bit rates are required; other counters default to 0.
    pub fn from_attributes(attributes: &Attributes) -> Result<Self, FrameError> {
        Ok(Self {
            name: required(attributes, "name")?.to_string(),
            rx_bits_per_second: required_counter(attributes, "rx-bits-per-second")?,
            rx_packets_per_second: counter(attributes, "rx-packets-per-second")?,
            tx_bits_per_second: required_counter(attributes, "tx-bits-per-second")?,
            tx_packets_per_second: counter(attributes, "tx-packets-per-second")?,
            fp_rx_bits_per_second: counter(attributes, "fp-rx-bits-per-second")?,
            fp_rx_packets_per_second: counter(attributes, "fp-rx-packets-per-second")?,
            fp_tx_bits_per_second: counter(attributes, "fp-tx-bits-per-second")?,
            fp_tx_packets_per_second: counter(attributes, "fp-tx-packets-per-second")?,
            rx_drops_per_second: counter(attributes, "rx-drops-per-second")?,
            rx_errors_per_second: counter(attributes, "rx-errors-per-second")?,
            tx_drops_per_second: counter(attributes, "tx-drops-per-second")?,
            tx_queue_drops_per_second: counter(attributes, "tx-queue-drops-per-second")?,
            tx_errors_per_second: counter(attributes, "tx-errors-per-second")?,
        })
    }
}

/// Build the traffic monitor command for an interface
pub fn monitor_traffic_command(interface: &str) -> Command {
    Command::new(MONITOR_TRAFFIC_COMMAND).attr("interface", interface)
}

/// Stream traffic frames for one interface until `cancel` fires
pub async fn monitor_traffic(
    device: &dyn Device,
    interface: &str,
    cancel: CancellationToken,
) -> Result<mpsc::Receiver<InterfaceTraffic>, DeviceError> {
    let frames = device
        .open_stream(monitor_traffic_command(interface), cancel.clone())
        .await?;

    Ok(spawn_parsed(frames, cancel, TRAFFIC_BUFFER, "traffic", |a| {
        InterfaceTraffic::from_attributes(a).map(Some)
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(pairs: &[(&str, &str)]) -> Attributes {
        pairs.iter().copied().collect()
    }

    #[test]
    fn test_parse_full_frame() {
        let traffic = InterfaceTraffic::from_attributes(&frame(&[
            ("name", "<pppoe-alice>"),
            ("rx-bits-per-second", "12345678"),
            ("tx-bits-per-second", "2048"),
            ("rx-packets-per-second", "1100"),
            ("tx-packets-per-second", "90"),
            ("fp-rx-bits-per-second", "0"),
            ("tx-queue-drops-per-second", "3"),
        ]))
        .unwrap();

        assert_eq!(traffic.name, "<pppoe-alice>");
        assert_eq!(traffic.rx_bits_per_second, 12_345_678);
        assert_eq!(traffic.tx_bits_per_second, 2048);
        assert_eq!(traffic.rx_packets_per_second, 1100);
        assert_eq!(traffic.tx_queue_drops_per_second, 3);
        assert_eq!(traffic.rx_errors_per_second, 0);
    }

    #[test]
    fn test_missing_required_field_fails_closed() {
        let result = InterfaceTraffic::from_attributes(&frame(&[
            ("name", "ether1"),
            ("rx-bits-per-second", "1"),
        ]));
        assert_eq!(result, Err(FrameError::MissingField("tx-bits-per-second")));

        let result = InterfaceTraffic::from_attributes(&frame(&[
            ("rx-bits-per-second", "1"),
            ("tx-bits-per-second", "1"),
        ]));
        assert_eq!(result, Err(FrameError::MissingField("name")));
    }

    #[test]
    fn test_non_numeric_counter_fails_closed() {
        let result = InterfaceTraffic::from_attributes(&frame(&[
            ("name", "ether1"),
            ("rx-bits-per-second", "1.2Mbps"),
            ("tx-bits-per-second", "1"),
        ]));
        assert!(matches!(result, Err(FrameError::InvalidNumber { field: "rx-bits-per-second", .. })));
    }

    #[test]
    fn test_command_words() {
        let cmd = monitor_traffic_command("<pppoe-bob>");
        assert_eq!(cmd.path(), "/interface/monitor-traffic");
        assert_eq!(cmd.arg("interface"), Some("<pppoe-bob>"));
    }
}
