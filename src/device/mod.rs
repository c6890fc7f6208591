//! Device link and typed device commands
//!
//! [`DeviceLink`] owns one multiplexed API connection and replaces it when it
//! breaks. Everything above this module talks to the device through the
//! [`Device`] trait so the link can be shared as `Arc<dyn Device>` and
//! replaced by a scripted device in tests.
//!
//! # Example
//!
//! ```no_run
//! use ros_telemetry::device::{monitor_traffic, DeviceConfig, DeviceLink};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), ros_telemetry::device::DeviceError> {
//! let link = DeviceLink::connect(DeviceConfig::new("192.168.88.1").credentials("api", "secret")).await?;
//! let cancel = CancellationToken::new();
//! let mut traffic = monitor_traffic(&link, "ether1", cancel.clone()).await?;
//! while let Some(sample) = traffic.recv().await {
//!     println!("{} rx={} tx={}", sample.name, sample.rx_bits_per_second, sample.tx_bits_per_second);
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
mod connection;
pub mod error;
pub mod frame;
pub mod link;
#[cfg(test)]
pub(crate) mod mock;
pub mod ping;
pub mod pppoe;
pub mod traffic;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::protocol::{Attributes, Command, Reply};

pub use config::DeviceConfig;
pub use error::DeviceError;
pub use frame::FrameError;
pub use link::DeviceLink;
pub use ping::{ping_command, stream_ping, ProbeReply};
pub use pppoe::{active_pppoe_interfaces, extract_pppoe_username, find_active_interface};
pub use traffic::{monitor_traffic, InterfaceTraffic};

/// Command transport to a single device
#[async_trait]
pub trait Device: Send + Sync {
    /// Run a command and collect its complete reply
    async fn execute(&self, command: Command) -> Result<Reply, DeviceError>;

    /// Start a streaming command
    ///
    /// The channel yields one item per `!re` frame and closes when the device
    /// finishes the command, the connection is lost, or `cancel` fires.
    async fn open_stream(
        &self,
        command: Command,
        cancel: CancellationToken,
    ) -> Result<mpsc::Receiver<Attributes>, DeviceError>;
}
