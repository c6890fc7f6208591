//! On-demand RouterOS interface telemetry
//!
//! Streams per-subscriber bandwidth from a MikroTik router and distributes
//! it to whoever is watching:
//!
//! - [`protocol`]: RouterOS API wire format (words, sentences, replies)
//! - [`device`]: one multiplexed, self-healing API connection
//! - [`monitor`]: reference-counted per-subscriber traffic monitors
//! - [`bus`]: durable at-least-once streams and the consumer-group relay
//! - [`hub`]: fan-out of relayed messages to live viewer connections
//! - [`diagnostic`]: streaming and one-shot ping probes
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use ros_telemetry::{Config, MemoryDirectory, Subscriber, TelemetryService};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> ros_telemetry::Result<()> {
//! let directory = Arc::new(MemoryDirectory::with_subscribers([
//!     Subscriber::pppoe("c1", "Alice", "alice"),
//! ]));
//! let service = TelemetryService::start(Config::from_env()?, directory).await?;
//!
//! let mut subscription = service
//!     .registry()
//!     .subscribe(&CancellationToken::new(), "c1")
//!     .await?;
//! while let Some(sample) = subscription.recv().await {
//!     println!("{} down {}", sample.interface, sample.download_speed);
//! }
//! # Ok(())
//! # }
//! ```

pub mod bus;
pub mod config;
pub mod device;
pub mod diagnostic;
pub mod directory;
pub mod error;
pub mod hub;
pub mod monitor;
pub mod protocol;
pub mod service;

pub use bus::{BusRelay, MemoryBus, SamplePublisher, SessionEvents, StreamBus};
pub use config::{Config, ConfigError};
pub use device::{Device, DeviceConfig, DeviceError, DeviceLink};
pub use diagnostic::{ping_once, start_probe, ProbeEvent, ProbeOptions, ProbeSummary};
pub use directory::{Directory, MemoryDirectory, Subscriber};
pub use error::{Error, Result};
pub use hub::{BroadcastHub, ViewerConnection};
pub use monitor::{MonitorRegistry, Sample, SubscribeError, Subscription};
pub use service::TelemetryService;
