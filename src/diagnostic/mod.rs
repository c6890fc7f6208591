//! Reachability probes
//!
//! A probe pings one address through the device, forwards every reply to
//! the caller and finishes with exactly one [`ProbeEvent::Summary`], whether
//! the ping ended on its own, was cancelled, or never started.

mod session;
mod tally;

use thiserror::Error;

use crate::device::DeviceError;
use crate::directory::{Directory, DirectoryError};

pub use session::{ping_once, probe_subscriber, start_probe, ProbeEvent, ProbeOptions};
pub use tally::{loss_percent, ProbeSummary, ProbeTally};

/// Error type for probe setup
#[derive(Debug, Error)]
pub enum ProbeError {
    /// The subscriber has no address to probe
    #[error("no address to probe for subscriber {0}")]
    NoAddress(String),

    #[error(transparent)]
    Directory(#[from] DirectoryError),

    #[error(transparent)]
    Device(#[from] DeviceError),
}

/// Address to probe for a subscriber
pub async fn resolve_target(directory: &dyn Directory, id: &str) -> Result<String, ProbeError> {
    let subscriber = directory.get_subscriber(id).await?;
    subscriber
        .probe_address()
        .map(str::to_string)
        .ok_or_else(|| ProbeError::NoAddress(id.to_string()))
}
