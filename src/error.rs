//! Crate-level error type

use thiserror::Error;

use crate::bus::BusError;
use crate::config::ConfigError;
use crate::device::DeviceError;
use crate::diagnostic::ProbeError;
use crate::directory::DirectoryError;
use crate::hub::HubError;
use crate::monitor::SubscribeError;
use crate::protocol::ProtocolError;

/// Any error surfaced by the service
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error(transparent)]
    Directory(#[from] DirectoryError),

    #[error(transparent)]
    Subscribe(#[from] SubscribeError),

    #[error(transparent)]
    Bus(#[from] BusError),

    #[error(transparent)]
    Hub(#[from] HubError),

    #[error(transparent)]
    Probe(#[from] ProbeError),
}

pub type Result<T> = std::result::Result<T, Error>;
