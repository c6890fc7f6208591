//! Service configuration
//!
//! Every component has its own config struct with defaults and builder
//! setters. [`Config`] gathers them and can be loaded from environment
//! variables:
//!
//! | Variable | Field |
//! |---|---|
//! | `MIKROTIK_HOST` | `device.host` |
//! | `MIKROTIK_PORT` | `device.port` |
//! | `MIKROTIK_USER` / `MIKROTIK_PASS` | `device.username` / `device.password` |
//! | `MIKROTIK_TIMEOUT_SECS` | `device.request_timeout` |
//! | `REDIS_ADDR`, `REDIS_PASS`, `REDIS_DB` | `bus.redis_url` |
//! | `MONITOR_MAX_RESTARTS` | `registry.max_restarts` |
//! | `MONITOR_RESTART_DELAY_SECS` | `registry.restart_delay` |
//! | `BUS_MAX_LEN` | `bus.max_len` |
//! | `RELAY_CONSUMER` | `relay.consumer` |
//!
//! Unset variables keep their defaults. Without `REDIS_ADDR` the in-memory
//! bus is used.

use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::bus::{BusConfig, RelayConfig};
use crate::device::DeviceConfig;
use crate::hub::HubConfig;
use crate::monitor::RegistryConfig;

/// Error loading configuration
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {name}: {value:?} ({reason})")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

/// Configuration for every component of the service
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub device: DeviceConfig,
    pub registry: RegistryConfig,
    pub bus: BusConfig,
    pub relay: RelayConfig,
    pub hub: HubConfig,
}

impl Config {
    /// Load from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load from an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let mut config = Config::default();

        if let Some(host) = get("MIKROTIK_HOST") {
            config.device.host = host;
        }
        if let Some(port) = parse(&get, "MIKROTIK_PORT")? {
            config.device.port = port;
        }
        if let Some(user) = get("MIKROTIK_USER") {
            config.device.username = user;
        }
        if let Some(pass) = lookup("MIKROTIK_PASS") {
            config.device.password = pass;
        }
        if let Some(secs) = parse::<u64>(&get, "MIKROTIK_TIMEOUT_SECS")? {
            config.device.request_timeout = Duration::from_secs(secs);
        }

        if let Some(addr) = get("REDIS_ADDR") {
            let db = parse::<u32>(&get, "REDIS_DB")?.unwrap_or(0);
            config.bus.redis_url = Some(redis_url(&addr, get("REDIS_PASS").as_deref(), db));
        }
        if let Some(max_len) = parse(&get, "BUS_MAX_LEN")? {
            config.bus = config.bus.max_len(max_len);
        }

        if let Some(restarts) = parse(&get, "MONITOR_MAX_RESTARTS")? {
            config.registry = config.registry.max_restarts(restarts);
        }
        if let Some(secs) = parse::<u64>(&get, "MONITOR_RESTART_DELAY_SECS")? {
            config.registry = config.registry.restart_delay(Duration::from_secs(secs));
        }

        if let Some(consumer) = get("RELAY_CONSUMER") {
            config.relay = config.relay.consumer(consumer);
        }

        if config.device.password.is_empty() {
            tracing::warn!("MIKROTIK_PASS is not set");
        }

        Ok(config)
    }
}

fn parse<T>(get: &impl Fn(&str) -> Option<String>, name: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    get(name)
        .map(|value| {
            value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
                name,
                reason: e.to_string(),
                value,
            })
        })
        .transpose()
}

fn redis_url(addr: &str, password: Option<&str>, db: u32) -> String {
    match password {
        Some(password) => format!("redis://:{password}@{addr}/{db}"),
        None => format!("redis://{addr}/{db}"),
    }
}
