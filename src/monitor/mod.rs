//! On-demand traffic monitors
//!
//! A monitor streams traffic for one subscriber's interface while at least
//! one caller is subscribed to it.
//!
//! # Architecture
//!
//! ```text
//!                        Arc<MonitorRegistry>
//!                  ┌──────────────────────────────┐
//!  subscribe(id) ─►│ key lock(id)                 │
//!                  │ monitors: id -> Monitor {    │
//!                  │   clients, observers,        │
//!                  │   cancel, restarts           │
//!                  │ }                            │
//!                  └──────────────┬───────────────┘
//!                                 │ one task per monitor
//!                                 ▼
//!        Device ── monitor-traffic ──► Sample ──┬──► observers (try_send)
//!                                               └──► SamplePublisher (bus)
//! ```
//!
//! Subscriptions are released explicitly through
//! [`MonitorRegistry::unsubscribe`], when the caller's cancellation token
//! fires, or when the [`Subscription`] is dropped. The last release stops the
//! monitor and cancels its device stream.
//!
//! A monitor whose stream fails to open or keeps closing is retried after
//! `restart_delay`, up to `max_restarts` attempts. It then sends observers a
//! sample with `terminal` set and stops.

pub mod config;
pub mod entry;
pub mod fanout;
mod resolver;
mod runner;
pub mod sample;
pub mod store;

use thiserror::Error;

pub use config::RegistryConfig;
pub use entry::{MonitorStats, Subscription};
pub use fanout::{Delivery, ObserverId, ObserverSet};
pub use sample::{format_speed, Sample};
pub use store::MonitorRegistry;

/// Why a subscription could not be created
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SubscribeError {
    /// No subscriber with this id
    #[error("subscriber not found: {0}")]
    NotFound(String),

    /// The subscriber has no running session on the device
    #[error("no active session for {0}")]
    NoActiveSession(String),

    /// The interface could not be determined
    #[error("failed to resolve interface: {0}")]
    ResolutionFailed(String),
}
