//! Monitor registry configuration

use std::time::Duration;

/// Monitor registry options
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Failed stream attempts before a monitor gives up
    pub max_restarts: u32,

    /// Pause between stream attempts
    pub restart_delay: Duration,

    /// Buffered samples per observer before samples are dropped for it
    pub observer_capacity: usize,

    /// Reset the restart counter when a stream stayed up at least this long
    ///
    /// `None` keeps counting failures for the whole monitor lifetime.
    pub restart_reset_after: Option<Duration>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            max_restarts: 3,
            restart_delay: Duration::from_secs(5),
            observer_capacity: 50,
            restart_reset_after: None,
        }
    }
}

impl RegistryConfig {
    /// Set how many stream failures a monitor tolerates
    pub fn max_restarts(mut self, restarts: u32) -> Self {
        self.max_restarts = restarts;
        self
    }

    /// Set the delay between stream restarts
    pub fn restart_delay(mut self, delay: Duration) -> Self {
        self.restart_delay = delay;
        self
    }

    /// Set the per-observer buffer (minimum 1)
    pub fn observer_capacity(mut self, capacity: usize) -> Self {
        self.observer_capacity = capacity.max(1);
        self
    }

    /// Reset the restart counter after a stream stayed open this long
    pub fn restart_reset_after(mut self, healthy_for: Option<Duration>) -> Self {
        self.restart_reset_after = healthy_for;
        self
    }
}
