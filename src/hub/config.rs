use std::time::Duration;

/// Broadcast hub settings
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Longest a single connection write may take before eviction
    pub write_timeout: Duration,

    /// Buffered messages per channel connection
    pub connection_buffer: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            write_timeout: Duration::from_secs(5),
            connection_buffer: 64,
        }
    }
}

impl HubConfig {
    /// Set the per-write deadline
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Set the channel capacity of channel connections
    pub fn connection_buffer(mut self, messages: usize) -> Self {
        self.connection_buffer = messages.max(1);
        self
    }
}
