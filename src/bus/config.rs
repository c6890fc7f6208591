//! Bus and relay configuration

use std::time::Duration;

/// Stream naming and retention
#[derive(Debug, Clone)]
pub struct BusConfig {
    /// Approximate number of entries retained per stream
    pub max_len: usize,

    /// Stream carrying traffic samples
    pub traffic_stream: String,

    /// Stream carrying session events
    pub events_stream: String,

    /// Redis connection URL; `None` selects the in-memory bus
    pub redis_url: Option<String>,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            max_len: 10_000,
            traffic_stream: "mikrotik:traffic:customers".to_string(),
            events_stream: "mikrotik:events".to_string(),
            redis_url: None,
        }
    }
}

impl BusConfig {
    /// Set the retention cap, at least one entry
    pub fn max_len(mut self, entries: usize) -> Self {
        self.max_len = entries.max(1);
        self
    }

    /// Set the traffic stream name
    pub fn traffic_stream(mut self, stream: impl Into<String>) -> Self {
        self.traffic_stream = stream.into();
        self
    }

    /// Set the session events stream name
    pub fn events_stream(mut self, stream: impl Into<String>) -> Self {
        self.events_stream = stream.into();
        self
    }

    /// Set the Redis connection URL
    pub fn redis_url(mut self, url: Option<String>) -> Self {
        self.redis_url = url;
        self
    }
}

/// Consumer-group relay options
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub group: String,
    pub consumer: String,

    /// Entries per read
    pub batch_size: usize,

    /// How long a read waits for new entries
    pub block: Duration,

    /// Pause after a failed read
    pub error_backoff: Duration,

    /// Claim entries left pending this long by other consumers
    pub claim_idle_after: Option<Duration>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            group: "websocket-broadcasters".to_string(),
            consumer: "broadcaster-1".to_string(),
            batch_size: 10,
            block: Duration::from_secs(2),
            error_backoff: Duration::from_secs(1),
            claim_idle_after: Some(Duration::from_secs(60)),
        }
    }
}

impl RelayConfig {
    /// Set the consumer group name
    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.group = group.into();
        self
    }

    /// Set this relay's consumer name
    pub fn consumer(mut self, consumer: impl Into<String>) -> Self {
        self.consumer = consumer.into();
        self
    }

    /// Set the maximum entries per read
    pub fn batch_size(mut self, entries: usize) -> Self {
        self.batch_size = entries.max(1);
        self
    }

    /// Set how long a read blocks waiting for entries
    pub fn block(mut self, block: Duration) -> Self {
        self.block = block;
        self
    }

    /// Set the delay after a failed bus call
    pub fn error_backoff(mut self, backoff: Duration) -> Self {
        self.error_backoff = backoff;
        self
    }

    /// Set the idle time after which entries of other consumers are claimed
    pub fn claim_idle_after(mut self, idle: Option<Duration>) -> Self {
        self.claim_idle_after = idle;
        self
    }
}
