//! Device connection configuration

use std::fmt;
use std::time::Duration;

use crate::protocol::constants::{DEFAULT_API_PORT, MAX_WORD_LEN};

/// Device connection options
#[derive(Clone)]
pub struct DeviceConfig {
    /// Device host name or address
    pub host: String,

    /// API port
    pub port: u16,

    /// API user
    pub username: String,

    /// API password
    pub password: String,

    /// TCP connect timeout (None = OS default)
    pub connect_timeout: Option<Duration>,

    /// Deadline for request/response commands
    pub request_timeout: Duration,

    /// Deadline for the first reply of a streaming command
    pub stream_open_timeout: Duration,

    /// Frames buffered per open stream before new frames are dropped
    pub stream_buffer: usize,

    /// Largest accepted word on the wire
    pub max_word_len: usize,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            host: "192.168.100.1".to_string(),
            port: DEFAULT_API_PORT,
            username: "admin".to_string(),
            password: String::new(),
            connect_timeout: Some(Duration::from_secs(10)),
            request_timeout: Duration::from_secs(30),
            stream_open_timeout: Duration::from_secs(10),
            stream_buffer: 64,
            max_word_len: MAX_WORD_LEN,
        }
    }
}

impl DeviceConfig {
    /// Create a config for a host with default port and timeouts
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Default::default()
        }
    }

    /// Set the API port
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set login credentials
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = username.into();
        self.password = password.into();
        self
    }

    /// Set the connect timeout
    pub fn connect_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the request timeout
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the stream open timeout
    pub fn stream_open_timeout(mut self, timeout: Duration) -> Self {
        self.stream_open_timeout = timeout;
        self
    }

    /// Set the per-stream frame buffer (minimum 1)
    pub fn stream_buffer(mut self, frames: usize) -> Self {
        self.stream_buffer = frames.max(1);
        self
    }

    /// `host:port` address string
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Debug for DeviceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"***")
            .field("connect_timeout", &self.connect_timeout)
            .field("request_timeout", &self.request_timeout)
            .field("stream_open_timeout", &self.stream_open_timeout)
            .field("stream_buffer", &self.stream_buffer)
            .field("max_word_len", &self.max_word_len)
            .finish()
    }
}
