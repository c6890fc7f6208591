//! Device error types and transient-failure classification

use std::io;
use std::time::Duration;

use thiserror::Error;

use crate::protocol::ProtocolError;

/// Error message fragments that identify a dropped connection
///
/// Used to classify errors that only carry text (e.g. from a foreign
/// transport) as transient.
pub const TRANSIENT_SIGNATURES: &[&str] = &[
    "loop has ended",
    "closed network connection",
    "broken pipe",
    "EOF",
];

/// Error type for device operations
#[derive(Debug, Error)]
pub enum DeviceError {
    /// TCP connect failed
    #[error("failed to connect to device at {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// TCP connect did not complete in time
    #[error("connect to {addr} timed out after {timeout:?}")]
    ConnectTimeout { addr: String, timeout: Duration },

    /// Device rejected the credentials
    #[error("login rejected: {0}")]
    LoginRejected(String),

    /// Transport I/O failure
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    /// Malformed data on the wire
    #[error("protocol error: {0}")]
    Protocol(ProtocolError),

    /// The connection's read loop has ended
    #[error("connection closed: read loop has ended")]
    ConnectionClosed,

    /// Device sent `!fatal` and is closing the connection
    #[error("device closed the connection: {0}")]
    Fatal(String),

    /// Device rejected the command (`!trap`)
    #[error("device trap: {message}")]
    Trap {
        category: Option<u32>,
        message: String,
    },

    /// No reply within the request deadline
    #[error("timed out waiting for reply to {0}")]
    Timeout(String),

    /// Caller cancelled before the command produced a result
    #[error("command cancelled")]
    Cancelled,

    /// Error reported only as text by another layer
    #[error("transport error: {0}")]
    Transport(String),
}

impl From<ProtocolError> for DeviceError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::Io(io) => DeviceError::Io(io),
            other => DeviceError::Protocol(other),
        }
    }
}

impl DeviceError {
    /// Whether the error means the connection itself is gone
    ///
    /// Transient errors are recovered by reconnecting once and retrying the
    /// command once. Everything else is returned to the caller as-is.
    pub fn is_transient(&self) -> bool {
        match self {
            DeviceError::Io(err) => matches!(
                err.kind(),
                io::ErrorKind::BrokenPipe
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::UnexpectedEof
                    | io::ErrorKind::NotConnected
            ),
            DeviceError::ConnectionClosed | DeviceError::Fatal(_) => true,
            DeviceError::Transport(message) => is_transient_message(message),
            _ => false,
        }
    }
}

/// Check a free-form error message against [`TRANSIENT_SIGNATURES`]
pub fn is_transient_message(message: &str) -> bool {
    TRANSIENT_SIGNATURES
        .iter()
        .any(|signature| message.contains(signature))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_level_errors_are_transient() {
        assert!(DeviceError::ConnectionClosed.is_transient());
        assert!(DeviceError::Fatal("too many commands".into()).is_transient());
        assert!(DeviceError::Io(io::ErrorKind::BrokenPipe.into()).is_transient());
        assert!(DeviceError::Io(io::ErrorKind::ConnectionReset.into()).is_transient());
        assert!(DeviceError::Io(io::ErrorKind::UnexpectedEof.into()).is_transient());
    }

    #[test]
    fn test_command_errors_are_permanent() {
        let trap = DeviceError::Trap {
            category: Some(0),
            message: "no such item".into(),
        };
        assert!(!trap.is_transient());
        assert!(!DeviceError::Timeout("/ping".into()).is_transient());
        assert!(!DeviceError::LoginRejected("invalid user".into()).is_transient());
        assert!(!DeviceError::Io(io::ErrorKind::PermissionDenied.into()).is_transient());
    }

    #[test]
    fn test_transport_messages_classified_by_signature() {
        assert!(DeviceError::Transport("read tcp: use of closed network connection".into())
            .is_transient());
        assert!(DeviceError::Transport("unexpected EOF".into()).is_transient());
        assert!(!DeviceError::Transport("invalid argument".into()).is_transient());
    }

    #[test]
    fn test_protocol_io_maps_to_io() {
        let err: DeviceError = ProtocolError::Io(io::ErrorKind::BrokenPipe.into()).into();
        assert!(matches!(err, DeviceError::Io(_)));
        assert!(err.is_transient());
    }
}
