//! Protocol error types

use thiserror::Error;

/// Errors raised while encoding or decoding API sentences
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Lead byte of a length prefix is a reserved control byte
    #[error("reserved control byte in length prefix: {0:#04x}")]
    ReservedControlByte(u8),

    /// Word exceeds the configured maximum length
    #[error("word length {len} exceeds maximum {max}")]
    WordTooLong { len: usize, max: usize },

    /// Sentence contained no words
    #[error("empty sentence")]
    EmptySentence,

    /// First word of a reply is not a known reply marker
    #[error("unknown reply type: {0}")]
    UnknownReply(String),

    /// Underlying transport failure
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
