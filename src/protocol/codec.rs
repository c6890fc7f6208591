//! Incremental sentence codec
//!
//! Implements [`tokio_util::codec::Decoder`] and [`Encoder`] so a TCP stream
//! can be wrapped in `FramedRead` / `FramedWrite`. Decoding keeps the words of
//! a partially received sentence between calls, so only the current word is
//! ever re-scanned when more bytes arrive.

use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use super::constants::MAX_WORD_LEN;
use super::error::ProtocolError;
use super::sentence::Sentence;
use super::word::decode_length;

/// Codec for API sentences
#[derive(Debug)]
pub struct SentenceCodec {
    max_word_len: usize,
    partial: Vec<String>,
}

impl SentenceCodec {
    /// Create a codec with the default word limit
    pub fn new() -> Self {
        Self::with_max_word_len(MAX_WORD_LEN)
    }

    /// Create a codec that rejects words longer than `max_word_len`
    pub fn with_max_word_len(max_word_len: usize) -> Self {
        Self {
            max_word_len,
            partial: Vec::new(),
        }
    }
}

impl Default for SentenceCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for SentenceCodec {
    type Item = Sentence;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Sentence>, ProtocolError> {
        loop {
            let Some((len, prefix_len)) = decode_length(src)? else {
                return Ok(None);
            };

            if len > self.max_word_len {
                return Err(ProtocolError::WordTooLong {
                    len,
                    max: self.max_word_len,
                });
            }

            if len == 0 {
                src.advance(prefix_len);
                if self.partial.is_empty() {
                    // Stray terminator, nothing to deliver
                    continue;
                }
                let words = std::mem::take(&mut self.partial);
                return Ok(Some(Sentence::from_words(words)));
            }

            if src.len() < prefix_len + len {
                src.reserve(prefix_len + len - src.len());
                return Ok(None);
            }

            src.advance(prefix_len);
            let word = src.split_to(len);
            // Device strings are not guaranteed to be UTF-8 (e.g. comments)
            self.partial.push(String::from_utf8_lossy(&word).into_owned());
        }
    }
}

impl Encoder<Sentence> for SentenceCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: Sentence, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        if item.is_empty() {
            return Err(ProtocolError::EmptySentence);
        }
        item.encode(dst);
        Ok(())
    }
}
