//! Sentences: ordered word lists terminated by an empty word

use std::fmt;

use bytes::BytesMut;

use super::word::encode_word;

/// A single API sentence
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sentence {
    words: Vec<String>,
}

impl Sentence {
    /// Create an empty sentence
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a sentence from words
    pub fn from_words<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            words: words.into_iter().map(Into::into).collect(),
        }
    }

    /// Append a word
    pub fn push(&mut self, word: impl Into<String>) {
        self.words.push(word.into());
    }

    /// All words in order
    pub fn words(&self) -> &[String] {
        &self.words
    }

    /// First word (command path or reply marker)
    pub fn first(&self) -> Option<&str> {
        self.words.first().map(String::as_str)
    }

    /// Whether the sentence has no words
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Consume into the words
    pub fn into_words(self) -> Vec<String> {
        self.words
    }

    /// Encode all words followed by the zero-length terminator
    pub fn encode(&self, buf: &mut BytesMut) {
        for word in &self.words {
            encode_word(word, buf);
        }
        buf.extend_from_slice(&[0]);
    }
}

impl fmt::Display for Sentence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, word) in self.words.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            if word.starts_with("=password=") {
                f.write_str("=password=***")?;
            } else {
                f.write_str(word)?;
            }
        }
        Ok(())
    }
}
