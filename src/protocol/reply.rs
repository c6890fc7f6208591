//! Reply sentences and their attributes

use std::collections::HashMap;

use super::constants::{REPLY_DONE, REPLY_EMPTY, REPLY_FATAL, REPLY_RE, REPLY_TRAP, TAG_ATTRIBUTE};
use super::error::ProtocolError;
use super::sentence::Sentence;

/// Type of reply sentence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyKind {
    /// Data reply (one item, or one streamed frame)
    Re,
    /// Command finished
    Done,
    /// Command failed; followed by `!done`
    Trap,
    /// Connection is being closed by the device
    Fatal,
    /// Command produced no items
    Empty,
}

impl ReplyKind {
    fn from_word(word: &str) -> Option<Self> {
        match word {
            REPLY_RE => Some(ReplyKind::Re),
            REPLY_DONE => Some(ReplyKind::Done),
            REPLY_TRAP => Some(ReplyKind::Trap),
            REPLY_FATAL => Some(ReplyKind::Fatal),
            REPLY_EMPTY => Some(ReplyKind::Empty),
            _ => None,
        }
    }
}

/// Key/value attributes of a reply
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attributes(HashMap<String, String>);

impl Attributes {
    /// Create an empty map
    pub fn new() -> Self {
        Self::default()
    }

    /// Get an attribute value
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    /// Get an attribute value, treating empty strings as absent
    pub fn non_empty(&self, name: &str) -> Option<&str> {
        self.get(name).filter(|v| !v.is_empty())
    }

    /// Whether the attribute is present
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    /// Set an attribute
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }

    /// Number of attributes
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no attributes
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over name/value pairs
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Attributes {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// A parsed reply sentence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplySentence {
    /// Reply type
    pub kind: ReplyKind,
    /// Tag of the command this reply belongs to
    pub tag: Option<String>,
    /// `=name=value` attributes
    pub attributes: Attributes,
    /// Bare reason word carried by `!fatal`
    pub message: Option<String>,
}

impl TryFrom<Sentence> for ReplySentence {
    type Error = ProtocolError;

    fn try_from(sentence: Sentence) -> Result<Self, ProtocolError> {
        let mut words = sentence.into_words().into_iter();
        let first = words.next().ok_or(ProtocolError::EmptySentence)?;
        let kind = ReplyKind::from_word(&first).ok_or(ProtocolError::UnknownReply(first))?;

        let mut tag = None;
        let mut attributes = Attributes::new();
        let mut message = None;

        for word in words {
            if let Some(rest) = word.strip_prefix('=') {
                let (name, value) = rest.split_once('=').unwrap_or((rest, ""));
                attributes.insert(name, value);
            } else if let Some(value) = word
                .strip_prefix(TAG_ATTRIBUTE)
                .and_then(|rest| rest.strip_prefix('='))
            {
                tag = Some(value.to_string());
            } else {
                message = Some(word);
            }
        }

        Ok(Self {
            kind,
            tag,
            attributes,
            message,
        })
    }
}

/// Complete result of a request/response command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reply {
    /// One entry per `!re` sentence
    pub re: Vec<Attributes>,
    /// Attributes of the closing `!done`
    pub done: Attributes,
}
