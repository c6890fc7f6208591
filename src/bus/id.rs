//! Stream entry ids

use std::fmt;
use std::str::FromStr;

use super::BusError;

/// `<millis>-<seq>` entry id, ordered by time then sequence
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StreamId {
    pub ms: u64,
    pub seq: u64,
}

impl StreamId {
    pub const ZERO: StreamId = StreamId { ms: 0, seq: 0 };

    /// Create an id from its two parts
    pub fn new(ms: u64, seq: u64) -> Self {
        Self { ms, seq }
    }

    /// Next id after `last` at wall-clock time `now_ms`
    ///
    /// Ids stay strictly increasing even if the clock goes backwards.
    pub fn next_after(last: StreamId, now_ms: u64) -> Self {
        if now_ms > last.ms {
            Self::new(now_ms, 0)
        } else {
            Self::new(last.ms, last.seq + 1)
        }
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.ms, self.seq)
    }
}

impl FromStr for StreamId {
    type Err = BusError;

    fn from_str(s: &str) -> Result<Self, BusError> {
        let invalid = || BusError::InvalidId(s.to_string());
        let (ms, seq) = s.split_once('-').unwrap_or((s, "0"));

        Ok(Self {
            ms: ms.parse().map_err(|_| invalid())?,
            seq: seq.parse().map_err(|_| invalid())?,
        })
    }
}
