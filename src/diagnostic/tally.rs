//! Probe counting

use std::cmp::Ordering;

use serde::Serialize;

use crate::device::ProbeReply;

/// Final result of a probe run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProbeSummary {
    pub sent: u32,
    pub received: u32,
    pub loss_percent: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_rtt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_rtt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_rtt: Option<String>,
}

/// Running counts over a ping stream
#[derive(Debug, Clone, Default)]
pub struct ProbeTally {
    sent: u32,
    received: u32,
    min_rtt: Option<String>,
    avg_rtt: Option<String>,
    max_rtt: Option<String>,
}

impl ProbeTally {
    /// Create an empty tally
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one frame
    ///
    /// Frames with a sequence number are probes. Round-trip statistics are
    /// taken from the latest frame that reports them.
    pub fn record(&mut self, reply: &ProbeReply) {
        if reply.is_probe() {
            self.sent += 1;
            if reply.received() {
                self.received += 1;
            }
        }

        if reply.avg_rtt.is_some() {
            self.min_rtt = reply.min_rtt.clone();
            self.avg_rtt = reply.avg_rtt.clone();
            self.max_rtt = reply.max_rtt.clone();
        }
    }

    /// Probes sent so far
    pub fn sent(&self) -> u32 {
        self.sent
    }

    /// Probes answered so far
    pub fn received(&self) -> u32 {
        self.received
    }

    /// Summarize the probes recorded so far
    pub fn summary(&self) -> ProbeSummary {
        ProbeSummary {
            sent: self.sent,
            received: self.received,
            loss_percent: loss_percent(self.sent, self.received),
            min_rtt: self.min_rtt.clone(),
            avg_rtt: self.avg_rtt.clone(),
            max_rtt: self.max_rtt.clone(),
        }
    }
}

/// Packet loss rounded half to even; 100 when nothing was sent
pub fn loss_percent(sent: u32, received: u32) -> u32 {
    if sent == 0 {
        return 100;
    }
    let lost = u64::from(sent.saturating_sub(received)) * 100;
    let sent = u64::from(sent);
    let (quotient, remainder) = (lost / sent, lost % sent);

    let rounded = match (remainder * 2).cmp(&sent) {
        Ordering::Less => quotient,
        Ordering::Greater => quotient + 1,
        Ordering::Equal => quotient + (quotient & 1),
    };
    rounded as u32
}
