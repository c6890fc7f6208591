//! Streaming ping (`/ping`)

use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::protocol::{Attributes, Command};

use super::error::DeviceError;
use super::frame::{spawn_parsed, text, FrameError};
use super::Device;

pub const PING_COMMAND: &str = "/ping";

const PING_BUFFER: usize = 32;

/// One ping frame: a probe reply, or the running summary
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProbeReply {
    pub seq: Option<String>,
    pub host: Option<String>,
    pub size: Option<String>,
    pub ttl: Option<String>,
    /// Round-trip time, e.g. `12ms` or `1ms234us`
    pub time: Option<String>,
    /// `timeout`, `net-unreachable` etc.
    pub status: Option<String>,
    pub sent: Option<String>,
    pub received: Option<String>,
    pub packet_loss: Option<String>,
    pub avg_rtt: Option<String>,
    pub min_rtt: Option<String>,
    pub max_rtt: Option<String>,
    pub is_summary: bool,
}

impl ProbeReply {
    /// Parse a ping frame; `None` for frames with neither `seq` nor `sent`
    pub fn from_attributes(attributes: &Attributes) -> Option<Self> {
        let has_seq = attributes.contains("seq");
        let has_sent = attributes.contains("sent");
        if !has_seq && !has_sent {
            return None;
        }

        Some(Self {
            seq: text(attributes, "seq"),
            host: text(attributes, "host"),
            size: text(attributes, "size"),
            ttl: text(attributes, "ttl"),
            time: text(attributes, "time"),
            status: text(attributes, "status"),
            sent: text(attributes, "sent"),
            received: text(attributes, "received"),
            packet_loss: text(attributes, "packet-loss"),
            avg_rtt: text(attributes, "avg-rtt"),
            min_rtt: text(attributes, "min-rtt"),
            max_rtt: text(attributes, "max-rtt"),
            is_summary: !has_seq && has_sent,
        })
    }

    /// Whether this frame is a probe (it has a sequence number)
    pub fn is_probe(&self) -> bool {
        self.seq.is_some()
    }

    /// Whether the probe got an answer
    ///
    /// A reply counts as received when it carries a time, or when it has no
    /// failure status.
    pub fn received(&self) -> bool {
        self.time.is_some() || self.status.is_none()
    }
}

/// Build a ping command
///
/// `count` limits the number of probes; `None` pings until cancelled.
pub fn ping_command(
    address: &str,
    size: Option<u32>,
    interval: Option<Duration>,
    count: Option<u32>,
) -> Command {
    let mut command = Command::new(PING_COMMAND).attr("address", address);
    if let Some(size) = size {
        command = command.attr("size", size.to_string());
    }
    if let Some(interval) = interval {
        command = command.attr("interval", format_interval(interval));
    }
    if let Some(count) = count {
        command = command.attr("count", count.to_string());
    }
    command
}

fn format_interval(interval: Duration) -> String {
    if interval.subsec_millis() == 0 && interval.as_secs() > 0 {
        format!("{}s", interval.as_secs())
    } else {
        format!("{}ms", interval.as_millis().max(10))
    }
}

/// Ping continuously until `cancel` fires or the device ends the command
pub async fn stream_ping(
    device: &dyn Device,
    address: &str,
    size: Option<u32>,
    interval: Option<Duration>,
    cancel: CancellationToken,
) -> Result<mpsc::Receiver<ProbeReply>, DeviceError> {
    let frames = device
        .open_stream(ping_command(address, size, interval, None), cancel.clone())
        .await?;

    Ok(spawn_parsed(frames, cancel, PING_BUFFER, "ping", |a| {
        Ok::<_, FrameError>(ProbeReply::from_attributes(a))
    }))
}
