//! Probe sessions

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::device::{ping_command, stream_ping, Device, DeviceError, ProbeReply};
use crate::directory::Directory;

use super::{resolve_target, ProbeError, ProbeSummary, ProbeTally};

/// Ping parameters
#[derive(Debug, Clone)]
pub struct ProbeOptions {
    /// Payload size in bytes
    pub size: u32,
    pub interval: Duration,
    /// Events buffered for the caller
    pub buffer: usize,
}

impl Default for ProbeOptions {
    fn default() -> Self {
        Self {
            size: 56,
            interval: Duration::from_secs(1),
            buffer: 32,
        }
    }
}

impl ProbeOptions {
    /// Set the ping packet size in bytes
    pub fn size(mut self, size: u32) -> Self {
        self.size = size;
        self
    }

    /// Set the interval between pings
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Set the event channel capacity
    pub fn buffer(mut self, buffer: usize) -> Self {
        self.buffer = buffer.max(1);
        self
    }
}

/// Event sent to a probe's caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProbeEvent {
    Update { data: ProbeReply },
    Failed { error: String },
    Summary { summary: ProbeSummary },
}

/// Ping `target` until the device stops or `cancel` fires
///
/// Every reply is forwarded as [`ProbeEvent::Update`]. The channel always
/// ends with one [`ProbeEvent::Summary`]; a ping that fails to start sends
/// [`ProbeEvent::Failed`] first.
pub fn start_probe(
    device: Arc<dyn Device>,
    cancel: CancellationToken,
    target: &str,
    options: ProbeOptions,
) -> mpsc::Receiver<ProbeEvent> {
    let (tx, rx) = mpsc::channel(options.buffer.max(1));
    let target = target.to_string();

    tokio::spawn(async move {
        let stream_cancel = cancel.child_token();
        let mut tally = ProbeTally::new();

        tracing::info!(address = %target, size = options.size, "Probe started");

        match stream_ping(
            device.as_ref(),
            &target,
            Some(options.size),
            Some(options.interval),
            stream_cancel.clone(),
        )
        .await
        {
            Ok(mut replies) => loop {
                let reply = tokio::select! {
                    _ = cancel.cancelled() => break,
                    reply = replies.recv() => match reply {
                        Some(reply) => reply,
                        None => break,
                    },
                };

                tally.record(&reply);
                if tx.send(ProbeEvent::Update { data: reply }).await.is_err() {
                    tracing::debug!(address = %target, "Probe caller went away");
                    break;
                }
            },
            Err(e) => {
                tracing::warn!(address = %target, error = %e, "Failed to start probe");
                let _ = tx.send(ProbeEvent::Failed { error: e.to_string() }).await;
            }
        }

        stream_cancel.cancel();

        let summary = tally.summary();
        tracing::info!(
            address = %target,
            sent = summary.sent,
            received = summary.received,
            loss = summary.loss_percent,
            "Probe finished"
        );
        let _ = tx.send(ProbeEvent::Summary { summary }).await;
    });

    rx
}

/// Probe a subscriber's address
pub async fn probe_subscriber(
    directory: &dyn Directory,
    device: Arc<dyn Device>,
    cancel: CancellationToken,
    id: &str,
    options: ProbeOptions,
) -> Result<mpsc::Receiver<ProbeEvent>, ProbeError> {
    let target = resolve_target(directory, id).await?;
    Ok(start_probe(device, cancel, &target, options))
}

/// Send `count` pings and summarize them
pub async fn ping_once(
    device: &dyn Device,
    address: &str,
    count: u32,
) -> Result<ProbeSummary, DeviceError> {
    let reply = device
        .execute(ping_command(address, None, None, Some(count.max(1))))
        .await?;

    let mut tally = ProbeTally::new();
    for reply in reply.re.iter().filter_map(ProbeReply::from_attributes) {
        tally.record(&reply);
    }
    Ok(tally.summary())
}
