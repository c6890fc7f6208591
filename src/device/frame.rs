//! Typed decoding of streamed frames

use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::protocol::Attributes;

/// A frame that cannot be mapped to its typed form
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("missing field {0}")]
    MissingField(&'static str),

    #[error("invalid number in {field}: {value:?}")]
    InvalidNumber { field: &'static str, value: String },
}

/// A non-empty field value
pub(crate) fn required<'a>(
    attributes: &'a Attributes,
    field: &'static str,
) -> Result<&'a str, FrameError> {
    attributes
        .non_empty(field)
        .ok_or(FrameError::MissingField(field))
}

/// A counter that must be present
pub(crate) fn required_counter(
    attributes: &Attributes,
    field: &'static str,
) -> Result<u64, FrameError> {
    parse_counter(field, required(attributes, field)?)
}

/// A counter that defaults to zero when absent or empty
pub(crate) fn counter(attributes: &Attributes, field: &'static str) -> Result<u64, FrameError> {
    match attributes.non_empty(field) {
        Some(value) => parse_counter(field, value),
        None => Ok(0),
    }
}

/// An owned string field, `None` when absent or empty
pub(crate) fn text(attributes: &Attributes, field: &str) -> Option<String> {
    attributes.non_empty(field).map(str::to_string)
}

fn parse_counter(field: &'static str, value: &str) -> Result<u64, FrameError> {
    value.trim().parse().map_err(|_| FrameError::InvalidNumber {
        field,
        value: value.to_string(),
    })
}

/// Map a raw frame stream to typed items on a forwarding task
///
/// Frames that fail to parse are skipped. The output closes when the input
/// closes, the consumer goes away, or `cancel` fires.
pub(crate) fn spawn_parsed<T, F>(
    mut frames: mpsc::Receiver<Attributes>,
    cancel: CancellationToken,
    buffer: usize,
    kind: &'static str,
    parse: F,
) -> mpsc::Receiver<T>
where
    T: Send + 'static,
    F: Fn(&Attributes) -> Result<Option<T>, FrameError> + Send + 'static,
{
    let (tx, rx) = mpsc::channel(buffer.max(1));

    tokio::spawn(async move {
        loop {
            let attributes = tokio::select! {
                _ = cancel.cancelled() => break,
                next = frames.recv() => match next {
                    Some(attributes) => attributes,
                    None => break,
                },
            };

            match parse(&attributes) {
                Ok(Some(item)) => {
                    if tx.send(item).await.is_err() {
                        break;
                    }
                }
                Ok(None) => tracing::trace!(kind = kind, "Skipping unrelated frame"),
                Err(e) => tracing::warn!(kind = kind, error = %e, "Skipping malformed frame"),
            }
        }
    });

    rx
}
