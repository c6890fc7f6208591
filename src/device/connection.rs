//! Single multiplexed API connection
//!
//! One reader task owns the read half and routes every reply sentence to
//! whoever owns its tag:
//!
//! ```text
//!                  ┌──────────────────────────────┐
//!  execute() ────► │ routes: tag -> Request slot  │ ◄── !re / !trap / !done
//!  open_stream() ► │         tag -> Stream slot   │        (read_loop)
//!                  └──────────────────────────────┘
//!        │                                                    ▲
//!        └──── writer (Mutex<FramedWrite>) ──► TCP ──► device ┘
//! ```
//!
//! When the read loop ends, for whatever reason, every pending request is
//! failed and every stream channel is closed. Consumers therefore observe a
//! dead connection as a closed channel.

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;

use crate::protocol::constants::{CANCEL_COMMAND, LOGIN_COMMAND};
use crate::protocol::{
    Attributes, Command, ProtocolError, Reply, ReplyKind, ReplySentence, Sentence, SentenceCodec,
};

use super::config::DeviceConfig;
use super::error::DeviceError;

type Routes = Arc<Mutex<HashMap<String, Route>>>;

enum Route {
    Request(RequestSlot),
    Stream(StreamSlot),
}

struct RequestSlot {
    items: Vec<Attributes>,
    trap: Option<DeviceError>,
    reply: oneshot::Sender<Result<Reply, DeviceError>>,
}

struct StreamSlot {
    /// Resolved by the first `!re` or `!trap`
    opened: Option<oneshot::Sender<Result<(), DeviceError>>>,
    frames: mpsc::Sender<Attributes>,
    /// Dropped with the slot; wakes the cancellation watcher
    _finished: oneshot::Sender<()>,
}

impl Route {
    fn fail(self, err: DeviceError) {
        match self {
            Route::Request(slot) => {
                let _ = slot.reply.send(Err(err));
            }
            Route::Stream(mut slot) => {
                if let Some(opened) = slot.opened.take() {
                    let _ = opened.send(Err(err));
                }
            }
        }
    }
}

/// Why the read loop stopped
#[derive(Debug)]
enum CloseReason {
    Eof,
    Shutdown,
    Fatal(String),
    Io(io::ErrorKind, String),
    Protocol(String),
}

impl CloseReason {
    fn to_error(&self) -> DeviceError {
        match self {
            CloseReason::Eof | CloseReason::Shutdown | CloseReason::Protocol(_) => {
                DeviceError::ConnectionClosed
            }
            CloseReason::Fatal(message) => DeviceError::Fatal(message.clone()),
            CloseReason::Io(kind, message) => DeviceError::Io(io::Error::new(*kind, message.clone())),
        }
    }
}

/// A logged-in API connection
pub(crate) struct Connection {
    generation: u64,
    config: DeviceConfig,
    writer: Mutex<FramedWrite<OwnedWriteHalf, SentenceCodec>>,
    routes: Routes,
    next_tag: AtomicU64,
    closed: CancellationToken,
}

impl Connection {
    /// Connect, start the read loop and log in
    pub(crate) async fn connect(
        config: &DeviceConfig,
        generation: u64,
    ) -> Result<Arc<Self>, DeviceError> {
        let addr = config.addr();
        let connect = TcpStream::connect(addr.as_str());

        let socket = match config.connect_timeout {
            Some(timeout) => tokio::time::timeout(timeout, connect)
                .await
                .map_err(|_| DeviceError::ConnectTimeout {
                    addr: addr.clone(),
                    timeout,
                })?,
            None => connect.await,
        }
        .map_err(|source| DeviceError::Connect {
            addr: addr.clone(),
            source,
        })?;

        socket.set_nodelay(true)?;
        let (read_half, write_half) = socket.into_split();

        let routes: Routes = Arc::default();
        let closed = CancellationToken::new();

        let reader = FramedRead::new(
            read_half,
            SentenceCodec::with_max_word_len(config.max_word_len),
        );
        tokio::spawn(read_loop(
            reader,
            Arc::clone(&routes),
            closed.clone(),
            generation,
        ));

        let connection = Arc::new(Self {
            generation,
            config: config.clone(),
            writer: Mutex::new(FramedWrite::new(
                write_half,
                SentenceCodec::with_max_word_len(config.max_word_len),
            )),
            routes,
            next_tag: AtomicU64::new(1),
            closed,
        });

        if let Err(e) = connection.login().await {
            connection.close().await;
            return Err(e);
        }

        tracing::info!(addr = %addr, generation = generation, "Device connection established");
        Ok(connection)
    }

    /// Generation number assigned by the link
    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether the read loop has ended
    pub(crate) fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    async fn login(&self) -> Result<(), DeviceError> {
        let command = Command::new(LOGIN_COMMAND)
            .attr("name", &self.config.username)
            .attr("password", &self.config.password);

        match self.execute(&command).await {
            Ok(_) => Ok(()),
            Err(DeviceError::Trap { message, .. }) => Err(DeviceError::LoginRejected(message)),
            Err(e) => Err(e),
        }
    }

    /// Run a request/response command
    pub(crate) async fn execute(&self, command: &Command) -> Result<Reply, DeviceError> {
        let tag = self.next_tag();
        let (reply_tx, reply_rx) = oneshot::channel();

        self.register(
            &tag,
            Route::Request(RequestSlot {
                items: Vec::new(),
                trap: None,
                reply: reply_tx,
            }),
        )
        .await?;

        if let Err(e) = self.send(command.to_sentence(&tag)).await {
            self.routes.lock().await.remove(&tag);
            return Err(e);
        }

        match tokio::time::timeout(self.config.request_timeout, reply_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(DeviceError::ConnectionClosed),
            Err(_) => {
                self.routes.lock().await.remove(&tag);
                Err(DeviceError::Timeout(command.path().to_string()))
            }
        }
    }

    /// Start a streaming command
    ///
    /// Waits for the first frame (or trap) so immediate failures surface as
    /// errors. The returned channel closes on `!done`, on connection loss, or
    /// after `cancel` fires, in which case `/cancel` is sent to the device.
    pub(crate) async fn open_stream(
        self: &Arc<Self>,
        command: &Command,
        cancel: CancellationToken,
    ) -> Result<mpsc::Receiver<Attributes>, DeviceError> {
        let tag = self.next_tag();
        let (frames_tx, frames_rx) = mpsc::channel(self.config.stream_buffer);
        let (opened_tx, opened_rx) = oneshot::channel();
        let (finished_tx, finished_rx) = oneshot::channel::<()>();

        self.register(
            &tag,
            Route::Stream(StreamSlot {
                opened: Some(opened_tx),
                frames: frames_tx,
                _finished: finished_tx,
            }),
        )
        .await?;

        if let Err(e) = self.send(command.to_sentence(&tag)).await {
            self.routes.lock().await.remove(&tag);
            return Err(e);
        }

        let opened = tokio::select! {
            _ = cancel.cancelled() => {
                self.cancel_stream(&tag).await;
                return Err(DeviceError::Cancelled);
            }
            opened = tokio::time::timeout(self.config.stream_open_timeout, opened_rx) => opened,
        };

        match opened {
            Ok(Ok(Ok(()))) => {}
            Ok(Ok(Err(e))) => return Err(e),
            Ok(Err(_)) => return Err(DeviceError::ConnectionClosed),
            Err(_) => {
                self.cancel_stream(&tag).await;
                return Err(DeviceError::Timeout(command.path().to_string()));
            }
        }

        tracing::debug!(
            generation = self.generation,
            tag = %tag,
            command = %command,
            "Stream opened"
        );

        let connection = Arc::clone(self);
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => connection.cancel_stream(&tag).await,
                _ = finished_rx => {}
            }
        });

        Ok(frames_rx)
    }

    /// Stop the read loop and shut down the write half
    pub(crate) async fn close(&self) {
        self.closed.cancel();
        let mut writer = self.writer.lock().await;
        let _ = writer.get_mut().shutdown().await;
    }

    async fn register(&self, tag: &str, route: Route) -> Result<(), DeviceError> {
        let mut routes = self.routes.lock().await;
        // Checked under the routes lock: the read loop cancels before draining
        if self.closed.is_cancelled() {
            return Err(DeviceError::ConnectionClosed);
        }
        routes.insert(tag.to_string(), route);
        Ok(())
    }

    async fn cancel_stream(&self, tag: &str) {
        let removed = self.routes.lock().await.remove(tag).is_some();
        if !removed || self.is_closed() {
            return;
        }

        let cancel_tag = self.next_tag();
        let sentence = Command::new(CANCEL_COMMAND)
            .attr("tag", tag)
            .to_sentence(&cancel_tag);

        match self.send(sentence).await {
            Ok(()) => tracing::debug!(generation = self.generation, tag = %tag, "Stream cancelled"),
            Err(e) => tracing::debug!(
                generation = self.generation,
                tag = %tag,
                error = %e,
                "Failed to send stream cancel"
            ),
        }
    }

    async fn send(&self, sentence: Sentence) -> Result<(), DeviceError> {
        tracing::trace!(generation = self.generation, sentence = %sentence, "Sending sentence");
        self.writer
            .lock()
            .await
            .send(sentence)
            .await
            .map_err(DeviceError::from)
    }

    fn next_tag(&self) -> String {
        self.next_tag.fetch_add(1, Ordering::Relaxed).to_string()
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.closed.cancel();
    }
}

async fn read_loop(
    mut reader: FramedRead<OwnedReadHalf, SentenceCodec>,
    routes: Routes,
    closed: CancellationToken,
    generation: u64,
) {
    let reason = loop {
        let next = tokio::select! {
            _ = closed.cancelled() => break CloseReason::Shutdown,
            next = reader.next() => next,
        };

        let sentence = match next {
            None => break CloseReason::Eof,
            Some(Err(ProtocolError::Io(e))) => break CloseReason::Io(e.kind(), e.to_string()),
            Some(Err(e)) => break CloseReason::Protocol(e.to_string()),
            Some(Ok(sentence)) => sentence,
        };

        let reply = match ReplySentence::try_from(sentence) {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!(generation = generation, error = %e, "Ignoring malformed reply");
                continue;
            }
        };

        if reply.kind == ReplyKind::Fatal {
            break CloseReason::Fatal(reply.message.unwrap_or_default());
        }

        dispatch(&routes, reply).await;
    };

    closed.cancel();

    let pending: Vec<Route> = routes.lock().await.drain().map(|(_, route)| route).collect();

    match &reason {
        CloseReason::Shutdown => {
            tracing::debug!(generation = generation, pending = pending.len(), "Read loop stopped")
        }
        CloseReason::Protocol(message) => tracing::warn!(
            generation = generation,
            error = %message,
            pending = pending.len(),
            "Device connection lost on malformed data"
        ),
        other => tracing::warn!(
            generation = generation,
            reason = ?other,
            pending = pending.len(),
            "Device connection lost"
        ),
    }

    for route in pending {
        route.fail(reason.to_error());
    }
}

async fn dispatch(routes: &Routes, reply: ReplySentence) {
    let Some(tag) = reply.tag else {
        tracing::trace!(kind = ?reply.kind, "Ignoring untagged reply");
        return;
    };

    let mut routes = routes.lock().await;

    match reply.kind {
        ReplyKind::Re => match routes.get_mut(&tag) {
            Some(Route::Request(slot)) => slot.items.push(reply.attributes),
            Some(Route::Stream(slot)) => {
                if let Some(opened) = slot.opened.take() {
                    let _ = opened.send(Ok(()));
                }
                if let Err(mpsc::error::TrySendError::Full(_)) = slot.frames.try_send(reply.attributes)
                {
                    tracing::trace!(tag = %tag, "Stream consumer lagging, frame dropped");
                }
            }
            None => tracing::trace!(tag = %tag, "Reply for unknown tag"),
        },
        ReplyKind::Trap => {
            let err = trap_error(&reply.attributes);
            match routes.get_mut(&tag) {
                Some(Route::Request(slot)) => slot.trap = Some(err),
                Some(Route::Stream(slot)) => match slot.opened.take() {
                    Some(opened) => {
                        let _ = opened.send(Err(err));
                    }
                    None => tracing::debug!(tag = %tag, error = %err, "Stream trapped"),
                },
                None => tracing::trace!(tag = %tag, "Trap for unknown tag"),
            }
        }
        ReplyKind::Done => match routes.remove(&tag) {
            Some(Route::Request(slot)) => {
                let result = match slot.trap {
                    Some(err) => Err(err),
                    None => Ok(Reply {
                        re: slot.items,
                        done: reply.attributes,
                    }),
                };
                let _ = slot.reply.send(result);
            }
            Some(Route::Stream(mut slot)) => {
                if let Some(opened) = slot.opened.take() {
                    let _ = opened.send(Ok(()));
                }
            }
            None => {}
        },
        ReplyKind::Empty | ReplyKind::Fatal => {}
    }
}

fn trap_error(attributes: &Attributes) -> DeviceError {
    DeviceError::Trap {
        category: attributes.get("category").and_then(|c| c.parse().ok()),
        message: attributes
            .non_empty("message")
            .unwrap_or("unknown error")
            .to_string(),
    }
}
