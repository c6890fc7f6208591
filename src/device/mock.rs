//! Scripted in-process device for tests

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::protocol::{Attributes, Command, Reply};

use super::error::DeviceError;
use super::Device;

/// What the next `open_stream` call does
#[derive(Debug, Clone)]
pub(crate) enum StreamScript {
    /// Fail to open with a trap
    Fail(String),
    /// Emit each frame after `interval`, then close or stay open until cancelled
    Frames {
        frames: Vec<Attributes>,
        interval: Duration,
        hold_open: bool,
    },
}

impl StreamScript {
    /// `count` traffic frames for `interface`; frame `i` carries
    /// rx = (i + 1) * 1000 and tx = (i + 1) * 500
    pub(crate) fn traffic(interface: &str, count: usize, interval: Duration, hold_open: bool) -> Self {
        let frames: Vec<Attributes> = (1..=count as u64)
            .map(|n| {
                [
                    ("name", interface.to_string()),
                    ("rx-bits-per-second", (n * 1000).to_string()),
                    ("tx-bits-per-second", (n * 500).to_string()),
                    ("rx-packets-per-second", n.to_string()),
                    ("tx-packets-per-second", n.to_string()),
                ]
                .into_iter()
                .collect::<Attributes>()
            })
            .collect();

        StreamScript::Frames {
            frames,
            interval,
            hold_open,
        }
    }

    pub(crate) fn frames(frames: Vec<Attributes>, interval: Duration, hold_open: bool) -> Self {
        StreamScript::Frames {
            frames,
            interval,
            hold_open,
        }
    }
}

#[derive(Default)]
struct Counters {
    opens: AtomicUsize,
    cancels: AtomicUsize,
    active: AtomicUsize,
}

pub(crate) struct MockDevice {
    interfaces: Vec<String>,
    ping_reply: Vec<Attributes>,
    execute_error: Option<String>,
    scripts: Mutex<VecDeque<StreamScript>>,
    fallback: Option<StreamScript>,
    executed: Mutex<Vec<Command>>,
    opened: Mutex<Vec<Command>>,
    counters: Arc<Counters>,
}

impl MockDevice {
    pub(crate) fn new() -> Self {
        Self {
            interfaces: Vec::new(),
            ping_reply: Vec::new(),
            execute_error: None,
            scripts: Mutex::new(VecDeque::new()),
            fallback: None,
            executed: Mutex::new(Vec::new()),
            opened: Mutex::new(Vec::new()),
            counters: Arc::default(),
        }
    }

    /// Running PPPoE interfaces returned by `/interface/print`
    pub(crate) fn with_interfaces<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.interfaces = names.into_iter().map(Into::into).collect();
        self
    }

    /// Items returned by a one-shot `/ping`
    pub(crate) fn with_ping_reply(mut self, items: Vec<Attributes>) -> Self {
        self.ping_reply = items;
        self
    }

    /// Make every `execute` fail
    pub(crate) fn with_execute_error(mut self, message: &str) -> Self {
        self.execute_error = Some(message.to_string());
        self
    }

    /// Script used once the queue is empty
    pub(crate) fn with_fallback(mut self, script: StreamScript) -> Self {
        self.fallback = Some(script);
        self
    }

    pub(crate) fn with_script(self, script: StreamScript) -> Self {
        self.push_script(script);
        self
    }

    pub(crate) fn push_script(&self, script: StreamScript) {
        self.scripts.lock().unwrap().push_back(script);
    }

    pub(crate) fn opens(&self) -> usize {
        self.counters.opens.load(Ordering::SeqCst)
    }

    pub(crate) fn cancels(&self) -> usize {
        self.counters.cancels.load(Ordering::SeqCst)
    }

    /// Streams currently producing or held open
    pub(crate) fn active(&self) -> usize {
        self.counters.active.load(Ordering::SeqCst)
    }

    pub(crate) fn executed(&self) -> Vec<Command> {
        self.executed.lock().unwrap().clone()
    }

    pub(crate) fn opened(&self) -> Vec<Command> {
        self.opened.lock().unwrap().clone()
    }

    fn interface_reply(&self) -> Reply {
        Reply {
            re: self
                .interfaces
                .iter()
                .map(|name| [("name", name.as_str())].into_iter().collect())
                .collect(),
            done: Attributes::new(),
        }
    }
}

#[async_trait]
impl Device for MockDevice {
    async fn execute(&self, command: Command) -> Result<Reply, DeviceError> {
        self.executed.lock().unwrap().push(command.clone());

        if let Some(message) = &self.execute_error {
            return Err(DeviceError::Transport(message.clone()));
        }

        Ok(match command.path() {
            "/interface/print" => self.interface_reply(),
            "/ping" => Reply {
                re: self.ping_reply.clone(),
                done: Attributes::new(),
            },
            _ => Reply::default(),
        })
    }

    async fn open_stream(
        &self,
        command: Command,
        cancel: CancellationToken,
    ) -> Result<mpsc::Receiver<Attributes>, DeviceError> {
        self.opened.lock().unwrap().push(command);
        self.counters.opens.fetch_add(1, Ordering::SeqCst);

        if cancel.is_cancelled() {
            return Err(DeviceError::Cancelled);
        }

        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .or_else(|| self.fallback.clone())
            .unwrap_or(StreamScript::Fail("no script".to_string()));

        let (frames, interval, hold_open) = match script {
            StreamScript::Fail(message) => {
                return Err(DeviceError::Trap {
                    category: None,
                    message,
                })
            }
            StreamScript::Frames {
                frames,
                interval,
                hold_open,
            } => (frames, interval, hold_open),
        };

        let (tx, rx) = mpsc::channel(frames.len().max(1));
        let counters = Arc::clone(&self.counters);
        counters.active.fetch_add(1, Ordering::SeqCst);

        tokio::spawn(async move {
            let produce = async {
                for frame in frames {
                    tokio::time::sleep(interval).await;
                    if tx.send(frame).await.is_err() {
                        return false;
                    }
                }
                if hold_open {
                    cancel.cancelled().await;
                    return true;
                }
                false
            };

            let cancelled = tokio::select! {
                _ = cancel.cancelled() => true,
                cancelled = produce => cancelled,
            };

            if cancelled {
                counters.cancels.fetch_add(1, Ordering::SeqCst);
            }
            counters.active.fetch_sub(1, Ordering::SeqCst);
        });

        Ok(rx)
    }
}
