//! The writer loop: one task per sink instance.
//!
//! ```text
//! Unconnected -> Connecting -> Running -> Draining -> Closed
//!                  ^    |
//!                  +----+  unreachable: sleep `retry_delay`, try again
//! ```
//!
//! While running, the writer takes everything queued as one batch, resolves
//! routing strings for each record *before* shaping it, and hands the batch
//! to its adapter. The next batch starts only after the previous one is fully
//! acknowledged or logged.
//!
//! Shutdown is cooperative. It is checked between batches, so a batch that
//! was already taken off the queue is always published before the
//! connection is closed. A closed queue counts as shutdown.

use std::time::Duration;

use k4_core::error::K4Error;
use k4_core::types::{MessageKind, Record};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::adapter::{Routed, SinkAdapter};
use crate::client::{ConnectError, Handshake};
use crate::queue::EventQueue;
use crate::shaper::ShapingSpec;
use crate::template::TemplateEngine;

pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(10);

/// Lifecycle of a writer, observable through [`Writer::state`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterState {
    Unconnected,
    Connecting,
    Running,
    Draining,
    Closed,
}

pub struct Writer {
    label: String,
    kind: MessageKind,
    adapter: Box<dyn SinkAdapter>,
    engine: TemplateEngine,
    shaping: Option<ShapingSpec>,
    retry_delay: Duration,
    handshake: Option<Handshake>,
    state: watch::Sender<WriterState>,
}

/// Resolves once shutdown is requested. Never resolves if the flag's sender
/// is gone without having raised it.
async fn shutdown_requested(rx: &mut watch::Receiver<bool>) {
    if rx.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}

impl Writer {
    pub fn new(
        label: impl Into<String>,
        engine: TemplateEngine,
        shaping: Option<ShapingSpec>,
        adapter: Box<dyn SinkAdapter>,
    ) -> Self {
        let (state, _) = watch::channel(WriterState::Unconnected);
        Self {
            label: label.into(),
            kind: engine.kind(),
            adapter,
            engine,
            shaping,
            retry_delay: DEFAULT_RETRY_DELAY,
            handshake: None,
            state,
        }
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    /// Subscribe to state changes.
    pub fn state(&self) -> watch::Receiver<WriterState> {
        self.state.subscribe()
    }

    pub fn engine(&self) -> &TemplateEngine {
        &self.engine
    }

    /// Broker handshake, once connected.
    pub fn handshake(&self) -> Option<&Handshake> {
        self.handshake.as_ref()
    }

    fn set_state(&self, next: WriterState) {
        let prev = self.state.send_replace(next);
        if prev != next {
            debug!("[{}] {prev:?} -> {next:?}", self.label);
        }
    }

    /// Run until shutdown or a fatal error.
    ///
    /// Fatal errors (rejected client configuration, a routing template the
    /// record cannot fill) are returned after the connection is released.
    pub async fn run(&mut self, mut queue: EventQueue, mut shutdown: watch::Receiver<bool>) -> Result<(), K4Error> {
        let label = self.label.clone();

        if !self.connect(&mut shutdown).await? {
            info!("[{label}] shutdown requested before connecting");
            self.set_state(WriterState::Closed);
            return Ok(());
        }
        self.set_state(WriterState::Running);
        info!("[{label}] running ({} -> {})", self.kind, self.adapter.backend());

        let mut outcome = Ok(());
        loop {
            let batch = tokio::select! {
                biased;
                _ = shutdown_requested(&mut shutdown) => {
                    info!("[{label}] shutdown signal received");
                    break;
                }
                batch = queue.next_batch() => match batch {
                    Some(b) => b,
                    None => {
                        info!("[{label}] queue closed");
                        break;
                    }
                },
            };

            if let Err(e) = self.process(batch).await {
                outcome = Err(e);
                break;
            }
            if *shutdown.borrow() {
                info!("[{label}] shutdown signal received");
                break;
            }
        }

        self.set_state(WriterState::Draining);
        info!("[{label}] sending last messages and closing connection");
        if let Err(e) = self.adapter.close().await {
            warn!("[{label}] close failed: {e}");
        }
        self.set_state(WriterState::Closed);
        outcome
    }

    /// Connect, retrying unreachable systems forever.
    ///
    /// Returns `Ok(false)` if shutdown was requested while waiting.
    async fn connect(&mut self, shutdown: &mut watch::Receiver<bool>) -> Result<bool, K4Error> {
        let label = self.label.clone();
        self.set_state(WriterState::Connecting);
        loop {
            if *shutdown.borrow() {
                return Ok(false);
            }
            match self.adapter.connect().await {
                Ok(hs) => {
                    self.handshake = hs;
                    return Ok(true);
                }
                Err(ConnectError::Config(msg)) => {
                    error!("[{label}] invalid {} configuration: {msg}", self.adapter.backend());
                    self.set_state(WriterState::Closed);
                    return Err(K4Error::Connect(msg));
                }
                Err(ConnectError::Unavailable(msg)) => {
                    error!("[{label}] {msg}, retrying in {:?}", self.retry_delay);
                    tokio::select! {
                        _ = tokio::time::sleep(self.retry_delay) => {}
                        _ = shutdown_requested(shutdown) => return Ok(false),
                    }
                }
            }
        }
    }

    /// Route, shape and publish one batch.
    ///
    /// A record whose routing template cannot be filled is dropped and stops
    /// the writer, but only after the rest of the batch is published: those
    /// records are already off the queue. The first such error is returned.
    async fn process(&mut self, batch: Vec<Record>) -> Result<(), K4Error> {
        let total = batch.len();
        let mut prepared = Vec::with_capacity(total);
        let mut dropped = 0;
        let mut fatal = None;

        for record in batch {
            match self.prepare(record) {
                Ok(Some(routed)) => prepared.push(routed),
                Ok(None) => dropped += 1,
                Err(e) => {
                    error!("[{}] record dropped, writer will stop after this batch: {e}", self.label);
                    dropped += 1;
                    fatal.get_or_insert(e);
                }
            }
        }

        if !prepared.is_empty() {
            let n = prepared.len();
            match self.adapter.publish_batch(prepared).await {
                Ok(report) => debug!(
                    "[{}] batch of {total}: {} published, {} dropped",
                    self.label,
                    report.published,
                    report.dropped + dropped
                ),
                Err(e) => error!("[{}] batch of {n} record(s) failed: {e}", self.label),
            }
        }

        match fatal {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// `Ok(None)` drops the record; `Err` is fatal for the writer.
    fn prepare(&mut self, record: Record) -> Result<Option<Routed>, K4Error> {
        let destination = self.engine.resolve(self.adapter.destination(), &record)?;
        let key = match self.adapter.message_key() {
            Some(purpose) => Some(self.engine.resolve(purpose, &record)?),
            None => None,
        };

        let score = match self.adapter.score(&record) {
            Ok(s) => s,
            Err(e) => {
                error!("[{}] no score for '{destination}', record dropped: {e}", self.label);
                return Ok(None);
            }
        };

        let record = match &self.shaping {
            Some(spec) => match spec.shape(&record) {
                Ok(shaped) => shaped,
                Err(e) => {
                    error!("[{}] cannot shape record for '{destination}', dropped: {e}", self.label);
                    return Ok(None);
                }
            },
            None => record,
        };

        Ok(Some(Routed { destination, key, score, record }))
    }
}
