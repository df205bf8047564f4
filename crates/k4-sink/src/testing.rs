//! In-memory wire clients for unit tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use k4_core::error::K4Error;

use crate::client::{BrokerClient, ConnectError, Handshake, Pipeline, SendError, StoreClient, StoreOp};

/// Everything a fake client saw, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Connect,
    Send { topic: String, value: Vec<u8>, key: Vec<u8>, partition: Option<i32> },
    Execute(Vec<StoreOp>),
    Close,
}

pub type Journal = Arc<Mutex<Vec<Event>>>;

type SendHook = Box<dyn Fn(usize) + Send + Sync>;

// ---------------------------------------------------------------------------
// FakeBroker
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeBroker {
    pub journal: Journal,
    /// Connection attempts to refuse before succeeding.
    pub unavailable_for: usize,
    pub reject_config: bool,
    /// Send sequence number -> scripted failure.
    pub failures: HashMap<usize, SendError>,
    pub on_send: Option<SendHook>,
    sends: std::sync::atomic::AtomicUsize,
}

impl FakeBroker {
    pub fn new() -> (Self, Journal) {
        let broker = Self::default();
        let journal = broker.journal.clone();
        (broker, journal)
    }

    pub fn fail(mut self, seq: usize, err: SendError) -> Self {
        self.failures.insert(seq, err);
        self
    }
}

#[async_trait]
impl BrokerClient for FakeBroker {
    async fn connect(&mut self) -> Result<Handshake, ConnectError> {
        self.journal.lock().unwrap().push(Event::Connect);
        if self.reject_config {
            return Err(ConnectError::Config("unknown property 'bootstrap_servers'".into()));
        }
        if self.unavailable_for > 0 {
            self.unavailable_for -= 1;
            return Err(ConnectError::Unavailable("connection refused".into()));
        }
        Ok(Handshake { client_id: "fake".into(), brokers: 3 })
    }

    async fn send(
        &self,
        topic: &str,
        value: Vec<u8>,
        key: Vec<u8>,
        partition: Option<i32>,
    ) -> Result<(), SendError> {
        let seq = self.sends.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        if let Some(hook) = &self.on_send {
            hook(seq);
        }
        if let Some(err) = self.failures.get(&seq) {
            return Err(err.clone());
        }
        self.journal.lock().unwrap().push(Event::Send { topic: topic.to_owned(), value, key, partition });
        Ok(())
    }

    async fn close(&mut self) -> Result<(), K4Error> {
        self.journal.lock().unwrap().push(Event::Close);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FakeStore
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeStore {
    pub journal: Journal,
    pub reject_config: bool,
    /// Pipelines to fail before succeeding again.
    pub failing_rounds: usize,
}

impl FakeStore {
    pub fn new() -> (Self, Journal) {
        let store = Self::default();
        let journal = store.journal.clone();
        (store, journal)
    }
}

#[async_trait]
impl StoreClient for FakeStore {
    async fn connect(&mut self) -> Result<(), ConnectError> {
        self.journal.lock().unwrap().push(Event::Connect);
        if self.reject_config {
            return Err(ConnectError::Config("invalid url".into()));
        }
        Ok(())
    }

    async fn execute(&mut self, pipeline: Pipeline) -> Result<(), K4Error> {
        if self.failing_rounds > 0 {
            self.failing_rounds -= 1;
            return Err(K4Error::Store("connection reset by peer".into()));
        }
        self.journal.lock().unwrap().push(Event::Execute(pipeline.into_ops()));
        Ok(())
    }

    async fn close(&mut self) -> Result<(), K4Error> {
        self.journal.lock().unwrap().push(Event::Close);
        Ok(())
    }
}

/// Sent broker messages as `(topic, value-as-json, key)`.
pub fn sent(journal: &Journal) -> Vec<(String, serde_json::Value, String)> {
    journal
        .lock()
        .unwrap()
        .iter()
        .filter_map(|e| match e {
            Event::Send { topic, value, key, .. } => Some((
                topic.clone(),
                serde_json::from_slice(value).unwrap(),
                String::from_utf8(key.clone()).unwrap(),
            )),
            _ => None,
        })
        .collect()
}
