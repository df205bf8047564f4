//! Wire-client seams.
//!
//! The writer engine never talks to a broker or store directly. It drives one
//! of the two client traits below, which concrete clients implement (see the
//! `kafka` and `redis` features) and tests replace with in-memory fakes.
//!
//! Only the error classes the engine reacts to are modeled:
//! - [`ConnectError`] separates bad configuration (fatal) from an unreachable
//!   system (retried forever).
//! - [`SendError`] separates timeouts and not-ready nodes from anything else.

use async_trait::async_trait;
use k4_core::error::K4Error;
use thiserror::Error;

/// Failure while establishing a sink connection.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConnectError {
    /// The client rejected its parameters; retrying cannot help.
    #[error("invalid client configuration: {0}")]
    Config(String),

    /// The external system could not be reached.
    #[error("unable to reach external system: {0}")]
    Unavailable(String),
}

/// Failure acknowledging a single broker message.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SendError {
    #[error("request timed out")]
    TimedOut,

    #[error("node not ready")]
    NodeNotReady,

    #[error("{0}")]
    Other(String),
}

/// Result of a successful broker handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    pub client_id: String,
    /// Brokers in the cluster the client bootstrapped from.
    pub brokers: usize,
}

// ---------------------------------------------------------------------------
// Broker family
// ---------------------------------------------------------------------------

/// Producer-style client: one acknowledged message per send.
#[async_trait]
pub trait BrokerClient: Send + Sync {
    /// Create the producer and confirm the cluster is reachable.
    async fn connect(&mut self) -> Result<Handshake, ConnectError>;

    /// Send one message and wait for its acknowledgment.
    async fn send(
        &self,
        topic: &str,
        value: Vec<u8>,
        key: Vec<u8>,
        partition: Option<i32>,
    ) -> Result<(), SendError>;

    /// Flush outstanding messages and release the connection.
    async fn close(&mut self) -> Result<(), K4Error>;
}

// ---------------------------------------------------------------------------
// Store family
// ---------------------------------------------------------------------------

/// One write inside a store pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreOp {
    /// Add `member` to sorted set `set` with `score`, never overwriting.
    AddSorted { set: String, member: Vec<u8>, score: f64 },
    /// Append one entry to the log named `log`.
    AppendLog { log: String, fields: Vec<(String, String)> },
}

/// Non-transactional batch of store writes sent in one round trip.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Pipeline {
    ops: Vec<StoreOp>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_sorted(&mut self, set: impl Into<String>, member: Vec<u8>, score: f64) -> &mut Self {
        self.ops.push(StoreOp::AddSorted { set: set.into(), member, score });
        self
    }

    pub fn append_log(&mut self, log: impl Into<String>, fields: Vec<(String, String)>) -> &mut Self {
        self.ops.push(StoreOp::AppendLog { log: log.into(), fields });
        self
    }

    pub fn ops(&self) -> &[StoreOp] {
        &self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn into_ops(self) -> Vec<StoreOp> {
        self.ops
    }
}

/// Key/value-and-stream store client.
#[async_trait]
pub trait StoreClient: Send {
    /// Validate parameters and prepare the client. No handshake is required.
    async fn connect(&mut self) -> Result<(), ConnectError>;

    /// Run `pipeline` in one round trip. Fails as a whole.
    async fn execute(&mut self, pipeline: Pipeline) -> Result<(), K4Error>;

    async fn close(&mut self) -> Result<(), K4Error>;
}
