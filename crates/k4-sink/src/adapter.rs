//! The polymorphic sink interface driven by the writer loop.
//!
//! Implementations:
//! - [`crate::kafka::KafkaAdapter`]: one acknowledged message per record
//! - [`crate::redis::ZsetAdapter`]: pipelined sorted-set adds
//! - [`crate::redis::StreamAdapter`]: pipelined append-log entries

use async_trait::async_trait;
use k4_core::error::K4Error;
use k4_core::types::Record;

use crate::client::{ConnectError, Handshake};
use crate::template::Purpose;

/// A record ready for publishing, with its routing already resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct Routed {
    /// Topic, sorted-set or stream name.
    pub destination: String,
    /// Broker message key.
    pub key: Option<String>,
    /// Sorted-set score, taken from the record before shaping.
    pub score: Option<f64>,
    /// Payload, shaped if a shaping spec is configured.
    pub record: Record,
}

/// Outcome of one batch publish.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub published: usize,
    pub dropped: usize,
}

/// Publish operations for one kind of external system.
///
/// Adapters own their wire client, and with it the sink connection.
#[async_trait]
pub trait SinkAdapter: Send {
    /// Backend name for log lines (e.g. `"kafka"`).
    fn backend(&self) -> &'static str;

    /// Purpose of the destination string.
    fn destination(&self) -> Purpose;

    /// Purpose of the per-message key, if the sink uses one.
    fn message_key(&self) -> Option<Purpose> {
        None
    }

    /// Extract the sort score from the unshaped record, if the sink needs one.
    fn score(&self, _record: &Record) -> Result<Option<f64>, K4Error> {
        Ok(None)
    }

    /// Establish the connection. Brokers return a handshake; stores `None`.
    async fn connect(&mut self) -> Result<Option<Handshake>, ConnectError>;

    /// Publish a batch in order.
    ///
    /// Per-record failures are logged and counted in the report. `Err` means
    /// the whole batch failed in a single round trip.
    async fn publish_batch(&mut self, batch: Vec<Routed>) -> Result<BatchReport, K4Error>;

    /// Flush and release the connection.
    async fn close(&mut self) -> Result<(), K4Error>;
}
