//! Store sinks: sorted sets and append-only logs.
//!
//! Both adapters collect one batch into a single non-transactional pipeline
//! and send it in one round trip. A failed round trip loses that batch and
//! nothing else; the writer keeps going with the next one.

#[cfg(feature = "redis")]
mod client;

#[cfg(feature = "redis")]
pub use client::RedisClient;

use async_trait::async_trait;
use k4_core::error::K4Error;
use k4_core::types::{MessageKind, Record};
use tracing::{info, warn};

use crate::adapter::{BatchReport, Routed, SinkAdapter};
use crate::client::{ConnectError, Handshake, Pipeline, StoreClient};
use crate::codec::{JsonSerializer, RecordSerializer, flatten_fields};
use crate::template::Purpose;

pub const DEFAULT_NONE_TO: &str = "None";

async fn run_pipeline<C: StoreClient>(
    client: &mut C,
    pipeline: Pipeline,
    dropped: usize,
) -> Result<BatchReport, K4Error> {
    if pipeline.is_empty() {
        return Ok(BatchReport { published: 0, dropped });
    }
    let published = pipeline.len();
    client.execute(pipeline).await?;
    Ok(BatchReport { published, dropped })
}

// ---------------------------------------------------------------------------
// Sorted set
// ---------------------------------------------------------------------------

/// Adds each record to a sorted set, scored by one of its numeric fields.
///
/// Members are never overwritten: re-adding an identical payload keeps the
/// original score.
pub struct ZsetAdapter<C: StoreClient> {
    label: String,
    client: C,
    serializer: Box<dyn RecordSerializer>,
    score_key: String,
}

impl<C: StoreClient> ZsetAdapter<C> {
    /// `score_key` defaults to the kind's natural score field.
    pub fn new(label: impl Into<String>, kind: MessageKind, client: C, score_key: Option<String>) -> Self {
        Self {
            label: label.into(),
            client,
            serializer: Box::new(JsonSerializer),
            score_key: score_key.unwrap_or_else(|| kind.default_score_field().to_owned()),
        }
    }

    pub fn with_serializer(mut self, serializer: Box<dyn RecordSerializer>) -> Self {
        self.serializer = serializer;
        self
    }

    pub fn score_key(&self) -> &str {
        &self.score_key
    }
}

#[async_trait]
impl<C: StoreClient> SinkAdapter for ZsetAdapter<C> {
    fn backend(&self) -> &'static str {
        "redis_zset"
    }

    fn destination(&self) -> Purpose {
        Purpose::Key
    }

    fn score(&self, record: &Record) -> Result<Option<f64>, K4Error> {
        record
            .number(&self.score_key)
            .map(Some)
            .ok_or_else(|| K4Error::MissingField(self.score_key.clone()))
    }

    async fn connect(&mut self) -> Result<Option<Handshake>, ConnectError> {
        self.client.connect().await?;
        info!("[{}] sorted-set writer ready (score: {})", self.label, self.score_key);
        Ok(None)
    }

    async fn publish_batch(&mut self, batch: Vec<Routed>) -> Result<BatchReport, K4Error> {
        let mut pipeline = Pipeline::new();
        let mut dropped = 0;
        for routed in batch {
            let Some(score) = routed.score else {
                warn!("[{}] record for '{}' has no score, dropped", self.label, routed.destination);
                dropped += 1;
                continue;
            };
            match self.serializer.serialize(&routed.record) {
                Ok(member) => {
                    pipeline.add_sorted(routed.destination, member, score);
                }
                Err(e) => {
                    warn!("[{}] dropping record for '{}': {e}", self.label, routed.destination);
                    dropped += 1;
                }
            }
        }
        run_pipeline(&mut self.client, pipeline, dropped).await
    }

    async fn close(&mut self) -> Result<(), K4Error> {
        self.client.close().await
    }
}

// ---------------------------------------------------------------------------
// Append log
// ---------------------------------------------------------------------------

/// Appends each record as a flat field/value entry.
pub struct StreamAdapter<C: StoreClient> {
    label: String,
    client: C,
    none_to: String,
}

impl<C: StoreClient> StreamAdapter<C> {
    pub fn new(label: impl Into<String>, client: C, none_to: Option<String>) -> Self {
        Self {
            label: label.into(),
            client,
            none_to: none_to.unwrap_or_else(|| DEFAULT_NONE_TO.to_owned()),
        }
    }
}

#[async_trait]
impl<C: StoreClient> SinkAdapter for StreamAdapter<C> {
    fn backend(&self) -> &'static str {
        "redis_stream"
    }

    fn destination(&self) -> Purpose {
        Purpose::Key
    }

    async fn connect(&mut self) -> Result<Option<Handshake>, ConnectError> {
        self.client.connect().await?;
        info!("[{}] stream writer ready", self.label);
        Ok(None)
    }

    async fn publish_batch(&mut self, batch: Vec<Routed>) -> Result<BatchReport, K4Error> {
        let mut pipeline = Pipeline::new();
        let mut dropped = 0;
        for routed in batch {
            let fields = flatten_fields(&routed.record, &self.none_to);
            // Empty entries are rejected by the store.
            if fields.is_empty() {
                dropped += 1;
                continue;
            }
            pipeline.append_log(routed.destination, fields);
        }
        run_pipeline(&mut self.client, pipeline, dropped).await
    }

    async fn close(&mut self) -> Result<(), K4Error> {
        self.client.close().await
    }
}
