//! Broker sink: one acknowledged message per record.
//!
//! The topic comes from the topic template, the message key from the key
//! template (or the channel name). Payloads go through a [`RecordSerializer`];
//! keys are sent as UTF-8.
//!
//! A failed acknowledgment drops that record only. Timeouts and not-ready
//! nodes are logged at error level, anything else at warn.

#[cfg(feature = "kafka")]
mod client;

#[cfg(feature = "kafka")]
pub use client::RdKafkaClient;

use async_trait::async_trait;
use futures_util::future::join_all;
use k4_core::error::K4Error;
use k4_core::types::{MessageKind, Record};
use tracing::{error, info, warn};

use crate::adapter::{BatchReport, Routed, SinkAdapter};
use crate::client::{BrokerClient, ConnectError, Handshake, SendError};
use crate::codec::{JsonSerializer, RecordSerializer};
use crate::template::Purpose;

/// Chooses an explicit partition for a (shaped) record. `None` leaves the
/// choice to the producer.
pub type Partitioner = Box<dyn Fn(&Record) -> Option<i32> + Send + Sync>;

pub struct KafkaAdapter<C: BrokerClient> {
    label: String,
    kind: MessageKind,
    client: C,
    serializer: Box<dyn RecordSerializer>,
    partitioner: Option<Partitioner>,
    request_timeout_ms: Option<u64>,
}

impl<C: BrokerClient> KafkaAdapter<C> {
    pub fn new(label: impl Into<String>, kind: MessageKind, client: C) -> Self {
        Self {
            label: label.into(),
            kind,
            client,
            serializer: Box::new(JsonSerializer),
            partitioner: None,
            request_timeout_ms: None,
        }
    }

    pub fn with_serializer(mut self, serializer: Box<dyn RecordSerializer>) -> Self {
        self.serializer = serializer;
        self
    }

    pub fn with_partitioner(mut self, partitioner: Partitioner) -> Self {
        self.partitioner = Some(partitioner);
        self
    }

    pub fn with_request_timeout_ms(mut self, ms: Option<u64>) -> Self {
        self.request_timeout_ms = ms;
        self
    }

    fn log_send_error(&self, topic: &str, err: &SendError) {
        let label = &self.label;
        match err {
            SendError::TimedOut => match self.request_timeout_ms {
                Some(ms) => error!(
                    "[{label}] no response from server within {ms} ms, message to '{topic}' may not have been delivered"
                ),
                None => error!("[{label}] request timed out, message to '{topic}' may not have been delivered"),
            },
            SendError::NodeNotReady => error!("[{label}] node not ready, message to '{topic}' dropped"),
            SendError::Other(msg) => warn!("[{label}] send to '{topic}' failed: {msg}"),
        }
    }
}

#[async_trait]
impl<C: BrokerClient> SinkAdapter for KafkaAdapter<C> {
    fn backend(&self) -> &'static str {
        "kafka"
    }

    fn destination(&self) -> Purpose {
        Purpose::Topic
    }

    fn message_key(&self) -> Option<Purpose> {
        Some(Purpose::Key)
    }

    async fn connect(&mut self) -> Result<Option<Handshake>, ConnectError> {
        let hs = self.client.connect().await?;
        info!(
            "[{}] \"{}\" connected to cluster containing {} broker(s) for {}",
            self.label, hs.client_id, hs.brokers, self.kind
        );
        Ok(Some(hs))
    }

    async fn publish_batch(&mut self, batch: Vec<Routed>) -> Result<BatchReport, K4Error> {
        let mut report = BatchReport::default();
        let mut topics = Vec::with_capacity(batch.len());
        let mut sends = Vec::with_capacity(batch.len());

        for routed in batch {
            let value = match self.serializer.serialize(&routed.record) {
                Ok(v) => v,
                Err(e) => {
                    warn!("[{}] dropping record for '{}': {e}", self.label, routed.destination);
                    report.dropped += 1;
                    continue;
                }
            };
            let partition = self.partitioner.as_ref().and_then(|p| p(&routed.record));
            let key = routed.key.unwrap_or_else(|| self.kind.channel_name().to_owned()).into_bytes();
            topics.push(routed.destination);
            sends.push((value, key, partition));
        }

        let client = &self.client;
        let acks = join_all(
            topics
                .iter()
                .zip(sends)
                .map(|(topic, (value, key, partition))| client.send(topic, value, key, partition)),
        )
        .await;

        for (topic, ack) in topics.iter().zip(acks) {
            match ack {
                Ok(()) => report.published += 1,
                Err(e) => {
                    self.log_send_error(topic, &e);
                    report.dropped += 1;
                }
            }
        }
        Ok(report)
    }

    async fn close(&mut self) -> Result<(), K4Error> {
        self.client.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Event, FakeBroker, sent};
    use serde_json::json;

    fn routed(topic: &str, key: Option<&str>, v: serde_json::Value) -> Routed {
        Routed {
            destination: topic.to_string(),
            key: key.map(str::to_string),
            score: None,
            record: Record::try_from(v).unwrap(),
        }
    }

    struct FailingSerializer;

    impl RecordSerializer for FailingSerializer {
        fn serialize(&self, record: &Record) -> Result<Vec<u8>, K4Error> {
            if record.contains("bad") {
                return Err(K4Error::Codec("unsupported value".into()));
            }
            JsonSerializer.serialize(record)
        }
    }

    #[tokio::test]
    async fn publishes_in_order_with_keys() {
        let (broker, journal) = FakeBroker::new();
        let mut adapter = KafkaAdapter::new("t", MessageKind::Trades, broker);
        let hs = adapter.connect().await.unwrap().unwrap();
        assert_eq!(hs.brokers, 3);

        let report = adapter
            .publish_batch(vec![
                routed("T-BTC", Some("k1"), json!({"n": 1})),
                routed("T-ETH", None, json!({"n": 2})),
            ])
            .await
            .unwrap();
        assert_eq!(report, BatchReport { published: 2, dropped: 0 });

        let out = sent(&journal);
        assert_eq!(out[0], ("T-BTC".to_string(), json!({"n": 1}), "k1".to_string()));
        assert_eq!(out[1], ("T-ETH".to_string(), json!({"n": 2}), "trades".to_string()));
    }

    #[tokio::test]
    async fn one_failed_ack_drops_only_that_record() {
        let (broker, journal) = FakeBroker::new();
        let broker = broker.fail(2, SendError::TimedOut);
        let mut adapter = KafkaAdapter::new("t", MessageKind::Trades, broker).with_request_timeout_ms(Some(40_000));

        let batch = (0..5).map(|i| routed("topic", Some("k"), json!({"n": i}))).collect();
        let report = adapter.publish_batch(batch).await.unwrap();
        assert_eq!(report, BatchReport { published: 4, dropped: 1 });

        let ns: Vec<_> = sent(&journal).into_iter().map(|(_, v, _)| v["n"].clone()).collect();
        assert_eq!(ns, [json!(0), json!(1), json!(3), json!(4)]);
    }

    #[tokio::test]
    async fn every_send_error_class_is_isolated() {
        let (broker, _journal) = FakeBroker::new();
        let broker = broker
            .fail(0, SendError::NodeNotReady)
            .fail(1, SendError::Other("message too large".into()));
        let mut adapter = KafkaAdapter::new("t", MessageKind::Ticker, broker);
        let batch = (0..3).map(|i| routed("topic", None, json!({"n": i}))).collect();
        let report = adapter.publish_batch(batch).await.unwrap();
        assert_eq!(report, BatchReport { published: 1, dropped: 2 });
    }

    #[tokio::test]
    async fn serializer_failure_drops_record() {
        let (broker, journal) = FakeBroker::new();
        let mut adapter =
            KafkaAdapter::new("t", MessageKind::Trades, broker).with_serializer(Box::new(FailingSerializer));
        let report = adapter
            .publish_batch(vec![
                routed("topic", None, json!({"bad": true})),
                routed("topic", None, json!({"ok": true})),
            ])
            .await
            .unwrap();
        assert_eq!(report, BatchReport { published: 1, dropped: 1 });
        assert_eq!(sent(&journal).len(), 1);
    }

    #[tokio::test]
    async fn partitioner_sees_payload() {
        let (broker, journal) = FakeBroker::new();
        let mut adapter = KafkaAdapter::new("t", MessageKind::Trades, broker)
            .with_partitioner(Box::new(|r: &Record| r.number("p").map(|p| p as i32)));
        adapter
            .publish_batch(vec![routed("topic", None, json!({"p": 7})), routed("topic", None, json!({}))])
            .await
            .unwrap();

        let partitions: Vec<_> = journal
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                Event::Send { partition, .. } => Some(*partition),
                _ => None,
            })
            .collect();
        assert_eq!(partitions, [Some(7), None]);
    }

    #[tokio::test]
    async fn close_reaches_client() {
        let (broker, journal) = FakeBroker::new();
        let mut adapter = KafkaAdapter::new("t", MessageKind::Trades, broker);
        adapter.close().await.unwrap();
        assert_eq!(journal.lock().unwrap().last(), Some(&Event::Close));
    }
}
