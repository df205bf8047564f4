use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use k4_core::error::K4Error;
use rdkafka::ClientConfig;
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use tracing::info;

use crate::client::{BrokerClient, ConnectError, Handshake, SendError};

const METADATA_TIMEOUT: Duration = Duration::from_secs(10);
const QUEUE_TIMEOUT: Duration = Duration::from_secs(5);
const FLUSH_TIMEOUT: Duration = Duration::from_secs(30);

/// librdkafka-backed producer.
pub struct RdKafkaClient {
    label: String,
    properties: BTreeMap<String, String>,
    producer: Option<FutureProducer>,
}

impl RdKafkaClient {
    pub fn new(label: impl Into<String>, properties: BTreeMap<String, String>) -> Self {
        Self { label: label.into(), properties, producer: None }
    }

    fn client_id(&self) -> String {
        self.properties.get("client.id").cloned().unwrap_or_else(|| "rdkafka".to_owned())
    }

    fn create(&self) -> Result<FutureProducer, ConnectError> {
        let keys: Vec<&str> = self.properties.keys().map(String::as_str).collect();
        info!("[{}] configuring producer with: {}", self.label, keys.join(", "));

        let mut config = ClientConfig::new();
        for (k, v) in &self.properties {
            config.set(k, v);
        }
        config.create().map_err(|e| ConnectError::Config(e.to_string()))
    }
}

/// Map a delivery failure onto the classes the writer reports.
fn classify(err: &KafkaError) -> SendError {
    match err.rdkafka_error_code() {
        Some(RDKafkaErrorCode::MessageTimedOut | RDKafkaErrorCode::RequestTimedOut) => SendError::TimedOut,
        Some(
            RDKafkaErrorCode::BrokerNotAvailable
            | RDKafkaErrorCode::LeaderNotAvailable
            | RDKafkaErrorCode::NotLeaderForPartition
            | RDKafkaErrorCode::AllBrokersDown,
        ) => SendError::NodeNotReady,
        _ => SendError::Other(err.to_string()),
    }
}

#[async_trait]
impl BrokerClient for RdKafkaClient {
    async fn connect(&mut self) -> Result<Handshake, ConnectError> {
        let producer = match &self.producer {
            Some(p) => p.clone(),
            None => {
                let p = self.create()?;
                self.producer = Some(p.clone());
                p
            }
        };

        // Metadata requests block inside librdkafka.
        let brokers = tokio::task::spawn_blocking(move || {
            producer
                .client()
                .fetch_metadata(None, METADATA_TIMEOUT)
                .map(|m| m.brokers().len())
        })
        .await
        .map_err(|e| ConnectError::Unavailable(e.to_string()))?
        .map_err(|e| ConnectError::Unavailable(format!("unable to bootstrap from host(s): {e}")))?;

        if brokers == 0 {
            return Err(ConnectError::Unavailable("cluster reported no brokers".into()));
        }
        Ok(Handshake { client_id: self.client_id(), brokers })
    }

    async fn send(
        &self,
        topic: &str,
        value: Vec<u8>,
        key: Vec<u8>,
        partition: Option<i32>,
    ) -> Result<(), SendError> {
        let Some(producer) = &self.producer else {
            return Err(SendError::Other("producer not connected".into()));
        };
        let mut record = FutureRecord::to(topic).payload(&value).key(&key);
        if let Some(p) = partition {
            record = record.partition(p);
        }
        producer
            .send(record, QUEUE_TIMEOUT)
            .await
            .map(|_| ())
            .map_err(|(e, _)| classify(&e))
    }

    async fn close(&mut self) -> Result<(), K4Error> {
        let Some(producer) = self.producer.take() else {
            return Ok(());
        };
        tokio::task::spawn_blocking(move || producer.flush(FLUSH_TIMEOUT))
            .await
            .map_err(|e| K4Error::Store(e.to_string()))?
            .map_err(|e| K4Error::Store(format!("flush failed: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_classes() {
        let timed_out = KafkaError::MessageProduction(RDKafkaErrorCode::MessageTimedOut);
        assert_eq!(classify(&timed_out), SendError::TimedOut);

        let not_ready = KafkaError::MessageProduction(RDKafkaErrorCode::LeaderNotAvailable);
        assert_eq!(classify(&not_ready), SendError::NodeNotReady);

        let other = KafkaError::MessageProduction(RDKafkaErrorCode::MessageSizeTooLarge);
        assert!(matches!(classify(&other), SendError::Other(_)));
    }

    #[test]
    fn unknown_property_is_a_config_error() {
        let mut props = BTreeMap::new();
        props.insert("bootstrap_servers".to_owned(), "127.0.0.1:9092".to_owned());
        let client = RdKafkaClient::new("t", props);
        assert!(matches!(client.create(), Err(ConnectError::Config(_))));
    }
}
