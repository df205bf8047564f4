//! Configuration parsing for the sink writers.
//!
//! One JSON file describes logging and a `sinks` array; each entry attaches
//! one writer of one message kind to one external system.
//!
//! # Example config
//!
//! ```json
//! {
//!   "log": { "level": "info", "dir": "/tmp/log" },
//!   "sinks": [
//!     {
//!       "type": "kafka",
//!       "kind": "trades",
//!       "topic": "Exchange-CHANNEL-SYMBOL",
//!       "key": "cryptofeed-symbol-side",
//!       "producer": { "bootstrap.servers": "127.0.0.1:9092", "acks": "1" }
//!     },
//!     {
//!       "type": "redis_zset",
//!       "kind": "book",
//!       "key": "exchange-channel-symbol",
//!       "data_targets": { "book": "b", "timestamp": "ts" }
//!     }
//!   ]
//! }
//! ```

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::K4Error;
use crate::logging::LogConfig;
use crate::types::MessageKind;

const DEFAULT_QUEUE_CAPACITY: usize = 8192;
const DEFAULT_RETRY_DELAY_SECS: u64 = 10;
const DEFAULT_REDIS_HOST: &str = "127.0.0.1";
const DEFAULT_REDIS_PORT: u16 = 6379;

/// Top-level application config, deserialized from a JSON file.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub log: LogConfig,

    /// One entry per writer instance.
    pub sinks: Vec<SinkConfig>,
}

/// A single sink writer configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SinkConfig {
    /// Message kind this writer publishes.
    pub kind: MessageKind,

    /// Label used in log lines (default: `"<kind>-<backend>"`).
    pub name: Option<String>,

    /// Topic template (broker sinks).
    pub topic: Option<String>,

    /// Key template: message key for brokers, set/stream name for stores.
    pub key: Option<String>,

    /// Ordered `source -> destination` field remapping.
    pub data_targets: Option<Map<String, Value>>,

    /// Capacity of the internal queue feeding this writer.
    pub queue_capacity: Option<usize>,

    /// Fixed delay between connection attempts.
    pub retry_delay_secs: Option<u64>,

    /// Backend-specific settings.
    #[serde(flatten)]
    pub backend: BackendConfig,
}

impl SinkConfig {
    /// Label used in log lines.
    pub fn label(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("{}-{}", self.kind, self.backend.type_name()))
    }

    pub fn effective_queue_capacity(&self) -> usize {
        self.queue_capacity.unwrap_or(DEFAULT_QUEUE_CAPACITY).max(1)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs.unwrap_or(DEFAULT_RETRY_DELAY_SECS))
    }

    /// `data_targets` as ordered `(source, destination)` pairs.
    ///
    /// Destinations must be strings; anything else is a configuration error.
    pub fn shaping_pairs(&self) -> Result<Option<Vec<(String, String)>>, K4Error> {
        let Some(targets) = &self.data_targets else {
            return Ok(None);
        };
        targets
            .iter()
            .map(|(src, dst)| match dst {
                Value::String(d) => Ok((src.clone(), d.clone())),
                other => Err(K4Error::Config(format!(
                    "data_targets['{src}'] must be a string label, got {other}"
                ))),
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Some)
    }
}

/// Backend selection, tagged by `"type"`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BackendConfig {
    Kafka(KafkaConfig),
    RedisZset(RedisZsetConfig),
    RedisStream(RedisStreamConfig),
}

impl BackendConfig {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Kafka(_) => "kafka",
            Self::RedisZset(_) => "redis_zset",
            Self::RedisStream(_) => "redis_stream",
        }
    }
}

/// Broker producer settings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct KafkaConfig {
    /// Pass-through producer client properties.
    #[serde(default)]
    pub producer: BTreeMap<String, String>,
}

impl KafkaConfig {
    /// Request timeout reported in timeout log lines.
    pub fn request_timeout_ms(&self) -> Option<u64> {
        self.producer
            .get("request.timeout.ms")
            .or_else(|| self.producer.get("message.timeout.ms"))
            .and_then(|v| v.parse().ok())
    }
}

/// Address of a Redis-compatible store.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RedisAddr {
    pub host: Option<String>,
    pub port: Option<u16>,
    /// Unix socket path; overrides host and port.
    pub socket: Option<String>,
}

impl RedisAddr {
    pub fn url(&self) -> String {
        match &self.socket {
            Some(path) => format!("unix://{path}"),
            None => format!(
                "redis://{}:{}",
                self.host.as_deref().unwrap_or(DEFAULT_REDIS_HOST),
                self.port.unwrap_or(DEFAULT_REDIS_PORT)
            ),
        }
    }
}

/// Sorted-set store settings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RedisZsetConfig {
    #[serde(flatten)]
    pub addr: RedisAddr,
    /// Numeric field used as the member score.
    pub score_key: Option<String>,
}

/// Append-log (stream) store settings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RedisStreamConfig {
    #[serde(flatten)]
    pub addr: RedisAddr,
    /// Replacement text for null fields.
    pub none_to: Option<String>,
}

/// Load and parse a JSON config file.
pub fn load_config(path: &std::path::Path) -> anyhow::Result<AppConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: AppConfig = serde_json::from_str(&content)?;
    Ok(config)
}
