//! Writer registry: builds a validated [`Writer`] from a sink config entry.

use k4_core::config::{BackendConfig, SinkConfig};
use k4_core::error::K4Error;
use tracing::{info, warn};

use crate::adapter::SinkAdapter;
use crate::template::{Purpose, TemplateEngine};
use crate::validate::{validate_shaping, validate_template};
use crate::writer::Writer;

/// Validate templates and shaping, then attach the configured backend.
///
/// Every failure here is an operator mistake and is fatal.
pub fn create_writer(config: &SinkConfig) -> Result<Writer, K4Error> {
    let label = config.label();
    let kind = config.kind;
    let backend = config.backend.type_name();

    let mut engine = TemplateEngine::new(kind);
    if let Some(topic) = non_empty(&config.topic) {
        if matches!(config.backend, BackendConfig::Kafka(_)) {
            engine = engine.with_template(validate_template(kind, Purpose::Topic, topic)?);
        } else {
            warn!("[{label}] topic template '{topic}' ignored by {backend} sinks");
        }
    }
    if let Some(key) = non_empty(&config.key) {
        engine = engine.with_template(validate_template(kind, Purpose::Key, key)?);
    }

    let shaping = match config.shaping_pairs()? {
        Some(pairs) => Some(validate_shaping(kind, pairs)?),
        None => None,
    };

    let adapter = build_adapter(&label, config)?;
    info!(
        "[{label}] writer created (kind={kind}, backend={backend}, shaping={})",
        shaping.as_ref().map_or(0, |s| s.pairs().len())
    );
    Ok(Writer::new(label, engine, shaping, adapter).with_retry_delay(config.retry_delay()))
}

fn non_empty(template: &Option<String>) -> Option<&str> {
    template.as_deref().filter(|t| !t.is_empty())
}

#[cfg_attr(not(any(feature = "kafka", feature = "redis")), allow(unused_variables))]
fn build_adapter(label: &str, config: &SinkConfig) -> Result<Box<dyn SinkAdapter>, K4Error> {
    match &config.backend {
        #[cfg(feature = "kafka")]
        BackendConfig::Kafka(k) => {
            use crate::kafka::{KafkaAdapter, RdKafkaClient};
            let client = RdKafkaClient::new(label, k.producer.clone());
            Ok(Box::new(
                KafkaAdapter::new(label, config.kind, client).with_request_timeout_ms(k.request_timeout_ms()),
            ))
        }
        #[cfg(feature = "redis")]
        BackendConfig::RedisZset(z) => {
            use crate::redis::{RedisClient, ZsetAdapter};
            let client = RedisClient::new(z.addr.url());
            Ok(Box::new(ZsetAdapter::new(label, config.kind, client, z.score_key.clone())))
        }
        #[cfg(feature = "redis")]
        BackendConfig::RedisStream(s) => {
            use crate::redis::{RedisClient, StreamAdapter};
            let client = RedisClient::new(s.addr.url());
            Ok(Box::new(StreamAdapter::new(label, client, s.none_to.clone())))
        }
        #[allow(unreachable_patterns)]
        other => {
            let feature = match other {
                BackendConfig::Kafka(_) => "kafka",
                _ => "redis",
            };
            Err(K4Error::Config(format!(
                "sink type '{}' requires the `{feature}` feature",
                other.type_name()
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sink(json: &str) -> SinkConfig {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn invalid_template_is_rejected() {
        let cfg = sink(r#"{ "type": "kafka", "kind": "ticker", "topic": "ticker-SIDE" }"#);
        assert!(matches!(create_writer(&cfg), Err(K4Error::InvalidTemplate { .. })));

        let cfg = sink(r#"{ "type": "redis_zset", "kind": "balances", "key": "balances-symbol" }"#);
        assert!(matches!(create_writer(&cfg), Err(K4Error::InvalidTemplate { purpose: "key", .. })));
    }

    #[test]
    fn invalid_shaping_is_rejected() {
        let cfg = sink(r#"{ "type": "redis_stream", "kind": "funding", "data_targets": { "side": "s" } }"#);
        assert!(matches!(create_writer(&cfg), Err(K4Error::InvalidShapingKey { ref field, .. }) if field == "side"));
    }

    #[cfg(not(feature = "kafka"))]
    #[test]
    fn missing_backend_feature_is_a_config_error() {
        let cfg = sink(r#"{ "type": "kafka", "kind": "trades", "topic": "" }"#);
        let Err(K4Error::Config(msg)) = create_writer(&cfg) else { panic!("expected config error") };
        assert!(msg.contains("`kafka`"));
    }

    #[cfg(feature = "redis")]
    #[test]
    fn builds_store_writers() {
        let cfg = sink(
            r#"{ "type": "redis_zset", "kind": "trades", "name": "z", "topic": "ignored", "key": "exchange-symbol",
                 "retry_delay_secs": 1 }"#,
        );
        let w = create_writer(&cfg).unwrap();
        assert_eq!(w.label(), "z");
        assert_eq!(w.engine().template(Purpose::Topic), None);
        assert_eq!(w.engine().template(Purpose::Key), Some("exchange-symbol"));

        let cfg = sink(r#"{ "type": "redis_stream", "kind": "book", "data_targets": { "book": "b" } }"#);
        assert_eq!(create_writer(&cfg).unwrap().label(), "book-redis_stream");
    }
}
