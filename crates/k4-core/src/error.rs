//! Typed error definitions for the K4 sink writers.
//!
//! Provides [`K4Error`] for domain-specific errors that are more informative
//! than plain `anyhow::Error` strings. Variants fall into two groups: fatal
//! configuration errors, which stop a writer (and the process), and per-record
//! or per-batch errors, which are logged and skipped.

use thiserror::Error;

use crate::types::MessageKind;

/// Domain-specific errors for the K4 sink writers.
#[derive(Debug, Error)]
pub enum K4Error {
    /// Configuration parsing or validation error.
    #[error("config error: {0}")]
    Config(String),

    /// A template references a token that the message kind does not carry.
    #[error("{kind} {purpose} invalid: {kind} data has no '{token}' data")]
    InvalidTemplate {
        kind: MessageKind,
        purpose: &'static str,
        token: String,
    },

    /// A shaping spec names a source field outside the kind's schema.
    #[error("'data_targets' check failed: '{field}' is not a valid attribute for '{kind}' data")]
    InvalidShapingKey { kind: MessageKind, field: String },

    /// A record lacks a field its routing template needs.
    #[error("{purpose} template '{template}' includes the '{field}' keyword but this {kind} record has no '{field}' value")]
    MissingRoutingField {
        kind: MessageKind,
        purpose: &'static str,
        template: String,
        field: String,
    },

    /// A record lacks a field required for shaping or scoring.
    #[error("record has no usable '{0}' field")]
    MissingField(String),

    /// Record serialization failure.
    #[error("codec error: {0}")]
    Codec(String),

    /// Connection setup failure with the external system.
    #[error("connect error: {0}")]
    Connect(String),

    /// Pipelined round trip to a store failed as a whole.
    #[error("store error: {0}")]
    Store(String),
}

impl K4Error {
    /// Whether this error must stop the writer.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Config(_)
                | Self::InvalidTemplate { .. }
                | Self::InvalidShapingKey { .. }
                | Self::MissingRoutingField { .. }
                | Self::Connect(_)
        )
    }
}

impl From<serde_json::Error> for K4Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Codec(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_kind_and_field() {
        let e = K4Error::InvalidTemplate {
            kind: MessageKind::Ticker,
            purpose: "topic",
            token: "side".into(),
        };
        assert_eq!(e.to_string(), "ticker topic invalid: ticker data has no 'side' data");

        let e = K4Error::InvalidShapingKey { kind: MessageKind::Balances, field: "price".into() };
        assert!(e.to_string().contains("'price' is not a valid attribute for 'balances'"));
    }

    #[test]
    fn fatal_classification() {
        assert!(K4Error::Config("x".into()).is_fatal());
        assert!(!K4Error::MissingField("price".into()).is_fatal());
        assert!(!K4Error::Store("down".into()).is_fatal());
        assert!(!K4Error::Codec("bad".into()).is_fatal());
    }
}
