//! Message kinds and their static field schemas.
//!
//! Every record that reaches a sink belongs to exactly one [`MessageKind`].
//! Each kind carries a fixed [`Schema`] splitting its fields into
//! *string-valued* fields (usable as template tokens) and *other* fields
//! (usable only when re-shaping the published payload).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::K4Error;

// ---------------------------------------------------------------------------
// Template vocabularies
// ---------------------------------------------------------------------------

/// Tokens whose value is constant for a sink instance.
pub const STATIC_TOKENS: [&str; 2] = ["exchange", "channel"];

/// Tokens substituted per record from string-valued fields.
pub const DYNAMIC_TOKENS: [&str; 10] = [
    "symbol",
    "side",
    "type",
    "status",
    "interval",
    "client_order_id",
    "account",
    "currency",
    "order_id",
    "liquidity",
];

// ---------------------------------------------------------------------------
// Schema
// ---------------------------------------------------------------------------

/// Field partition for one message kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schema {
    /// String-valued fields, eligible for template substitution.
    pub strings: &'static [&'static str],
    /// Every other field, eligible for data shaping only.
    pub others: &'static [&'static str],
}

impl Schema {
    /// Whether `field` is a string-valued field of this schema.
    #[inline]
    pub fn is_string_field(&self, field: &str) -> bool {
        self.strings.contains(&field)
    }

    /// Whether `field` belongs to this schema at all.
    #[inline]
    pub fn contains(&self, field: &str) -> bool {
        self.is_string_field(field) || self.others.contains(&field)
    }
}

const TRADES: Schema = Schema {
    strings: &["exchange", "symbol", "side", "id", "type"],
    others: &["price", "amount", "timestamp", "raw"],
};

const FUNDING: Schema = Schema {
    strings: &["exchange", "symbol"],
    others: &["mark_price", "rate", "next_funding_time", "predicted_rate", "timestamp", "raw"],
};

const BOOK: Schema = Schema {
    strings: &["exchange", "symbol"],
    others: &["book", "delta", "sequence_number", "checksum", "timestamp", "raw"],
};

const TICKER: Schema = Schema {
    strings: &["exchange", "symbol"],
    others: &["bid", "ask", "timestamp", "raw"],
};

const OPEN_INTEREST: Schema = Schema {
    strings: &["exchange", "symbol"],
    others: &["open_interest", "timestamp", "raw"],
};

const LIQUIDATIONS: Schema = Schema {
    strings: &["exchange", "symbol", "side", "id", "status"],
    others: &["quantity", "price", "timestamp", "raw"],
};

const CANDLES: Schema = Schema {
    strings: &["exchange", "symbol", "interval"],
    others: &[
        "start", "stop", "trades", "open", "close", "high", "low", "volume", "closed", "timestamp", "raw",
    ],
};

const ORDER_INFO: Schema = Schema {
    strings: &["exchange", "symbol", "id", "client_order_id", "side", "status", "type", "account"],
    others: &["price", "amount", "remaining", "timestamp", "raw"],
};

const TRANSACTIONS: Schema = Schema {
    strings: &["exchange", "currency", "type", "status"],
    others: &["amount", "timestamp", "raw"],
};

const BALANCES: Schema = Schema {
    strings: &["exchange", "currency"],
    others: &["balance", "reserved", "raw"],
};

const FILLS: Schema = Schema {
    strings: &["exchange", "symbol", "side", "id", "order_id", "liquidity", "type", "account"],
    others: &["price", "amount", "fee", "timestamp", "raw"],
};

// ---------------------------------------------------------------------------
// MessageKind
// ---------------------------------------------------------------------------

/// Category of a normalized market-data record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Trades,
    Funding,
    Book,
    Ticker,
    OpenInterest,
    Liquidations,
    Candles,
    OrderInfo,
    Transactions,
    Balances,
    Fills,
}

impl MessageKind {
    pub const ALL: [MessageKind; 11] = [
        Self::Trades,
        Self::Funding,
        Self::Book,
        Self::Ticker,
        Self::OpenInterest,
        Self::Liquidations,
        Self::Candles,
        Self::OrderInfo,
        Self::Transactions,
        Self::Balances,
        Self::Fills,
    ];

    /// Channel name, used as the default topic/key and for the `channel` token.
    pub fn channel_name(self) -> &'static str {
        match self {
            Self::Trades => "trades",
            Self::Funding => "funding",
            Self::Book => "book",
            Self::Ticker => "ticker",
            Self::OpenInterest => "open_interest",
            Self::Liquidations => "liquidations",
            Self::Candles => "candles",
            Self::OrderInfo => "order_info",
            Self::Transactions => "transactions",
            Self::Balances => "balances",
            Self::Fills => "fills",
        }
    }

    /// The static field schema for this kind.
    pub fn schema(self) -> &'static Schema {
        match self {
            Self::Trades => &TRADES,
            Self::Funding => &FUNDING,
            Self::Book => &BOOK,
            Self::Ticker => &TICKER,
            Self::OpenInterest => &OPEN_INTEREST,
            Self::Liquidations => &LIQUIDATIONS,
            Self::Candles => &CANDLES,
            Self::OrderInfo => &ORDER_INFO,
            Self::Transactions => &TRANSACTIONS,
            Self::Balances => &BALANCES,
            Self::Fills => &FILLS,
        }
    }

    /// Default numeric field used to score records in a sorted-set store.
    ///
    /// Book snapshots carry the exchange timestamp only on deltas, so they are
    /// scored by receipt time instead.
    pub fn default_score_field(self) -> &'static str {
        match self {
            Self::Book => "receipt_timestamp",
            _ => "timestamp",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.channel_name())
    }
}

impl FromStr for MessageKind {
    type Err = K4Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.channel_name() == s)
            .ok_or_else(|| K4Error::Config(format!("unknown message kind '{s}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_names_round_trip() {
        for kind in MessageKind::ALL {
            assert_eq!(kind.channel_name().parse::<MessageKind>().unwrap(), kind);
        }
        assert!("orderbook".parse::<MessageKind>().is_err());
    }

    #[test]
    fn serde_uses_channel_names() {
        let kind: MessageKind = serde_json::from_str("\"open_interest\"").unwrap();
        assert_eq!(kind, MessageKind::OpenInterest);
        assert_eq!(serde_json::to_string(&MessageKind::OrderInfo).unwrap(), "\"order_info\"");
    }

    #[test]
    fn schema_membership() {
        let schema = MessageKind::Trades.schema();
        assert!(schema.is_string_field("symbol"));
        assert!(!schema.is_string_field("price"));
        assert!(schema.contains("price"));
        assert!(!schema.contains("status"));
    }

    #[test]
    fn every_schema_has_exchange() {
        for kind in MessageKind::ALL {
            assert!(kind.schema().is_string_field("exchange"), "{kind}");
        }
    }

    #[test]
    fn dynamic_tokens_are_string_fields_somewhere() {
        for token in DYNAMIC_TOKENS {
            assert!(
                MessageKind::ALL.iter().any(|k| k.schema().is_string_field(token)),
                "{token} unused"
            );
        }
    }

    #[test]
    fn book_scores_by_receipt_time() {
        assert_eq!(MessageKind::Book.default_score_field(), "receipt_timestamp");
        assert_eq!(MessageKind::Trades.default_score_field(), "timestamp");
    }
}
