//! Record serialization for the wire.

use k4_core::error::K4Error;
use k4_core::types::Record;
use serde_json::Value;

/// Turns a record into the bytes published to a sink.
pub trait RecordSerializer: Send + Sync {
    fn serialize(&self, record: &Record) -> Result<Vec<u8>, K4Error>;
}

/// Compact JSON, the default encoding.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl RecordSerializer for JsonSerializer {
    fn serialize(&self, record: &Record) -> Result<Vec<u8>, K4Error> {
        Ok(serde_json::to_vec(record)?)
    }
}

/// Flatten a record into `(field, text)` pairs for an append-only log.
///
/// Nested objects and arrays (e.g. `book`, `delta`) become compact JSON,
/// scalars their display form, nulls `none_to`.
pub fn flatten_fields(record: &Record, none_to: &str) -> Vec<(String, String)> {
    record
        .iter()
        .map(|(field, value)| {
            let text = match value {
                Value::String(s) => s.clone(),
                Value::Null => none_to.to_owned(),
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                nested @ (Value::Array(_) | Value::Object(_)) => nested.to_string(),
            };
            (field.to_owned(), text)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_is_compact_and_ordered() {
        let r = Record::try_from(json!({"symbol": "BTC-USD", "price": 1.5, "raw": null})).unwrap();
        let bytes = JsonSerializer.serialize(&r).unwrap();
        assert_eq!(bytes, br#"{"symbol":"BTC-USD","price":1.5,"raw":null}"#);
    }

    #[test]
    fn flattening_stringifies_nested_values() {
        let r = Record::try_from(json!({
            "symbol": "BTC-USD",
            "book": {"bid": [[1.0, 2.0]]},
            "closed": true,
            "sequence_number": 7,
            "checksum": null,
        }))
        .unwrap();
        let fields = flatten_fields(&r, "None");
        assert_eq!(
            fields,
            vec![
                ("symbol".to_string(), "BTC-USD".to_string()),
                ("book".to_string(), r#"{"bid":[[1.0,2.0]]}"#.to_string()),
                ("closed".to_string(), "true".to_string()),
                ("sequence_number".to_string(), "7".to_string()),
                ("checksum".to_string(), "None".to_string()),
            ]
        );
    }
}
