//! Data shaping: select, relabel and reorder record fields.

use k4_core::error::K4Error;
use k4_core::types::Record;

/// Validated `source -> destination` field mapping.
///
/// Only produced by [`crate::validate::validate_shaping`], so every source
/// field is known to belong to the kind's schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShapingSpec {
    pairs: Vec<(String, String)>,
}

impl ShapingSpec {
    pub(crate) fn new(pairs: Vec<(String, String)>) -> Self {
        Self { pairs }
    }

    pub fn pairs(&self) -> &[(String, String)] {
        &self.pairs
    }

    /// Build a new record holding only the mapped fields, in mapping order.
    ///
    /// The input is left untouched. A source field absent from this record
    /// instance yields [`K4Error::MissingField`].
    pub fn shape(&self, record: &Record) -> Result<Record, K4Error> {
        let mut shaped = Record::new();
        for (src, dst) in &self.pairs {
            let value = record.get(src).ok_or_else(|| K4Error::MissingField(src.clone()))?;
            shaped.insert(dst.as_str(), value.clone());
        }
        Ok(shaped)
    }
}
