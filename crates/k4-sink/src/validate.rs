//! Construction-time validation of templates and shaping specs.
//!
//! Both checks run once when a writer is built. Any failure is an operator
//! mistake and is returned as a fatal [`K4Error`].

use k4_core::error::K4Error;
use k4_core::types::MessageKind;
use tracing::error;

use crate::shaper::ShapingSpec;
use crate::template::{DYNAMIC_VOCAB, Purpose, ValidTemplate};

/// Check that every dynamic token in `template` is a string-valued field of
/// `kind`.
///
/// Tokens are recognized in lower, UPPER and Title spellings.
pub fn validate_template(
    kind: MessageKind,
    purpose: Purpose,
    template: &str,
) -> Result<ValidTemplate, K4Error> {
    let schema = kind.schema();
    if let Some(occ) = DYNAMIC_VOCAB.scan(template).into_iter().find(|o| !schema.is_string_field(o.name)) {
        let err = K4Error::InvalidTemplate {
            kind,
            purpose: purpose.as_str(),
            token: occ.name.to_owned(),
        };
        error!("{err}");
        return Err(err);
    }
    Ok(ValidTemplate::new(purpose, template))
}

/// Check that every source field of `pairs` belongs to the schema of `kind`.
pub fn validate_shaping(kind: MessageKind, pairs: Vec<(String, String)>) -> Result<ShapingSpec, K4Error> {
    let schema = kind.schema();
    if let Some((src, _)) = pairs.iter().find(|(src, _)| !schema.contains(src)) {
        let err = K4Error::InvalidShapingKey { kind, field: src.clone() };
        error!("{err}");
        return Err(err);
    }
    Ok(ShapingSpec::new(pairs))
}
