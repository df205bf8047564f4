//! Routing-string templates: token scanning, case-preserving substitution,
//! and the per-writer resolution cache.
//!
//! A template such as `"Exchange-CHANNEL-symbol"` mixes literal text with
//! tokens. Static tokens (`exchange`, `channel`) are filled once per sink
//! instance; dynamic tokens (`symbol`, `side`, ...) are filled per record.
//! Each occurrence keeps the casing it was written in:
//!
//! ```text
//! "Exchange-SYMBOL-side" + {exchange: coinbase, symbol: btc-usd, side: buy}
//!     -> "Coinbase-BTC-USD-buy"
//! ```
//!
//! # Cache
//!
//! [`TemplateEngine`] remembers every routing string it has produced. Static
//! results are stored under the purpose name (`"topic"`). Dynamic results are
//! stored under the purpose plus the record's values for the tokens found on
//! the previous miss, length-prefixed and joined by a unit separator
//! (`"topic\x1f7:BTC-USD\x1f3:buy"`).
//! The cache is never invalidated; kinds, schemas and templates are fixed for
//! the writer's lifetime.

use std::borrow::Cow;
use std::sync::LazyLock;

use ahash::AHashMap;
use k4_core::error::K4Error;
use k4_core::types::{DYNAMIC_TOKENS, MessageKind, Record, STATIC_TOKENS};

// ---------------------------------------------------------------------------
// Purpose
// ---------------------------------------------------------------------------

/// Semantic role of a routing string within a sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Purpose {
    /// Broker topic.
    Topic,
    /// Broker message key, or the set/stream name of a store.
    Key,
}

impl Purpose {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Topic => "topic",
            Self::Key => "key",
        }
    }
}

impl std::fmt::Display for Purpose {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Casing
// ---------------------------------------------------------------------------

/// Casing of one token occurrence in a template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Casing {
    Lower,
    Upper,
    Title,
}

impl Casing {
    /// Render `value` in this casing.
    pub fn apply(self, value: &str) -> String {
        match self {
            Self::Lower => value.to_lowercase(),
            Self::Upper => value.to_uppercase(),
            Self::Title => title_case(value),
        }
    }
}

/// Uppercase the first cased letter of every word, lowercase the rest.
///
/// A word starts after any character that has no case, so `"btc-usd"`
/// becomes `"Btc-Usd"` and `"client_order_id"` becomes `"Client_Order_Id"`.
pub fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_cased = false;
    for c in s.chars() {
        if prev_cased {
            out.extend(c.to_lowercase());
        } else {
            out.extend(c.to_uppercase());
        }
        prev_cased = c.is_uppercase() || c.is_lowercase();
    }
    out
}

// ---------------------------------------------------------------------------
// Token scanning
// ---------------------------------------------------------------------------

/// A token vocabulary expanded into its lower, UPPER and Title spellings.
pub(crate) struct Vocabulary {
    /// `(spelling, token name, casing)`, longest spelling first.
    forms: Vec<(String, &'static str, Casing)>,
}

impl Vocabulary {
    fn new(tokens: &[&'static str]) -> Self {
        let mut forms = Vec::with_capacity(tokens.len() * 3);
        for &name in tokens {
            for casing in [Casing::Upper, Casing::Lower, Casing::Title] {
                let spelling = casing.apply(name);
                if !forms.iter().any(|(s, _, _)| *s == spelling) {
                    forms.push((spelling, name, casing));
                }
            }
        }
        forms.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
        Self { forms }
    }

    /// Non-overlapping token occurrences in `text`, left to right.
    pub(crate) fn scan(&self, text: &str) -> Vec<Occurrence> {
        let mut found = Vec::new();
        let mut i = 0;
        while i < text.len() {
            let rest = &text[i..];
            match self.forms.iter().find(|(s, _, _)| rest.starts_with(s.as_str())) {
                Some((spelling, name, casing)) => {
                    found.push(Occurrence {
                        start: i,
                        end: i + spelling.len(),
                        name: *name,
                        casing: *casing,
                    });
                    i += spelling.len();
                }
                None => {
                    i += rest.chars().next().map_or(1, char::len_utf8);
                }
            }
        }
        found
    }
}

pub(crate) static STATIC_VOCAB: LazyLock<Vocabulary> = LazyLock::new(|| Vocabulary::new(&STATIC_TOKENS));
pub(crate) static DYNAMIC_VOCAB: LazyLock<Vocabulary> = LazyLock::new(|| Vocabulary::new(&DYNAMIC_TOKENS));

/// One token found in a template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Occurrence {
    pub start: usize,
    pub end: usize,
    pub name: &'static str,
    pub casing: Casing,
}

/// Replace every occurrence with `value(name)` rendered in its casing.
fn substitute<'r, F>(text: &str, occurrences: &[Occurrence], mut value: F) -> Result<String, K4Error>
where
    F: FnMut(&'static str) -> Result<Cow<'r, str>, K4Error>,
{
    let mut out = String::with_capacity(text.len() + 16);
    let mut last = 0;
    for occ in occurrences {
        out.push_str(&text[last..occ.start]);
        out.push_str(&occ.casing.apply(&value(occ.name)?));
        last = occ.end;
    }
    out.push_str(&text[last..]);
    Ok(out)
}

// ---------------------------------------------------------------------------
// ValidTemplate
// ---------------------------------------------------------------------------

/// A template that passed validation against its message kind.
///
/// Only produced by [`crate::validate::validate_template`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidTemplate {
    purpose: Purpose,
    text: String,
}

impl ValidTemplate {
    pub(crate) fn new(purpose: Purpose, text: impl Into<String>) -> Self {
        Self { purpose, text: text.into() }
    }

    pub fn purpose(&self) -> Purpose {
        self.purpose
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }
}

// ---------------------------------------------------------------------------
// TemplateEngine
// ---------------------------------------------------------------------------

/// Resolves routing strings for one writer instance.
///
/// Not thread-safe; each writer owns its own engine and cache.
pub struct TemplateEngine {
    kind: MessageKind,
    templates: AHashMap<Purpose, ValidTemplate>,
    cache: AHashMap<String, String>,
    /// Dynamic token names found on the last miss, per purpose.
    key_lists: AHashMap<Purpose, Vec<&'static str>>,
    computed: u64,
}

impl TemplateEngine {
    pub fn new(kind: MessageKind) -> Self {
        Self {
            kind,
            templates: AHashMap::new(),
            cache: AHashMap::new(),
            key_lists: AHashMap::new(),
            computed: 0,
        }
    }

    /// Register a validated template under its purpose.
    pub fn with_template(mut self, template: ValidTemplate) -> Self {
        self.templates.insert(template.purpose, template);
        self
    }

    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    pub fn template(&self, purpose: Purpose) -> Option<&str> {
        self.templates.get(&purpose).map(ValidTemplate::as_str)
    }

    /// Number of routing strings computed on a cache miss.
    pub fn computed(&self) -> u64 {
        self.computed
    }

    /// Number of cached routing strings.
    pub fn cached(&self) -> usize {
        self.cache.len()
    }

    /// Routing string for `purpose` and `record`.
    ///
    /// Without a template the channel name is used. A template token that the
    /// record cannot fill yields [`K4Error::MissingRoutingField`].
    pub fn resolve(&mut self, purpose: Purpose, record: &Record) -> Result<String, K4Error> {
        if let Some(hit) = self.lookup(purpose, record) {
            return Ok(hit);
        }
        self.computed += 1;

        let channel = self.kind.channel_name();
        let Some(template) = self.templates.get(&purpose) else {
            self.cache.insert(purpose.as_str().to_owned(), channel.to_owned());
            return Ok(channel.to_owned());
        };

        let statics = STATIC_VOCAB.scan(&template.text);
        let standard = substitute(&template.text, &statics, |name| {
            Ok(record.text(name).unwrap_or(Cow::Borrowed(channel)))
        })?;

        let dynamics = DYNAMIC_VOCAB.scan(&standard);
        if dynamics.is_empty() {
            self.cache.insert(purpose.as_str().to_owned(), standard.clone());
            return Ok(standard);
        }

        let mut key_list: Vec<&'static str> = Vec::with_capacity(dynamics.len());
        for occ in &dynamics {
            if !key_list.contains(&occ.name) {
                key_list.push(occ.name);
            }
        }

        let kind = self.kind;
        let resolved = substitute(&standard, &dynamics, |name| {
            record.text(name).ok_or_else(|| K4Error::MissingRoutingField {
                kind,
                purpose: purpose.as_str(),
                template: template.text.clone(),
                field: name.to_owned(),
            })
        });
        let key = dynamic_cache_key(purpose, &key_list, record);
        self.key_lists.insert(purpose, key_list);
        let resolved = resolved?;

        if let Some(key) = key {
            self.cache.insert(key, resolved.clone());
        }
        Ok(resolved)
    }

    fn lookup(&self, purpose: Purpose, record: &Record) -> Option<String> {
        if let Some(hit) = self.cache.get(purpose.as_str()) {
            return Some(hit.clone());
        }
        let keys = self.key_lists.get(&purpose)?;
        let key = dynamic_cache_key(purpose, keys, record)?;
        self.cache.get(&key).cloned()
    }
}

const KEY_SEPARATOR: char = '\u{1f}';

/// `"<purpose>\x1f<len>:<v1>\x1f<len>:<v2>..."`, or `None` if the record
/// lacks a value. Length prefixes keep distinct value tuples apart whatever
/// the values contain.
fn dynamic_cache_key(purpose: Purpose, keys: &[&'static str], record: &Record) -> Option<String> {
    let mut key = String::from(purpose.as_str());
    for name in keys {
        let value = record.text(name)?;
        key.push(KEY_SEPARATOR);
        key.push_str(&value.len().to_string());
        key.push(':');
        key.push_str(&value);
    }
    Some(key)
}
