//! # k4-sink
//!
//! Writer engine publishing normalized market-data records to external
//! systems:
//!
//! - **Validation** (`validate`): template tokens and shaping keys checked
//!   against the kind's schema at construction
//! - **Routing** (`template`): case-preserving routing strings with a
//!   per-writer cache
//! - **Shaping** (`shaper`): select, relabel and reorder payload fields
//! - **Adapters** (`kafka`, `redis`): broker producer, sorted-set store and
//!   append-log store behind the [`adapter::SinkAdapter`] trait
//! - **Writer loop** (`writer`): connect/retry, batch drain, drain-before-close
//! - **Registry** (`registry`): build writers from `SinkConfig` entries
//!
//! Concrete wire clients sit behind the `kafka` and `redis` features.

pub mod adapter;
pub mod client;
pub mod codec;
pub mod kafka;
pub mod queue;
pub mod redis;
pub mod registry;
pub mod shaper;
pub mod template;
pub mod validate;
pub mod writer;

#[cfg(test)]
pub(crate) mod testing;

pub use queue::{EventQueue, QueueSender, queue};
pub use registry::create_writer;
pub use writer::{Writer, WriterState};
