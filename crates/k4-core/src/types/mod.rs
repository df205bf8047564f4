//! Core data types shared by every sink.
//!
//! - [`kind`]: message kinds and their static field schemas
//! - [`record`]: the ordered field map flowing from the queue to a sink

pub mod kind;
pub mod record;

pub use kind::*;
pub use record::*;
