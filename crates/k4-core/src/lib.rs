//! # k4-core
//!
//! Core crate for the K4 sink writers, providing:
//!
//! - **Types** (`types`): message kinds, field schemas, the `Record` map
//! - **Configuration** (`config`): JSON config deserialization
//! - **Error types** (`error`): domain-specific `K4Error` via thiserror
//! - **Logging** (`logging`): tracing-based structured logging

pub mod config;
pub mod error;
pub mod logging;
pub mod types;

// Re-export types at crate root for convenience.
pub use types::*;
