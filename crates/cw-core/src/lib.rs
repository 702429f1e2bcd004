//! cw-core: shared types, IDs, errors, configuration, and event system.
//!
//! This crate is the foundational dependency for the other cw-* crates,
//! providing the job error taxonomy, type-safe identifiers, clip-domain
//! types, merge configuration, and a broadcast event bus for job status.

pub mod config;
pub mod error;
pub mod events;
pub mod ids;
pub mod media;

// Re-export the most commonly used items at the crate root.
pub use error::{Error, ErrorCategory, Result};
pub use ids::*;
pub use media::*;
