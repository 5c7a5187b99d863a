//! Storage core
//!
//! Payload partitioning, date normalization, the record synchronizer, and
//! the hierarchical deleter. Everything here runs against the
//! [`DocumentStore`](crate::store::DocumentStore) trait.

pub mod dates;
pub mod payload;
mod sync;
mod wipe;

pub use sync::Synchronizer;
pub use wipe::Deleter;
