//! Database schemas for depot
//!
//! Defines MongoDB document structures for namespaces and shared metadata.

mod metadata;
mod namespace;

pub use metadata::Metadata;
pub use namespace::{NamespaceDoc, NAMESPACE_COLLECTION};
