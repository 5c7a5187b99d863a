//! Document store abstraction
//!
//! The synchronizer and deleter only talk to the [`DocumentStore`] trait.
//! Production uses [`MongoStore`]; development mode and the core tests run
//! against [`MemoryStore`].

mod batch;
mod memory;
mod mongo;

pub use batch::{WriteBatch, WriteOp};
pub use memory::MemoryStore;
pub use mongo::MongoStore;

use async_trait::async_trait;
use bson::{oid::ObjectId, DateTime, Document};

use crate::types::Result;

/// A root record as returned by a store: payload fields plus the two
/// server-maintained timestamps.
#[derive(Debug, Clone)]
pub struct StoredRecord {
    pub fields: Document,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

/// Backend-agnostic document store
///
/// Reads are individually consistent; writes only happen through
/// [`DocumentStore::commit`], which applies a whole batch atomically.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Generate an id for a record the caller did not name
    fn assign_record_id(&self) -> String {
        ObjectId::new().to_hex()
    }

    /// Root record fields and timestamps, or None when absent
    async fn fetch_record(&self, namespace: &str, record: &str) -> Result<Option<StoredRecord>>;

    /// Whether a record exists
    async fn record_exists(&self, namespace: &str, record: &str) -> Result<bool>;

    /// Record ids in ascending order, strictly after the cursor when given,
    /// at most `limit` ids
    async fn list_record_ids(
        &self,
        namespace: &str,
        after: Option<&str>,
        limit: usize,
    ) -> Result<Vec<String>>;

    /// Distinct child set names under one record
    async fn list_child_sets(&self, namespace: &str, record: &str) -> Result<Vec<String>>;

    /// Members of one child set, in insertion order
    async fn fetch_children(&self, namespace: &str, record: &str, set: &str)
        -> Result<Vec<Document>>;

    /// Item ids of one child set, for deletion planning
    async fn list_child_ids(&self, namespace: &str, record: &str, set: &str)
        -> Result<Vec<String>>;

    /// Apply a batch atomically: either every operation lands or none does
    async fn commit(&self, batch: WriteBatch) -> Result<()>;

    /// Connectivity check for readiness probes
    async fn ping(&self) -> Result<()>;
}
