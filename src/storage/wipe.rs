//! Hierarchical deleter
//!
//! Cascading deletion of one record (children first, root last) and paginated
//! deletion of every record in a namespace, driven by a resumable cursor.

use std::sync::Arc;

use tracing::debug;

use crate::store::{DocumentStore, WriteBatch, WriteOp};
use crate::types::Result;

/// Deletes records and their child collections, never leaving orphans behind
#[derive(Clone)]
pub struct Deleter {
    store: Arc<dyn DocumentStore>,
    max_batch_ops: usize,
    page_size: usize,
}

impl Deleter {
    pub fn new(store: Arc<dyn DocumentStore>, max_batch_ops: usize, page_size: usize) -> Self {
        Self {
            store,
            max_batch_ops,
            page_size,
        }
    }

    /// Cascading delete of one record: every child of every group, then the
    /// root. Chunked when the plan exceeds the operation ceiling; the root
    /// delete is pushed last, so it lands in the final chunk.
    ///
    /// Deleting an absent record is a store-level no-op; existence is the
    /// caller's pre-check.
    pub async fn delete(&self, namespace: &str, record_id: &str) -> Result<()> {
        let mut batch = WriteBatch::new();
        self.plan_record_delete(namespace, record_id, &mut batch)
            .await?;

        debug!(
            "Deleting record {}/{} ({} ops)",
            namespace,
            record_id,
            batch.len()
        );
        for chunk in batch.into_chunks(self.max_batch_ops) {
            self.store.commit(chunk).await?;
        }

        Ok(())
    }

    /// Delete every record in a namespace, in pages of `page_size` records.
    /// Returns the number of root records deleted; child items don't count.
    pub async fn delete_all(&self, namespace: &str) -> Result<u64> {
        self.resume_wipe(namespace, None).await
    }

    /// Resume a namespace wipe from a cursor (the last record id already
    /// processed). Each page's child and root deletes commit as one atomic
    /// batch before the cursor advances, so a crashed wipe picks up where it
    /// stopped without rescanning deleted ids.
    pub async fn resume_wipe(&self, namespace: &str, cursor: Option<String>) -> Result<u64> {
        let mut cursor = cursor;
        let mut deleted: u64 = 0;

        loop {
            let page = self
                .store
                .list_record_ids(namespace, cursor.as_deref(), self.page_size)
                .await?;
            if page.is_empty() {
                break;
            }

            let mut batch = WriteBatch::new();
            for record_id in &page {
                self.plan_record_delete(namespace, record_id, &mut batch)
                    .await?;
            }

            // One atomic unit per page
            self.store.commit(batch).await?;
            deleted += page.len() as u64;

            cursor = page.last().cloned();
            debug!(
                "Wipe of namespace {} advanced to cursor {:?} ({} records deleted)",
                namespace, cursor, deleted
            );
        }

        Ok(deleted)
    }

    async fn plan_record_delete(
        &self,
        namespace: &str,
        record_id: &str,
        batch: &mut WriteBatch,
    ) -> Result<()> {
        for set in self.store.list_child_sets(namespace, record_id).await? {
            for item in self
                .store
                .list_child_ids(namespace, record_id, &set)
                .await?
            {
                batch.push(WriteOp::DeleteChild {
                    namespace: namespace.to_string(),
                    record: record_id.to_string(),
                    set: set.clone(),
                    item,
                });
            }
        }

        batch.push(WriteOp::DeleteRecord {
            namespace: namespace.to_string(),
            record: record_id.to_string(),
        });

        Ok(())
    }
}
