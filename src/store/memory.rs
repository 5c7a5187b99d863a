//! In-memory document store
//!
//! Ordered maps behind an async RwLock. Used by development mode and by the
//! core test suite. Commit is validate-then-apply under one write lock, so a
//! failed batch leaves the store untouched.

use std::collections::{BTreeMap, HashSet};
use std::ops::Bound;

use async_trait::async_trait;
use bson::{DateTime, Document};
use tokio::sync::RwLock;

use crate::store::{DocumentStore, StoredRecord, WriteBatch, WriteOp};
use crate::types::{DepotError, Result};

#[derive(Debug, Clone)]
struct RecordEntry {
    fields: Document,
    created_at: DateTime,
    updated_at: DateTime,
}

#[derive(Default)]
struct MemoryInner {
    /// (namespace, record) -> root entry
    records: BTreeMap<(String, String), RecordEntry>,
    /// (namespace, record, set) -> members in insertion order
    items: BTreeMap<(String, String, String), Vec<(String, Document)>>,
    /// Monotonic counter behind item ids
    next_item: u64,
}

/// In-process store over ordered maps
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn fetch_record(&self, namespace: &str, record: &str) -> Result<Option<StoredRecord>> {
        let inner = self.inner.read().await;
        let entry = inner
            .records
            .get(&(namespace.to_string(), record.to_string()));

        Ok(entry.map(|e| StoredRecord {
            fields: e.fields.clone(),
            created_at: e.created_at,
            updated_at: e.updated_at,
        }))
    }

    async fn record_exists(&self, namespace: &str, record: &str) -> Result<bool> {
        let inner = self.inner.read().await;
        Ok(inner
            .records
            .contains_key(&(namespace.to_string(), record.to_string())))
    }

    async fn list_record_ids(
        &self,
        namespace: &str,
        after: Option<&str>,
        limit: usize,
    ) -> Result<Vec<String>> {
        let inner = self.inner.read().await;

        let start = match after {
            Some(cursor) => Bound::Excluded((namespace.to_string(), cursor.to_string())),
            None => Bound::Included((namespace.to_string(), String::new())),
        };

        let ids = inner
            .records
            .range((start, Bound::Unbounded))
            .take_while(|((ns, _), _)| ns == namespace)
            .take(limit)
            .map(|((_, id), _)| id.clone())
            .collect();

        Ok(ids)
    }

    async fn list_child_sets(&self, namespace: &str, record: &str) -> Result<Vec<String>> {
        let inner = self.inner.read().await;

        let start = (namespace.to_string(), record.to_string(), String::new());
        let sets = inner
            .items
            .range((Bound::Included(start), Bound::Unbounded))
            .take_while(|((ns, id, _), _)| ns == namespace && id == record)
            .filter(|(_, members)| !members.is_empty())
            .map(|((_, _, set), _)| set.clone())
            .collect();

        Ok(sets)
    }

    async fn fetch_children(
        &self,
        namespace: &str,
        record: &str,
        set: &str,
    ) -> Result<Vec<Document>> {
        let inner = self.inner.read().await;
        let key = (namespace.to_string(), record.to_string(), set.to_string());

        Ok(inner
            .items
            .get(&key)
            .map(|members| members.iter().map(|(_, fields)| fields.clone()).collect())
            .unwrap_or_default())
    }

    async fn list_child_ids(
        &self,
        namespace: &str,
        record: &str,
        set: &str,
    ) -> Result<Vec<String>> {
        let inner = self.inner.read().await;
        let key = (namespace.to_string(), record.to_string(), set.to_string());

        Ok(inner
            .items
            .get(&key)
            .map(|members| members.iter().map(|(id, _)| id.clone()).collect())
            .unwrap_or_default())
    }

    async fn commit(&self, batch: WriteBatch) -> Result<()> {
        let mut inner = self.inner.write().await;

        // Validate: conditional inserts are checked against current state and
        // against earlier operations of the same batch, before anything is
        // applied.
        let mut pending_inserts: HashSet<(String, String)> = HashSet::new();
        let mut pending_deletes: HashSet<(String, String)> = HashSet::new();

        for op in batch.ops() {
            match op {
                WriteOp::InsertRecord {
                    namespace, record, ..
                } => {
                    let key = (namespace.clone(), record.clone());
                    let exists = inner.records.contains_key(&key) && !pending_deletes.contains(&key);
                    if exists || pending_inserts.contains(&key) {
                        return Err(DepotError::AlreadyExists(format!(
                            "{}/{}",
                            namespace, record
                        )));
                    }
                    pending_inserts.insert(key);
                }
                WriteOp::DeleteRecord { namespace, record } => {
                    let key = (namespace.clone(), record.clone());
                    pending_inserts.remove(&key);
                    pending_deletes.insert(key);
                }
                _ => {}
            }
        }

        // Apply
        for op in batch.into_ops() {
            match op {
                WriteOp::InsertRecord {
                    namespace,
                    record,
                    fields,
                    created_at,
                    updated_at,
                } => {
                    inner.records.insert(
                        (namespace, record),
                        RecordEntry {
                            fields,
                            created_at,
                            updated_at,
                        },
                    );
                }
                WriteOp::MergeRecord {
                    namespace,
                    record,
                    fields,
                    updated_at,
                } => {
                    if let Some(entry) = inner.records.get_mut(&(namespace, record)) {
                        for (key, value) in fields {
                            entry.fields.insert(key, value);
                        }
                        entry.updated_at = updated_at;
                    }
                }
                WriteOp::InsertChild {
                    namespace,
                    record,
                    set,
                    fields,
                } => {
                    let id = format!("{:016x}", inner.next_item);
                    inner.next_item += 1;
                    inner
                        .items
                        .entry((namespace, record, set))
                        .or_default()
                        .push((id, fields));
                }
                WriteOp::DeleteChild {
                    namespace,
                    record,
                    set,
                    item,
                } => {
                    if let Some(members) = inner.items.get_mut(&(namespace, record, set)) {
                        members.retain(|(id, _)| *id != item);
                    }
                }
                WriteOp::ClearChildSet {
                    namespace,
                    record,
                    set,
                } => {
                    inner.items.remove(&(namespace, record, set));
                }
                WriteOp::DeleteRecord { namespace, record } => {
                    inner.records.remove(&(namespace, record));
                }
            }
        }

        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    fn insert_record(namespace: &str, record: &str, fields: Document) -> WriteOp {
        let now = DateTime::now();
        WriteOp::InsertRecord {
            namespace: namespace.into(),
            record: record.into(),
            fields,
            created_at: now,
            updated_at: now,
        }
    }

    fn insert_child(namespace: &str, record: &str, set: &str, fields: Document) -> WriteOp {
        WriteOp::InsertChild {
            namespace: namespace.into(),
            record: record.into(),
            set: set.into(),
            fields,
        }
    }

    async fn commit_one(store: &MemoryStore, op: WriteOp) {
        let mut batch = WriteBatch::new();
        batch.push(op);
        store.commit(batch).await.unwrap();
    }

    #[tokio::test]
    async fn conditional_insert_rejects_duplicates() {
        let store = MemoryStore::new();
        commit_one(&store, insert_record("ns", "r1", doc! { "name": "first" })).await;

        let mut batch = WriteBatch::new();
        batch.push(insert_record("ns", "r1", doc! { "name": "second" }));
        let err = store.commit(batch).await.unwrap_err();
        assert!(matches!(err, DepotError::AlreadyExists(_)));

        // Original untouched
        let fetched = store.fetch_record("ns", "r1").await.unwrap().unwrap();
        assert_eq!(fetched.fields.get_str("name").unwrap(), "first");
    }

    #[tokio::test]
    async fn failed_batch_applies_nothing() {
        let store = MemoryStore::new();

        let mut batch = WriteBatch::new();
        batch.push(insert_record("ns", "a", doc! {}));
        batch.push(insert_child("ns", "a", "tags", doc! { "v": 1_i64 }));
        batch.push(insert_record("ns", "a", doc! {}));
        assert!(store.commit(batch).await.is_err());

        assert!(!store.record_exists("ns", "a").await.unwrap());
        assert!(store.fetch_children("ns", "a", "tags").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_then_insert_in_one_batch() {
        let store = MemoryStore::new();
        commit_one(&store, insert_record("ns", "r", doc! { "v": 1_i64 })).await;

        let mut batch = WriteBatch::new();
        batch.push(WriteOp::DeleteRecord {
            namespace: "ns".into(),
            record: "r".into(),
        });
        batch.push(insert_record("ns", "r", doc! { "v": 2_i64 }));
        store.commit(batch).await.unwrap();

        let fetched = store.fetch_record("ns", "r").await.unwrap().unwrap();
        assert_eq!(fetched.fields.get_i64("v").unwrap(), 2);
    }

    #[tokio::test]
    async fn pagination_walks_ascending_after_cursor() {
        let store = MemoryStore::new();
        for id in ["a", "b", "c", "d", "e"] {
            commit_one(&store, insert_record("ns", id, doc! {})).await;
        }
        commit_one(&store, insert_record("other", "zzz", doc! {})).await;

        assert_eq!(
            store.list_record_ids("ns", None, 2).await.unwrap(),
            vec!["a", "b"]
        );
        assert_eq!(
            store.list_record_ids("ns", Some("b"), 2).await.unwrap(),
            vec!["c", "d"]
        );
        assert_eq!(
            store.list_record_ids("ns", Some("d"), 10).await.unwrap(),
            vec!["e"]
        );
        assert!(store
            .list_record_ids("ns", Some("e"), 10)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn children_keep_insertion_order() {
        let store = MemoryStore::new();
        commit_one(&store, insert_record("ns", "r", doc! {})).await;

        let mut batch = WriteBatch::new();
        for i in 0..3_i64 {
            batch.push(insert_child("ns", "r", "steps", doc! { "seq": i }));
        }
        store.commit(batch).await.unwrap();

        let children = store.fetch_children("ns", "r", "steps").await.unwrap();
        let seqs: Vec<i64> = children.iter().map(|d| d.get_i64("seq").unwrap()).collect();
        assert_eq!(seqs, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn clear_child_set_only_touches_named_set() {
        let store = MemoryStore::new();
        commit_one(&store, insert_record("ns", "r", doc! {})).await;
        commit_one(&store, insert_child("ns", "r", "tags", doc! { "v": "a" })).await;
        commit_one(&store, insert_child("ns", "r", "notes", doc! { "v": "b" })).await;

        commit_one(
            &store,
            WriteOp::ClearChildSet {
                namespace: "ns".into(),
                record: "r".into(),
                set: "tags".into(),
            },
        )
        .await;

        assert!(store.fetch_children("ns", "r", "tags").await.unwrap().is_empty());
        assert_eq!(store.fetch_children("ns", "r", "notes").await.unwrap().len(), 1);
        assert_eq!(
            store.list_child_sets("ns", "r").await.unwrap(),
            vec!["notes"]
        );
    }

    #[tokio::test]
    async fn delete_child_removes_single_member() {
        let store = MemoryStore::new();
        commit_one(&store, insert_record("ns", "r", doc! {})).await;
        commit_one(&store, insert_child("ns", "r", "tags", doc! { "v": "a" })).await;
        commit_one(&store, insert_child("ns", "r", "tags", doc! { "v": "b" })).await;

        let ids = store.list_child_ids("ns", "r", "tags").await.unwrap();
        assert_eq!(ids.len(), 2);

        commit_one(
            &store,
            WriteOp::DeleteChild {
                namespace: "ns".into(),
                record: "r".into(),
                set: "tags".into(),
                item: ids[0].clone(),
            },
        )
        .await;

        let remaining = store.fetch_children("ns", "r", "tags").await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].get_str("v").unwrap(), "b");
    }

    #[tokio::test]
    async fn merge_preserves_created_at_and_unnamed_fields() {
        let store = MemoryStore::new();
        commit_one(
            &store,
            insert_record("ns", "r", doc! { "keep": "yes", "swap": "old" }),
        )
        .await;
        let before = store.fetch_record("ns", "r").await.unwrap().unwrap();

        let later = DateTime::from_millis(before.updated_at.timestamp_millis() + 5_000);
        commit_one(
            &store,
            WriteOp::MergeRecord {
                namespace: "ns".into(),
                record: "r".into(),
                fields: doc! { "swap": "new", "extra": 7_i64 },
                updated_at: later,
            },
        )
        .await;

        let after = store.fetch_record("ns", "r").await.unwrap().unwrap();
        assert_eq!(after.fields.get_str("keep").unwrap(), "yes");
        assert_eq!(after.fields.get_str("swap").unwrap(), "new");
        assert_eq!(after.fields.get_i64("extra").unwrap(), 7);
        assert_eq!(after.created_at, before.created_at);
        assert_eq!(after.updated_at, later);
    }

    #[tokio::test]
    async fn merge_on_absent_record_is_noop() {
        let store = MemoryStore::new();
        commit_one(
            &store,
            WriteOp::MergeRecord {
                namespace: "ns".into(),
                record: "ghost".into(),
                fields: doc! { "v": 1_i64 },
                updated_at: DateTime::now(),
            },
        )
        .await;

        assert!(!store.record_exists("ns", "ghost").await.unwrap());
    }
}
