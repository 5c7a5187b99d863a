//! Storage record synchronizer
//!
//! Create/update/get of one record and its child collections. Payloads are
//! partitioned and date-normalized here; every write reaches the store as an
//! atomic batch, chunked to the operation ceiling.

use std::collections::HashSet;
use std::sync::Arc;

use bson::DateTime;
use serde_json::Value;
use tracing::debug;

use crate::storage::{dates, payload};
use crate::store::{DocumentStore, WriteBatch, WriteOp};
use crate::types::Result;

/// Synchronizes caller payloads into the document store
#[derive(Clone)]
pub struct Synchronizer {
    store: Arc<dyn DocumentStore>,
    max_batch_ops: usize,
}

impl Synchronizer {
    pub fn new(store: Arc<dyn DocumentStore>, max_batch_ops: usize) -> Self {
        Self {
            store,
            max_batch_ops,
        }
    }

    /// Create a record and its child groups.
    ///
    /// The record id comes from the payload's `id` when present, otherwise
    /// the store assigns one. Creation is conditional: a taken id fails with
    /// `AlreadyExists` and nothing is written.
    pub async fn create(&self, namespace: &str, payload: Value) -> Result<String> {
        let parts = payload::partition(payload)?;
        let record_id = parts
            .record_id
            .unwrap_or_else(|| self.store.assign_record_id());
        let now = DateTime::now();

        let mut batch = WriteBatch::new();
        batch.push(WriteOp::InsertRecord {
            namespace: namespace.to_string(),
            record: record_id.clone(),
            fields: dates::promote_map(parts.fields),
            created_at: now,
            updated_at: now,
        });

        for group in parts.groups {
            for member in group.members {
                batch.push(WriteOp::InsertChild {
                    namespace: namespace.to_string(),
                    record: record_id.clone(),
                    set: group.name.clone(),
                    fields: dates::promote_map(member),
                });
            }
        }

        debug!(
            "Creating record {}/{} ({} ops)",
            namespace,
            record_id,
            batch.len()
        );
        self.commit_chunked(batch).await?;

        Ok(record_id)
    }

    /// Merge payload fields into an existing record and replace named child
    /// groups wholesale.
    ///
    /// Fields named in the payload overwrite; unnamed fields survive, as do
    /// child groups the payload does not mention. `createdAt` is never
    /// touched. Existence is the caller's pre-check.
    pub async fn update(&self, namespace: &str, record_id: &str, payload: Value) -> Result<String> {
        let parts = payload::partition(payload)?;
        let now = DateTime::now();

        let mut batch = WriteBatch::new();
        batch.push(WriteOp::MergeRecord {
            namespace: namespace.to_string(),
            record: record_id.to_string(),
            fields: dates::promote_map(parts.fields),
            updated_at: now,
        });

        // Stale members are deleted before fresh inserts; a repeated group
        // name clears only once so all of its inserts survive
        let mut cleared: HashSet<String> = HashSet::new();
        for group in parts.groups {
            if cleared.insert(group.name.clone()) {
                batch.push(WriteOp::ClearChildSet {
                    namespace: namespace.to_string(),
                    record: record_id.to_string(),
                    set: group.name.clone(),
                });
            }
            for member in group.members {
                batch.push(WriteOp::InsertChild {
                    namespace: namespace.to_string(),
                    record: record_id.to_string(),
                    set: group.name.clone(),
                    fields: dates::promote_map(member),
                });
            }
        }

        debug!(
            "Updating record {}/{} ({} ops)",
            namespace,
            record_id,
            batch.len()
        );
        self.commit_chunked(batch).await?;

        Ok(record_id.to_string())
    }

    /// Root document fields with timestamps rendered, or None when absent
    pub async fn get(&self, namespace: &str, record_id: &str) -> Result<Option<Value>> {
        let Some(stored) = self.store.fetch_record(namespace, record_id).await? else {
            return Ok(None);
        };

        let mut rendered = dates::render_document(stored.fields);
        rendered.insert(
            "createdAt".to_string(),
            Value::String(dates::render_timestamp(stored.created_at)),
        );
        rendered.insert(
            "updatedAt".to_string(),
            Value::String(dates::render_timestamp(stored.updated_at)),
        );

        Ok(Some(Value::Object(rendered)))
    }

    /// Members of one child group, item payloads only; empty when the group
    /// has no members or does not exist
    pub async fn get_children(
        &self,
        namespace: &str,
        record_id: &str,
        set: &str,
    ) -> Result<Vec<Value>> {
        let children = self.store.fetch_children(namespace, record_id, set).await?;

        Ok(children
            .into_iter()
            .map(|doc| Value::Object(dates::render_document(doc)))
            .collect())
    }

    /// Whether a record exists; used by the HTTP layer's pre-checks
    pub async fn exists(&self, namespace: &str, record_id: &str) -> Result<bool> {
        self.store.record_exists(namespace, record_id).await
    }

    async fn commit_chunked(&self, batch: WriteBatch) -> Result<()> {
        for chunk in batch.into_chunks(self.max_batch_ops) {
            self.store.commit(chunk).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::types::DepotError;
    use serde_json::json;
    use std::time::Duration;

    fn synchronizer() -> Synchronizer {
        Synchronizer::new(Arc::new(MemoryStore::new()), 500)
    }

    #[tokio::test]
    async fn create_assigns_id_when_payload_has_none() {
        let sync = synchronizer();
        let id = sync.create("app", json!({ "name": "widget" })).await.unwrap();
        assert_eq!(id.len(), 24);

        let root = sync.get("app", &id).await.unwrap().unwrap();
        assert_eq!(root["name"], json!("widget"));
        assert_eq!(root["createdAt"], root["updatedAt"]);
    }

    #[tokio::test]
    async fn create_with_collection_end_to_end() {
        let sync = synchronizer();
        let id = sync
            .create(
                "app",
                json!({
                    "id": "r1",
                    "name": "widget",
                    "collection": [ { "name": "tags", "data": [ { "v": "a" } ] } ],
                }),
            )
            .await
            .unwrap();
        assert_eq!(id, "r1");

        let root = sync.get("app", "r1").await.unwrap().unwrap();
        assert_eq!(root["name"], json!("widget"));
        assert!(root.get("collection").is_none());
        assert!(root.get("id").is_none());
        assert!(root.get("createdAt").is_some());
        assert!(root.get("updatedAt").is_some());

        let tags = sync.get_children("app", "r1", "tags").await.unwrap();
        assert_eq!(tags, vec![json!({ "v": "a" })]);
    }

    #[tokio::test]
    async fn get_is_idempotent() {
        let sync = synchronizer();
        sync.create("app", json!({ "id": "r", "n": 1 })).await.unwrap();

        let first = sync.get("app", "r").await.unwrap();
        let second = sync.get("app", "r").await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn get_absent_returns_none() {
        let sync = synchronizer();
        assert!(sync.get("app", "ghost").await.unwrap().is_none());
        assert!(sync
            .get_children("app", "ghost", "tags")
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn update_replaces_named_group_wholesale() {
        let sync = synchronizer();
        sync.create(
            "app",
            json!({
                "id": "r",
                "collection": [ { "name": "tags", "data": [ { "v": "stale" } ] } ],
            }),
        )
        .await
        .unwrap();

        sync.update(
            "app",
            "r",
            json!({
                "collection": [ { "name": "tags", "data": [ { "v": "b" }, { "v": "c" } ] } ],
            }),
        )
        .await
        .unwrap();

        let tags = sync.get_children("app", "r", "tags").await.unwrap();
        assert_eq!(tags, vec![json!({ "v": "b" }), json!({ "v": "c" })]);
    }

    #[tokio::test]
    async fn update_leaves_unnamed_groups_untouched() {
        let sync = synchronizer();
        sync.create(
            "app",
            json!({
                "id": "r",
                "collection": [
                    { "name": "tags", "data": [ { "v": "t" } ] },
                    { "name": "notes", "data": [ { "v": "n" } ] },
                ],
            }),
        )
        .await
        .unwrap();

        sync.update(
            "app",
            "r",
            json!({
                "collection": [ { "name": "tags", "data": [] } ],
            }),
        )
        .await
        .unwrap();

        assert!(sync.get_children("app", "r", "tags").await.unwrap().is_empty());
        assert_eq!(
            sync.get_children("app", "r", "notes").await.unwrap(),
            vec![json!({ "v": "n" })]
        );
    }

    #[tokio::test]
    async fn update_without_collection_touches_no_children() {
        let sync = synchronizer();
        sync.create(
            "app",
            json!({
                "id": "r",
                "collection": [ { "name": "tags", "data": [ { "v": "t" } ] } ],
            }),
        )
        .await
        .unwrap();

        sync.update("app", "r", json!({ "note": "fields only" }))
            .await
            .unwrap();

        assert_eq!(
            sync.get_children("app", "r", "tags").await.unwrap(),
            vec![json!({ "v": "t" })]
        );
    }

    #[tokio::test]
    async fn update_merges_root_fields() {
        let sync = synchronizer();
        sync.create("app", json!({ "id": "r", "keep": "old", "swap": "before" }))
            .await
            .unwrap();
        let before = sync.get("app", "r").await.unwrap().unwrap();

        tokio::time::sleep(Duration::from_millis(5)).await;
        sync.update("app", "r", json!({ "swap": "after", "extra": 1 }))
            .await
            .unwrap();

        let after = sync.get("app", "r").await.unwrap().unwrap();
        assert_eq!(after["keep"], json!("old"));
        assert_eq!(after["swap"], json!("after"));
        assert_eq!(after["extra"], json!(1));
        assert_eq!(after["createdAt"], before["createdAt"]);
        assert_ne!(after["updatedAt"], before["updatedAt"]);
    }

    #[tokio::test]
    async fn duplicate_create_fails_and_preserves_original() {
        let sync = synchronizer();
        sync.create("app", json!({ "id": "dup", "name": "first" }))
            .await
            .unwrap();

        let err = sync
            .create(
                "app",
                json!({
                    "id": "dup",
                    "name": "second",
                    "collection": [ { "name": "extras", "data": [ { "v": 1 } ] } ],
                }),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DepotError::AlreadyExists(_)));

        let root = sync.get("app", "dup").await.unwrap().unwrap();
        assert_eq!(root["name"], json!("first"));
        assert!(sync
            .get_children("app", "dup", "extras")
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn same_id_in_different_namespaces_is_fine() {
        let sync = synchronizer();
        sync.create("app-a", json!({ "id": "r", "from": "a" })).await.unwrap();
        sync.create("app-b", json!({ "id": "r", "from": "b" })).await.unwrap();

        let a = sync.get("app-a", "r").await.unwrap().unwrap();
        let b = sync.get("app-b", "r").await.unwrap().unwrap();
        assert_eq!(a["from"], json!("a"));
        assert_eq!(b["from"], json!("b"));
    }

    #[tokio::test]
    async fn dates_normalize_on_create() {
        let sync = synchronizer();
        sync.create(
            "app",
            json!({
                "id": "d",
                "dueAt": "2024-03-05T12:30:45Z",
                "note": "due 2024-03-05",
                "nested": { "at": "2023-01-01T00:00:00+0100" },
            }),
        )
        .await
        .unwrap();

        let root = sync.get("app", "d").await.unwrap().unwrap();
        assert_eq!(root["dueAt"], json!("2024-03-05T12:30:45.000Z"));
        assert_eq!(root["note"], json!("due 2024-03-05"));
        assert_eq!(root["nested"]["at"], json!("2022-12-31T23:00:00.000Z"));
    }

    #[tokio::test]
    async fn child_dates_normalize_too() {
        let sync = synchronizer();
        sync.create(
            "app",
            json!({
                "id": "d",
                "collection": [
                    { "name": "events", "data": [ { "at": "2024-03-05T12:30:45.5Z" } ] },
                ],
            }),
        )
        .await
        .unwrap();

        let events = sync.get_children("app", "d", "events").await.unwrap();
        assert_eq!(events, vec![json!({ "at": "2024-03-05T12:30:45.500Z" })]);
    }

    #[tokio::test]
    async fn invalid_payloads_reach_the_caller() {
        let sync = synchronizer();

        let err = sync.create("app", json!([1, 2])).await.unwrap_err();
        assert!(matches!(err, DepotError::InvalidPayload(_)));

        let err = sync.create("app", json!({ "$bad": 1 })).await.unwrap_err();
        assert!(matches!(err, DepotError::InvalidPayload(_)));

        let err = sync
            .update("app", "r", json!({ "collection": "nope" }))
            .await
            .unwrap_err();
        assert!(matches!(err, DepotError::InvalidPayload(_)));
    }

    #[tokio::test]
    async fn repeated_group_names_accumulate_on_update() {
        let sync = synchronizer();
        sync.create(
            "app",
            json!({
                "id": "r",
                "collection": [ { "name": "t", "data": [ { "v": "stale" } ] } ],
            }),
        )
        .await
        .unwrap();

        sync.update(
            "app",
            "r",
            json!({
                "collection": [
                    { "name": "t", "data": [ { "v": "x" } ] },
                    { "name": "t", "data": [ { "v": "y" } ] },
                ],
            }),
        )
        .await
        .unwrap();

        let members = sync.get_children("app", "r", "t").await.unwrap();
        assert_eq!(members, vec![json!({ "v": "x" }), json!({ "v": "y" })]);
    }

    #[tokio::test]
    async fn numeric_payload_id_is_coerced() {
        let sync = synchronizer();
        let id = sync.create("app", json!({ "id": 7, "n": 1 })).await.unwrap();
        assert_eq!(id, "7");
        assert!(sync.get("app", "7").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn oversized_batches_chunk_and_still_land() {
        let store = Arc::new(MemoryStore::new());
        let sync = Synchronizer::new(store, 2);

        let members: Vec<_> = (0..5_i64).map(|i| json!({ "seq": i })).collect();
        sync.create(
            "app",
            json!({
                "id": "big",
                "collection": [ { "name": "steps", "data": members } ],
            }),
        )
        .await
        .unwrap();

        let steps = sync.get_children("app", "big", "steps").await.unwrap();
        let seqs: Vec<i64> = steps
            .iter()
            .map(|v| v["seq"].as_i64().unwrap())
            .collect();
        assert_eq!(seqs, vec![0, 1, 2, 3, 4]);
    }
}
