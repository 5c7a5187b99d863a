//! MongoDB-backed document store
//!
//! Root records live in `storage_records`, child items in `storage_items`.
//! The unique `(namespace_id, record_id)` index is what makes record creation
//! conditional; batches commit inside a multi-document transaction, which
//! assumes a replica-set deployment (managed MongoDB always is).

use async_trait::async_trait;
use bson::{doc, oid::ObjectId, Document};
use futures_util::TryStreamExt;
use mongodb::{
    error::{ErrorKind, WriteFailure},
    options::IndexOptions,
    Client, ClientSession, Collection, IndexModel,
};
use tracing::{debug, warn};

use crate::db::MongoClient;
use crate::store::{DocumentStore, StoredRecord, WriteBatch, WriteOp};
use crate::types::{DepotError, Result};

/// Collection holding one document per root record
pub const RECORDS_COLLECTION: &str = "storage_records";

/// Collection holding one document per child item
pub const ITEMS_COLLECTION: &str = "storage_items";

/// Production store over two raw MongoDB collections
#[derive(Clone)]
pub struct MongoStore {
    client: Client,
    db_name: String,
    records: Collection<Document>,
    items: Collection<Document>,
}

impl MongoStore {
    /// Create the store and apply its indexes
    pub async fn new(client: &MongoClient) -> Result<Self> {
        let db = client.inner().database(client.db_name());
        let records = db.collection::<Document>(RECORDS_COLLECTION);
        let items = db.collection::<Document>(ITEMS_COLLECTION);

        // The unique compound index backs conditional creation
        records
            .create_indexes(vec![IndexModel::builder()
                .keys(doc! { "namespace_id": 1, "record_id": 1 })
                .options(
                    IndexOptions::builder()
                        .unique(true)
                        .name("namespace_record_unique".to_string())
                        .build(),
                )
                .build()])
            .await
            .map_err(|e| DepotError::Database(format!("Failed to create record indexes: {}", e)))?;

        items
            .create_indexes(vec![
                IndexModel::builder()
                    .keys(doc! { "namespace_id": 1, "record_id": 1, "set_name": 1 })
                    .options(
                        IndexOptions::builder()
                            .name("namespace_record_set_index".to_string())
                            .build(),
                    )
                    .build(),
                IndexModel::builder()
                    .keys(doc! { "namespace_id": 1, "record_id": 1 })
                    .options(
                        IndexOptions::builder()
                            .name("namespace_record_index".to_string())
                            .build(),
                    )
                    .build(),
            ])
            .await
            .map_err(|e| DepotError::Database(format!("Failed to create item indexes: {}", e)))?;

        Ok(Self {
            client: client.inner().clone(),
            db_name: client.db_name().to_string(),
            records,
            items,
        })
    }

    async fn apply_ops(&self, session: &mut ClientSession, batch: WriteBatch) -> Result<()> {
        for op in batch.into_ops() {
            match op {
                WriteOp::InsertRecord {
                    namespace,
                    record,
                    fields,
                    created_at,
                    updated_at,
                } => {
                    let root = doc! {
                        "namespace_id": &namespace,
                        "record_id": &record,
                        "created_at": created_at,
                        "updated_at": updated_at,
                        "fields": fields,
                    };

                    self.records
                        .insert_one(root)
                        .session(&mut *session)
                        .await
                        .map_err(|e| {
                            if is_duplicate_key(&e) {
                                DepotError::AlreadyExists(format!("{}/{}", namespace, record))
                            } else {
                                DepotError::Database(format!("Record insert failed: {}", e))
                            }
                        })?;
                }
                WriteOp::MergeRecord {
                    namespace,
                    record,
                    fields,
                    updated_at,
                } => {
                    // Dotted paths overwrite named fields only; payload
                    // validation guarantees keys are path-safe
                    let mut set_doc = doc! { "updated_at": updated_at };
                    for (key, value) in fields {
                        set_doc.insert(format!("fields.{}", key), value);
                    }

                    self.records
                        .update_one(
                            doc! { "namespace_id": namespace, "record_id": record },
                            doc! { "$set": set_doc },
                        )
                        .session(&mut *session)
                        .await
                        .map_err(|e| DepotError::Database(format!("Record merge failed: {}", e)))?;
                }
                WriteOp::InsertChild {
                    namespace,
                    record,
                    set,
                    fields,
                } => {
                    let item = doc! {
                        "namespace_id": namespace,
                        "record_id": record,
                        "set_name": set,
                        "data": fields,
                    };

                    self.items
                        .insert_one(item)
                        .session(&mut *session)
                        .await
                        .map_err(|e| DepotError::Database(format!("Child insert failed: {}", e)))?;
                }
                WriteOp::DeleteChild {
                    namespace,
                    record,
                    set,
                    item,
                } => {
                    let object_id = ObjectId::parse_str(&item).map_err(|e| {
                        DepotError::Database(format!("Invalid item id '{}': {}", item, e))
                    })?;

                    self.items
                        .delete_one(doc! {
                            "_id": object_id,
                            "namespace_id": namespace,
                            "record_id": record,
                            "set_name": set,
                        })
                        .session(&mut *session)
                        .await
                        .map_err(|e| DepotError::Database(format!("Child delete failed: {}", e)))?;
                }
                WriteOp::ClearChildSet {
                    namespace,
                    record,
                    set,
                } => {
                    self.items
                        .delete_many(doc! {
                            "namespace_id": namespace,
                            "record_id": record,
                            "set_name": set,
                        })
                        .session(&mut *session)
                        .await
                        .map_err(|e| DepotError::Database(format!("Child set clear failed: {}", e)))?;
                }
                WriteOp::DeleteRecord { namespace, record } => {
                    self.records
                        .delete_one(doc! { "namespace_id": namespace, "record_id": record })
                        .session(&mut *session)
                        .await
                        .map_err(|e| DepotError::Database(format!("Record delete failed: {}", e)))?;
                }
            }
        }

        Ok(())
    }
}

#[async_trait]
impl DocumentStore for MongoStore {
    async fn fetch_record(&self, namespace: &str, record: &str) -> Result<Option<StoredRecord>> {
        let found = self
            .records
            .find_one(doc! { "namespace_id": namespace, "record_id": record })
            .await
            .map_err(|e| DepotError::Database(format!("Record lookup failed: {}", e)))?;

        let Some(root) = found else {
            return Ok(None);
        };

        let created_at = *root.get_datetime("created_at").map_err(|e| {
            DepotError::Database(format!("Record {}/{} missing created_at: {}", namespace, record, e))
        })?;
        let updated_at = *root.get_datetime("updated_at").map_err(|e| {
            DepotError::Database(format!("Record {}/{} missing updated_at: {}", namespace, record, e))
        })?;
        let fields = root.get_document("fields").cloned().unwrap_or_default();

        Ok(Some(StoredRecord {
            fields,
            created_at,
            updated_at,
        }))
    }

    async fn record_exists(&self, namespace: &str, record: &str) -> Result<bool> {
        let found = self
            .records
            .find_one(doc! { "namespace_id": namespace, "record_id": record })
            .projection(doc! { "_id": 1 })
            .await
            .map_err(|e| DepotError::Database(format!("Record lookup failed: {}", e)))?;

        Ok(found.is_some())
    }

    async fn list_record_ids(
        &self,
        namespace: &str,
        after: Option<&str>,
        limit: usize,
    ) -> Result<Vec<String>> {
        let mut filter = doc! { "namespace_id": namespace };
        if let Some(cursor) = after {
            filter.insert("record_id", doc! { "$gt": cursor });
        }

        let mut cursor = self
            .records
            .find(filter)
            .sort(doc! { "record_id": 1 })
            .limit(limit as i64)
            .projection(doc! { "record_id": 1 })
            .await
            .map_err(|e| DepotError::Database(format!("Record scan failed: {}", e)))?;

        let mut ids = Vec::with_capacity(limit);
        while let Some(root) = cursor
            .try_next()
            .await
            .map_err(|e| DepotError::Database(format!("Record scan failed: {}", e)))?
        {
            if let Ok(id) = root.get_str("record_id") {
                ids.push(id.to_string());
            }
        }

        Ok(ids)
    }

    async fn list_child_sets(&self, namespace: &str, record: &str) -> Result<Vec<String>> {
        let values = self
            .items
            .distinct(
                "set_name",
                doc! { "namespace_id": namespace, "record_id": record },
            )
            .await
            .map_err(|e| DepotError::Database(format!("Child set scan failed: {}", e)))?;

        let mut sets: Vec<String> = values
            .into_iter()
            .filter_map(|v| v.as_str().map(|s| s.to_string()))
            .collect();
        sets.sort();

        Ok(sets)
    }

    async fn fetch_children(
        &self,
        namespace: &str,
        record: &str,
        set: &str,
    ) -> Result<Vec<Document>> {
        let mut cursor = self
            .items
            .find(doc! { "namespace_id": namespace, "record_id": record, "set_name": set })
            .sort(doc! { "_id": 1 })
            .await
            .map_err(|e| DepotError::Database(format!("Child scan failed: {}", e)))?;

        let mut children = Vec::new();
        while let Some(item) = cursor
            .try_next()
            .await
            .map_err(|e| DepotError::Database(format!("Child scan failed: {}", e)))?
        {
            if let Ok(data) = item.get_document("data") {
                children.push(data.clone());
            }
        }

        Ok(children)
    }

    async fn list_child_ids(&self, namespace: &str, record: &str, set: &str) -> Result<Vec<String>> {
        let mut cursor = self
            .items
            .find(doc! { "namespace_id": namespace, "record_id": record, "set_name": set })
            .sort(doc! { "_id": 1 })
            .projection(doc! { "_id": 1 })
            .await
            .map_err(|e| DepotError::Database(format!("Child scan failed: {}", e)))?;

        let mut ids = Vec::new();
        while let Some(item) = cursor
            .try_next()
            .await
            .map_err(|e| DepotError::Database(format!("Child scan failed: {}", e)))?
        {
            if let Ok(id) = item.get_object_id("_id") {
                ids.push(id.to_hex());
            }
        }

        Ok(ids)
    }

    async fn commit(&self, batch: WriteBatch) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }

        debug!("Committing batch of {} operations", batch.len());

        let mut session = self
            .client
            .start_session()
            .await
            .map_err(|e| DepotError::Database(format!("Failed to start session: {}", e)))?;

        session
            .start_transaction()
            .await
            .map_err(|e| DepotError::Database(format!("Failed to start transaction: {}", e)))?;

        match self.apply_ops(&mut session, batch).await {
            Ok(()) => session
                .commit_transaction()
                .await
                .map_err(|e| DepotError::Database(format!("Transaction commit failed: {}", e))),
            Err(err) => {
                if let Err(abort_err) = session.abort_transaction().await {
                    warn!("Failed to abort transaction: {}", abort_err);
                }
                Err(err)
            }
        }
    }

    async fn ping(&self) -> Result<()> {
        self.client
            .database(&self.db_name)
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| DepotError::Database(format!("MongoDB ping failed: {}", e)))?;

        Ok(())
    }
}

/// Duplicate-key write errors (code 11000) signal a conditional-create loss
fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    match &*err.kind {
        ErrorKind::Write(WriteFailure::WriteError(write_error)) => write_error.code == 11000,
        ErrorKind::Command(command_error) => command_error.code == 11000,
        _ => false,
    }
}
