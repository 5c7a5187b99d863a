//! MongoDB client and typed collection wrapper
//!
//! Raw `Document` collections used by the storage engine are accessed through
//! [`MongoClient::inner`]; schema-typed collections (namespaces) go through
//! [`MongoCollection`] which applies indexes on construction.

use bson::{doc, oid::ObjectId, DateTime, Document};
use futures_util::StreamExt;
use mongodb::{options::IndexOptions, results::UpdateResult, Client, Collection, IndexModel};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{error, info};

use crate::db::schemas::Metadata;
use crate::types::{DepotError, Result};

/// Index definitions a schema wants on its collection
pub trait IntoIndexes {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)>;
}

/// Access to the lifecycle metadata embedded in a schema
pub trait MutMetadata {
    fn mut_metadata(&mut self) -> &mut Metadata;
}

/// Connected MongoDB client, cheap to clone
#[derive(Clone)]
pub struct MongoClient {
    client: Client,
    db_name: String,
}

impl MongoClient {
    /// Connect and verify the deployment answers a ping.
    ///
    /// Server selection and connect timeouts are pinned to 3s so a wrong URI
    /// fails fast instead of hanging startup.
    pub async fn new(uri: &str, db_name: &str) -> Result<Self> {
        info!("Connecting to MongoDB at {}", uri);

        let sep = if uri.contains('?') { '&' } else { '?' };
        let tuned = format!("{uri}{sep}serverSelectionTimeoutMS=3000&connectTimeoutMS=3000");

        let client = Client::with_uri_str(&tuned)
            .await
            .map_err(|e| DepotError::Database(format!("Failed to connect to MongoDB: {}", e)))?;

        client
            .database(db_name)
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| DepotError::Database(format!("MongoDB ping failed: {}", e)))?;

        info!("Connected to MongoDB database '{}'", db_name);

        Ok(Self {
            client,
            db_name: db_name.to_string(),
        })
    }

    /// Open a schema-typed collection, creating its indexes
    pub async fn collection<T>(&self, name: &str) -> Result<MongoCollection<T>>
    where
        T: Serialize + DeserializeOwned + Unpin + Send + Sync + Default + IntoIndexes + MutMetadata,
    {
        MongoCollection::new(&self.client, &self.db_name, name).await
    }

    /// Raw driver client, for collections without a schema
    pub fn inner(&self) -> &Client {
        &self.client
    }

    pub fn db_name(&self) -> &str {
        &self.db_name
    }
}

/// Schema-typed collection.
///
/// Inserts stamp the embedded [`Metadata`]; reads exclude soft-deleted
/// documents, so deletion through [`MongoCollection::soft_delete`] is
/// invisible to every query that goes through this wrapper.
#[derive(Debug, Clone)]
pub struct MongoCollection<T>
where
    T: Serialize + DeserializeOwned + Unpin + Send + Sync,
{
    inner: Collection<T>,
}

/// Narrow a caller filter to documents that are not soft-deleted
fn live(mut filter: Document) -> Document {
    filter.insert("metadata.is_deleted", doc! { "$ne": true });
    filter
}

impl<T> MongoCollection<T>
where
    T: Serialize + DeserializeOwned + Unpin + Send + Sync + Default + IntoIndexes + MutMetadata,
{
    pub async fn new(client: &Client, db_name: &str, collection_name: &str) -> Result<Self> {
        let collection = Self {
            inner: client.database(db_name).collection::<T>(collection_name),
        };
        collection.apply_indexes().await?;
        Ok(collection)
    }

    async fn apply_indexes(&self) -> Result<()> {
        let models: Vec<IndexModel> = T::into_indices()
            .into_iter()
            .map(|(keys, opts)| IndexModel::builder().keys(keys).options(opts).build())
            .collect();

        if models.is_empty() {
            return Ok(());
        }

        self.inner
            .create_indexes(models)
            .await
            .map_err(|e| DepotError::Database(format!("Failed to create indexes: {}", e)))?;

        Ok(())
    }

    /// Insert a document, stamping its metadata timestamps
    pub async fn insert_one(&self, mut item: T) -> Result<ObjectId> {
        let now = DateTime::now();
        let metadata = item.mut_metadata();
        metadata.is_deleted = false;
        metadata.created_at = Some(now);
        metadata.updated_at = Some(now);

        let result = self
            .inner
            .insert_one(item)
            .await
            .map_err(|e| DepotError::Database(format!("Insert failed: {}", e)))?;

        result
            .inserted_id
            .as_object_id()
            .ok_or_else(|| DepotError::Database("Failed to get inserted ID".into()))
    }

    pub async fn find_one(&self, filter: Document) -> Result<Option<T>> {
        self.inner
            .find_one(live(filter))
            .await
            .map_err(|e| DepotError::Database(format!("Find failed: {}", e)))
    }

    /// Every live document matching the filter. Documents that fail to
    /// deserialize are logged and skipped rather than failing the whole read.
    pub async fn find_many(&self, filter: Document) -> Result<Vec<T>> {
        let mut cursor = self
            .inner
            .find(live(filter))
            .await
            .map_err(|e| DepotError::Database(format!("Find failed: {}", e)))?;

        let mut results = Vec::new();
        while let Some(item) = cursor.next().await {
            match item {
                Ok(doc) => results.push(doc),
                Err(e) => error!("Error reading document: {}", e),
            }
        }

        Ok(results)
    }

    pub async fn update_one(&self, filter: Document, update: Document) -> Result<UpdateResult> {
        self.inner
            .update_one(filter, update)
            .await
            .map_err(|e| DepotError::Database(format!("Update failed: {}", e)))
    }

    /// Mark a document deleted without removing it
    pub async fn soft_delete(&self, filter: Document) -> Result<UpdateResult> {
        let now = DateTime::now();
        let update = doc! {
            "$set": {
                "metadata.is_deleted": true,
                "metadata.deleted_at": now,
                "metadata.updated_at": now,
            }
        };

        self.update_one(filter, update).await
    }

    /// Underlying driver collection, for operations the wrapper lacks
    pub fn inner(&self) -> &Collection<T> {
        &self.inner
    }
}

#[cfg(test)]
mod tests {
    // Integration tests require a running MongoDB instance;
    // store-level behavior is covered against MemoryStore instead.
}
