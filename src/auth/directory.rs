//! Namespace directory
//!
//! Lookup and management of provisioned namespaces. The trait seam keeps
//! request handlers testable without a live database.

use bson::doc;

use crate::db::schemas::{NamespaceDoc, NAMESPACE_COLLECTION};
use crate::db::MongoClient;
use crate::types::Result;

/// Lookup seam for namespace documents
#[async_trait::async_trait]
pub trait NamespaceDirectory: Send + Sync {
    /// Fetch one namespace by its caller-visible id; soft-deleted namespaces
    /// are invisible
    async fn fetch(&self, namespace_id: &str) -> Result<Option<NamespaceDoc>>;
}

/// MongoDB-backed directory over the `namespaces` collection
#[derive(Clone)]
pub struct MongoNamespaceDirectory {
    mongo: MongoClient,
}

impl MongoNamespaceDirectory {
    pub fn new(mongo: MongoClient) -> Self {
        Self { mongo }
    }

    /// Insert a new namespace document
    pub async fn create(&self, namespace: NamespaceDoc) -> Result<()> {
        let collection = self
            .mongo
            .collection::<NamespaceDoc>(NAMESPACE_COLLECTION)
            .await?;
        collection.insert_one(namespace).await?;
        Ok(())
    }

    /// Replace the secret of an existing namespace; returns false when the
    /// namespace does not exist
    pub async fn rotate_secret(&self, namespace_id: &str, secret: &str) -> Result<bool> {
        let collection = self
            .mongo
            .collection::<NamespaceDoc>(NAMESPACE_COLLECTION)
            .await?;

        let result = collection
            .update_one(
                doc! { "namespace_id": namespace_id },
                doc! { "$set": {
                    "secret": secret,
                    "metadata.updated_at": bson::DateTime::now(),
                } },
            )
            .await?;

        Ok(result.matched_count > 0)
    }

    /// Enable or disable a namespace. The message, when given, is returned to
    /// callers of a disabled namespace; enabling clears it.
    pub async fn set_enabled(
        &self,
        namespace_id: &str,
        enabled: bool,
        message: Option<&str>,
    ) -> Result<bool> {
        let collection = self
            .mongo
            .collection::<NamespaceDoc>(NAMESPACE_COLLECTION)
            .await?;

        let disabled_message = match message {
            Some(m) if !enabled => bson::Bson::String(m.to_string()),
            _ => bson::Bson::Null,
        };

        let result = collection
            .update_one(
                doc! { "namespace_id": namespace_id },
                doc! { "$set": {
                    "is_enabled": enabled,
                    "disabled_message": disabled_message,
                    "metadata.updated_at": bson::DateTime::now(),
                } },
            )
            .await?;

        Ok(result.matched_count > 0)
    }

    /// Soft-delete a namespace
    pub async fn remove(&self, namespace_id: &str) -> Result<bool> {
        let collection = self
            .mongo
            .collection::<NamespaceDoc>(NAMESPACE_COLLECTION)
            .await?;

        let result = collection
            .soft_delete(doc! { "namespace_id": namespace_id })
            .await?;

        Ok(result.matched_count > 0)
    }

    /// Every live namespace
    pub async fn list(&self) -> Result<Vec<NamespaceDoc>> {
        let collection = self
            .mongo
            .collection::<NamespaceDoc>(NAMESPACE_COLLECTION)
            .await?;

        collection.find_many(doc! {}).await
    }
}

#[async_trait::async_trait]
impl NamespaceDirectory for MongoNamespaceDirectory {
    async fn fetch(&self, namespace_id: &str) -> Result<Option<NamespaceDoc>> {
        let collection = self
            .mongo
            .collection::<NamespaceDoc>(NAMESPACE_COLLECTION)
            .await?;

        collection
            .find_one(doc! { "namespace_id": namespace_id })
            .await
    }
}

/// Map-backed directory for tests
#[cfg(test)]
#[derive(Default)]
pub struct MemoryDirectory {
    namespaces: std::collections::HashMap<String, NamespaceDoc>,
}

#[cfg(test)]
impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, namespace: NamespaceDoc) {
        self.namespaces
            .insert(namespace.namespace_id.clone(), namespace);
    }
}

#[cfg(test)]
#[async_trait::async_trait]
impl NamespaceDirectory for MemoryDirectory {
    async fn fetch(&self, namespace_id: &str) -> Result<Option<NamespaceDoc>> {
        Ok(self
            .namespaces
            .get(namespace_id)
            .filter(|ns| ns.metadata.is_live())
            .cloned())
    }
}
