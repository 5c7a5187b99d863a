//! Namespace document schema
//!
//! One document per provisioned application namespace. Storage requests are
//! authenticated against the namespace's secret before any record access.

use bson::{doc, oid::ObjectId, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;

/// Collection name for namespaces
pub const NAMESPACE_COLLECTION: &str = "namespaces";

/// Namespace document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct NamespaceDoc {
    /// MongoDB document ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    /// Common metadata (created_at, updated_at, is_deleted)
    #[serde(default)]
    pub metadata: Metadata,

    /// Namespace identifier used in request paths
    pub namespace_id: String,

    /// Human-readable application name
    pub name: String,

    /// Shared secret presented in the X-App-Secret header
    pub secret: String,

    /// Legacy alias for `secret`, checked interchangeably when present
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_secret: Option<String>,

    /// Whether the namespace accepts requests
    #[serde(default = "default_true")]
    pub is_enabled: bool,

    /// Optional lifecycle status; "inactive" blocks requests like
    /// is_enabled == false does
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,

    /// Message returned when a disabled namespace is contacted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disabled_message: Option<String>,
}

fn default_true() -> bool {
    true
}

impl NamespaceDoc {
    /// Create a new namespace document
    pub fn new(namespace_id: String, name: String, secret: String) -> Self {
        Self {
            _id: None,
            metadata: Metadata::new(),
            namespace_id,
            name,
            secret,
            app_secret: None,
            is_enabled: true,
            status: None,
            disabled_message: None,
        }
    }

    /// Check a presented secret against the stored secret or its legacy alias
    pub fn matches_secret(&self, presented: &str) -> bool {
        if !self.secret.is_empty() && self.secret == presented {
            return true;
        }

        match &self.app_secret {
            Some(alias) => !alias.is_empty() && alias == presented,
            None => false,
        }
    }

    /// Whether the namespace is currently serving requests
    pub fn is_active(&self) -> bool {
        if !self.metadata.is_live() || !self.is_enabled {
            return false;
        }

        !matches!(self.status.as_deref(), Some("inactive"))
    }
}

impl IntoIndexes for NamespaceDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            // Unique index on namespace_id
            (
                doc! { "namespace_id": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("namespace_id_unique".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl MutMetadata for NamespaceDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
