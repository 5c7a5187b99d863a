//! Lifecycle metadata embedded in every schema document
//!
//! Stamped by the collection wrapper on insert; soft deletion flips
//! `is_deleted` instead of removing the document.

use bson::DateTime;
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct Metadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime>,

    /// Soft-deleted documents stay in the collection but are excluded from
    /// every read that goes through the collection wrapper
    #[serde(default)]
    pub is_deleted: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime>,
}

impl Metadata {
    pub fn new() -> Self {
        let now = DateTime::now();
        Self {
            created_at: Some(now),
            updated_at: Some(now),
            is_deleted: false,
            deleted_at: None,
        }
    }

    /// Whether the document is visible to reads
    pub fn is_live(&self) -> bool {
        !self.is_deleted
    }
}
