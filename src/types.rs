//! Error types for depot
//!
//! A single service-wide error enum. Store- and payload-level failures are
//! converted at the operation boundary into structured JSON error responses;
//! callers must check the `success` flag, stack traces never leave the
//! process.

use thiserror::Error;

/// All errors the service can surface
#[derive(Error, Debug)]
pub enum DepotError {
    /// Create-time collision on a caller-supplied record id
    #[error("Record already exists: {0}")]
    AlreadyExists(String),

    /// Lookup against a record or namespace that does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Payload rejected before any write (shape or reserved-key violation)
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// App-secret validation failure
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Underlying document store failure
    #[error("Database error: {0}")]
    Database(String),

    /// HTTP transport failure
    #[error("HTTP error: {0}")]
    Http(String),

    /// Anything that should never happen in normal operation
    #[error("Internal error: {0}")]
    Internal(String),

    /// I/O failure (listener setup, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<mongodb::error::Error> for DepotError {
    fn from(e: mongodb::error::Error) -> Self {
        DepotError::Database(e.to_string())
    }
}

impl From<bson::ser::Error> for DepotError {
    fn from(e: bson::ser::Error) -> Self {
        DepotError::Database(format!("BSON encode failed: {}", e))
    }
}

impl From<bson::de::Error> for DepotError {
    fn from(e: bson::de::Error) -> Self {
        DepotError::Database(format!("BSON decode failed: {}", e))
    }
}

impl From<serde_json::Error> for DepotError {
    fn from(e: serde_json::Error) -> Self {
        DepotError::InvalidPayload(e.to_string())
    }
}

impl From<hyper::Error> for DepotError {
    fn from(e: hyper::Error) -> Self {
        DepotError::Http(e.to_string())
    }
}

/// Convenience alias used throughout the crate
pub type Result<T> = std::result::Result<T, DepotError>;
