//! Authentication for depot
//!
//! Storage requests authenticate with a per-namespace app secret, looked up
//! through the namespace directory. Development mode bypasses the check.

pub mod app_secret;
pub mod directory;

pub use app_secret::{validate_app_secret, AuthOutcome, APP_SECRET_HEADER};
pub use directory::{MongoNamespaceDirectory, NamespaceDirectory};
