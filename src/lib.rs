//! Depot - JSON record storage service
//!
//! Depot gives client apps a namespaced document store over HTTP, backed by
//! MongoDB. Each app authenticates with a shared secret and gets its own
//! namespace of records with named child collections.
//!
//! ## Pieces
//!
//! - **Storage**: record create/update/read with payload partitioning and
//!   ISO-8601 date promotion
//! - **Wipe**: cascading record deletes and paginated namespace teardown
//! - **Store**: the `DocumentStore` seam with MongoDB and in-memory backends
//! - **Auth**: app secret checks against the namespace directory

pub mod auth;
pub mod config;
pub mod db;
pub mod routes;
pub mod server;
pub mod storage;
pub mod store;
pub mod types;

pub use config::Args;
pub use server::{run, AppState};
pub use types::{DepotError, Result};
