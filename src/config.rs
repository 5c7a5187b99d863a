//! Configuration for depot
//!
//! CLI arguments and environment variable handling using clap.

use clap::Parser;
use std::net::SocketAddr;
use uuid::Uuid;

/// depot - per-application document storage gateway
#[derive(Parser, Debug, Clone)]
#[command(name = "depot")]
#[command(about = "HTTP storage gateway - records, child collections, hierarchical deletion")]
pub struct Args {
    /// Unique node identifier for this gateway instance
    #[arg(long, env = "NODE_ID", default_value_t = Uuid::new_v4())]
    pub node_id: Uuid,

    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:8380")]
    pub listen: SocketAddr,

    /// MongoDB connection URI
    #[arg(long, env = "MONGODB_URI", default_value = "mongodb://localhost:27017")]
    pub mongodb_uri: String,

    /// MongoDB database name
    #[arg(long, env = "MONGODB_DB", default_value = "depot")]
    pub mongodb_db: String,

    /// Enable development mode (in-memory store, app-secret checks disabled)
    #[arg(long, env = "DEV_MODE", default_value = "false")]
    pub dev_mode: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Maximum write operations per atomic batch; larger synchronizer and
    /// deleter batches are chunked into sequential commits
    #[arg(long, env = "MAX_BATCH_OPS", default_value = "500")]
    pub max_batch_ops: usize,

    /// Records per page for namespace wipes (each page commits as one batch)
    #[arg(long, env = "WIPE_PAGE_SIZE", default_value = "50")]
    pub wipe_page_size: usize,

    /// Maximum accepted request body size in bytes
    #[arg(long, env = "MAX_BODY_BYTES", default_value = "1048576")]
    pub max_body_bytes: usize,
}

impl Args {
    /// Validate configuration before startup
    pub fn validate(&self) -> Result<(), String> {
        if self.max_batch_ops <= 1 {
            return Err("MAX_BATCH_OPS must be greater than 1".to_string());
        }

        if self.wipe_page_size < 1 {
            return Err("WIPE_PAGE_SIZE must be at least 1".to_string());
        }

        if self.wipe_page_size > self.max_batch_ops {
            return Err("WIPE_PAGE_SIZE must not exceed MAX_BATCH_OPS".to_string());
        }

        if self.max_body_bytes == 0 {
            return Err("MAX_BODY_BYTES must be greater than 0".to_string());
        }

        Ok(())
    }
}
