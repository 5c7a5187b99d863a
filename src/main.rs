//! Depot - JSON record storage service
//!
//! Serves per-app storage over HTTP, backed by MongoDB.

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use depot::{
    auth::MongoNamespaceDirectory,
    config::Args,
    db::MongoClient,
    server,
    store::MongoStore,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    // Parse command line arguments
    let args = Args::parse();

    // Initialize tracing/logging
    let log_level = args.log_level.clone();
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("depot={},info", log_level).into());
    if std::env::var("DEPOT_LOG_JSON").is_ok() {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    // Validate configuration
    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    // Print startup banner
    info!("======================================");
    info!("  Depot - JSON record storage");
    info!("======================================");
    info!(
        "Version: {} ({}, built {})",
        env!("CARGO_PKG_VERSION"),
        option_env!("GIT_COMMIT_SHORT").unwrap_or("unknown"),
        option_env!("BUILD_TIMESTAMP").unwrap_or("unknown")
    );
    info!("Node ID: {}", args.node_id);
    info!("Listen: {}", args.listen);
    info!(
        "Mode: {}",
        if args.dev_mode { "DEVELOPMENT" } else { "PRODUCTION" }
    );
    info!("MongoDB: {}", args.mongodb_uri);
    info!("Batch ceiling: {} ops", args.max_batch_ops);
    info!("Wipe page size: {} records", args.wipe_page_size);
    info!("Max body: {} bytes", args.max_body_bytes);
    info!("======================================");

    // Pick the record store: MongoDB in production, process memory in dev.
    // Dev mode also drops the namespace directory, which disables app secret
    // checks entirely.
    let state = if args.dev_mode {
        warn!("Dev mode: in-memory store, records vanish on restart");
        server::AppState::in_memory(args)
    } else {
        let mongo = match MongoClient::new(&args.mongodb_uri, &args.mongodb_db).await {
            Ok(client) => {
                info!("MongoDB connected successfully");
                client
            }
            Err(e) => {
                error!("MongoDB connection failed: {}", e);
                std::process::exit(1);
            }
        };

        let store = match MongoStore::new(&mongo).await {
            Ok(store) => Arc::new(store),
            Err(e) => {
                error!("Storage collections unavailable: {}", e);
                std::process::exit(1);
            }
        };

        let directory = Arc::new(MongoNamespaceDirectory::new(mongo));
        server::AppState::new(args, store, Some(directory))
    };

    // Run the server
    if let Err(e) = server::run(Arc::new(state)).await {
        error!("Server error: {:?}", e);
        std::process::exit(1);
    }

    Ok(())
}
