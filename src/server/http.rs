//! HTTP server implementation
//!
//! Uses hyper http1 with TokioIo for async handling. One spawned task per
//! connection; routing is a match over the method and path segments.

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::auth::NamespaceDirectory;
use crate::config::Args;
use crate::routes;
use crate::storage::{Deleter, Synchronizer};
use crate::store::{DocumentStore, MemoryStore};
use crate::types::DepotError;

/// Shared application state
pub struct AppState {
    pub args: Args,
    /// Record store behind the storage API
    pub store: Arc<dyn DocumentStore>,
    /// Namespace directory for app secret checks. `None` skips authentication
    /// entirely (dev mode).
    pub directory: Option<Arc<dyn NamespaceDirectory>>,
    /// Write-side coordinator for record creation and updates
    pub synchronizer: Synchronizer,
    /// Cascading deleter for single records and whole namespaces
    pub deleter: Deleter,
    /// Process start, for uptime reporting
    pub started: Instant,
}

impl AppState {
    /// Create AppState around a store and an optional namespace directory
    pub fn new(
        args: Args,
        store: Arc<dyn DocumentStore>,
        directory: Option<Arc<dyn NamespaceDirectory>>,
    ) -> Self {
        let synchronizer = Synchronizer::new(Arc::clone(&store), args.max_batch_ops);
        let deleter = Deleter::new(
            Arc::clone(&store),
            args.max_batch_ops,
            args.wipe_page_size,
        );

        Self {
            args,
            store,
            directory,
            synchronizer,
            deleter,
            started: Instant::now(),
        }
    }

    /// Create AppState backed by the in-memory store with authentication
    /// disabled (dev mode)
    pub fn in_memory(args: Args) -> Self {
        Self::new(args, Arc::new(MemoryStore::new()), None)
    }
}

/// Start the HTTP server
pub async fn run(state: Arc<AppState>) -> Result<(), DepotError> {
    let listener = TcpListener::bind(state.args.listen).await?;

    info!(
        "Depot listening on {} as node {}",
        state.args.listen, state.args.node_id
    );

    if state.args.dev_mode {
        warn!("Development mode enabled - authentication disabled");
    }

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let io = TokioIo::new(stream);

                    let service = service_fn(move |req| {
                        let state = Arc::clone(&state);
                        async move { handle_request(state, addr, req).await }
                    });

                    if let Err(err) = http1::Builder::new()
                        .preserve_header_case(true)
                        .title_case_headers(true)
                        .serve_connection(io, service)
                        .await
                    {
                        error!("Error serving connection from {}: {:?}", addr, err);
                    }
                });
            }
            Err(e) => {
                error!("Error accepting connection: {:?}", e);
            }
        }
    }
}

/// Route incoming HTTP requests
async fn handle_request(
    state: Arc<AppState>,
    addr: SocketAddr,
    req: Request<Incoming>,
) -> Result<Response<Full<Bytes>>, hyper::Error> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    info!("[{}] {} {}", addr, method, path);

    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    let response = match (method, segments.as_slice()) {
        // Liveness probe - returns 200 whenever the process is up
        (Method::GET, ["health"]) | (Method::GET, ["healthz"]) => {
            routes::health_check(Arc::clone(&state))
        }

        // Readiness probe - returns 200 only if the store answers
        (Method::GET, ["ready"]) | (Method::GET, ["readyz"]) => {
            routes::readiness_check(Arc::clone(&state)).await
        }

        // Version info for deployment verification
        (Method::GET, ["version"]) => routes::version_info(),

        // CORS preflight
        (Method::OPTIONS, _) => preflight_response(),

        // ====================================================================
        // Storage API - /apps/{namespace}/storage[/{record}]
        // ====================================================================
        (Method::POST, ["apps", namespace, "storage"]) => {
            routes::handle_create(Arc::clone(&state), req, namespace).await
        }

        (Method::GET, ["apps", namespace, "storage", record_id]) => {
            routes::handle_get(Arc::clone(&state), req, namespace, record_id).await
        }

        (Method::PUT, ["apps", namespace, "storage", record_id]) => {
            routes::handle_update(Arc::clone(&state), req, namespace, record_id).await
        }

        (Method::DELETE, ["apps", namespace, "storage", record_id]) => {
            routes::handle_delete(Arc::clone(&state), req, namespace, record_id).await
        }

        // Namespace wipe - removes every record under the namespace
        (Method::DELETE, ["apps", namespace, "storage"]) => {
            routes::handle_wipe(Arc::clone(&state), req, namespace).await
        }

        // Not found
        _ => routes::storage::error_response(StatusCode::NOT_FOUND, "Not found"),
    };

    Ok(response)
}

/// CORS preflight response
fn preflight_response() -> Response<Full<Bytes>> {
    Response::builder()
        .status(StatusCode::OK)
        .header("Access-Control-Allow-Origin", "*")
        .header("Access-Control-Allow-Headers", "*")
        .header("Access-Control-Allow-Methods", "GET, POST, PUT, DELETE, OPTIONS")
        .body(Full::new(Bytes::new()))
        .unwrap()
}
