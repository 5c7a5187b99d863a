//! Health check endpoints
//!
//! Kubernetes-style probes:
//! - /health, /healthz - Liveness probe (is the service running?)
//! - /ready, /readyz - Readiness probe (can the service reach its store?)
//!
//! Liveness never touches the store; readiness pings it, so a gateway with an
//! unreachable MongoDB is taken out of rotation without being restarted.

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde::Serialize;
use std::sync::Arc;

use crate::server::AppState;

/// Body shared by both probes
#[derive(Serialize)]
pub struct HealthResponse {
    pub healthy: bool,
    /// 'online' or 'degraded'
    pub status: &'static str,
    pub version: &'static str,
    /// Seconds since the server started
    pub uptime: u64,
    pub timestamp: String,
    /// 'development' or 'production'
    pub mode: String,
    pub node_id: String,
    /// 'memory' or 'mongodb'
    pub backend: &'static str,
    /// Set when the store is unreachable
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

fn build_health_response(state: &AppState) -> HealthResponse {
    let args = &state.args;
    let mode = if args.dev_mode { "development" } else { "production" };

    HealthResponse {
        healthy: true,
        status: "online",
        version: env!("CARGO_PKG_VERSION"),
        uptime: state.started.elapsed().as_secs(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        mode: mode.to_string(),
        node_id: args.node_id.to_string(),
        backend: if args.dev_mode { "memory" } else { "mongodb" },
        error: None,
    }
}

fn health_body(response: &HealthResponse, status: StatusCode) -> Response<Full<Bytes>> {
    let body = serde_json::to_string(response)
        .unwrap_or_else(|_| r#"{"healthy":false,"error":"Serialization failed"}"#.to_string());

    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .body(Full::new(Bytes::from(body)))
        .unwrap()
}

/// Handle liveness probe (/health, /healthz)
///
/// Returns 200 OK whenever the service is running, regardless of store
/// reachability.
pub fn health_check(state: Arc<AppState>) -> Response<Full<Bytes>> {
    let response = build_health_response(&state);
    health_body(&response, StatusCode::OK)
}

/// Handle readiness probe (/ready, /readyz)
///
/// Returns 200 OK only when the document store answers a ping. Use this for
/// load balancer health checks.
pub async fn readiness_check(state: Arc<AppState>) -> Response<Full<Bytes>> {
    let mut response = build_health_response(&state);

    let status = match state.store.ping().await {
        Ok(()) => StatusCode::OK,
        Err(e) => {
            response.healthy = false;
            response.status = "degraded";
            response.error = Some(format!("Store unreachable: {}", e));
            StatusCode::SERVICE_UNAVAILABLE
        }
    };

    health_body(&response, status)
}

/// Build stamp reported by /version, filled in by the build script
#[derive(Serialize)]
pub struct VersionResponse {
    pub version: &'static str,
    pub commit: &'static str,
    pub commit_full: &'static str,
    pub build_time: &'static str,
    pub service: &'static str,
}

/// Handle version endpoint (/version)
///
/// Lets deployments be checked against the commit they were built from.
pub fn version_info() -> Response<Full<Bytes>> {
    let response = VersionResponse {
        version: env!("CARGO_PKG_VERSION"),
        commit: option_env!("GIT_COMMIT_SHORT").unwrap_or("unknown"),
        commit_full: option_env!("GIT_COMMIT_FULL").unwrap_or("unknown"),
        build_time: option_env!("BUILD_TIMESTAMP").unwrap_or("unknown"),
        service: "depot",
    };

    let body = serde_json::to_string(&response)
        .unwrap_or_else(|_| r#"{"version":"unknown","commit":"unknown"}"#.to_string());

    Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .body(Full::new(Bytes::from(body)))
        .unwrap()
}
