//! Application storage endpoints
//!
//! CRUD surface for per-namespace records and their child collections:
//!
//! - `POST   /apps/{namespace}/storage` — create a record
//! - `GET    /apps/{namespace}/storage/{record_id}` — read root fields
//! - `GET    /apps/{namespace}/storage/{record_id}?collection={name}` — read one child group
//! - `PUT    /apps/{namespace}/storage/{record_id}` — merge fields, replace named groups
//! - `DELETE /apps/{namespace}/storage/{record_id}` — cascading delete
//! - `DELETE /apps/{namespace}/storage` — namespace wipe
//!
//! Every route authenticates the `X-App-Secret` header against the namespace
//! directory; development mode runs without a directory and skips the check.

use bytes::Bytes;
use http_body_util::{BodyExt, Full, Limited};
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

use crate::auth::{validate_app_secret, APP_SECRET_HEADER};
use crate::server::AppState;
use crate::types::DepotError;

/// Map a storage error to its response status
fn status_for(err: &DepotError) -> StatusCode {
    match err {
        DepotError::AlreadyExists(_) => StatusCode::CONFLICT,
        DepotError::NotFound(_) => StatusCode::NOT_FOUND,
        DepotError::InvalidPayload(_) => StatusCode::BAD_REQUEST,
        DepotError::Auth(_) => StatusCode::UNAUTHORIZED,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn json_response<T: Serialize>(status: StatusCode, data: &T) -> Response<Full<Bytes>> {
    let body = serde_json::to_string(data)
        .unwrap_or_else(|_| r#"{"success":false,"error":"Serialization failed"}"#.to_string());

    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .body(Full::new(Bytes::from(body)))
        .unwrap()
}

/// Create error response
pub fn error_response(status: StatusCode, message: &str) -> Response<Full<Bytes>> {
    json_response(status, &json!({ "success": false, "error": message }))
}

/// Error response for failures coming out of the storage core. Store-level
/// detail stays in the logs; callers get a generic message for 500s.
fn failure(err: DepotError) -> Response<Full<Bytes>> {
    let status = status_for(&err);
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        warn!("Storage request failed: {}", err);
        return error_response(status, "Internal server error");
    }

    error_response(status, &err.to_string())
}

/// Validate the request's app secret; None means the request may proceed
async fn authorize(
    state: &AppState,
    req: &Request<Incoming>,
    namespace: &str,
) -> Option<Response<Full<Bytes>>> {
    // Dev mode runs without a namespace directory
    let directory = state.directory.as_ref()?;

    let presented = req
        .headers()
        .get(APP_SECRET_HEADER)
        .and_then(|v| v.to_str().ok());

    match validate_app_secret(directory.as_ref(), namespace, presented).await {
        Ok(outcome) => {
            let (status, message) = outcome.rejection()?;
            info!("Rejected request to namespace {}: {}", namespace, message);
            Some(error_response(
                StatusCode::from_u16(status).unwrap_or(StatusCode::UNAUTHORIZED),
                message,
            ))
        }
        Err(e) => Some(failure(e)),
    }
}

/// Read and parse a JSON request body, enforcing the size cap
async fn read_json_body(
    req: Request<Incoming>,
    max_bytes: usize,
) -> Result<serde_json::Value, Response<Full<Bytes>>> {
    let limited = Limited::new(req.into_body(), max_bytes);

    let bytes = match limited.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            if e.downcast_ref::<http_body_util::LengthLimitError>().is_some() {
                return Err(error_response(
                    StatusCode::PAYLOAD_TOO_LARGE,
                    "Request body too large",
                ));
            }
            return Err(error_response(StatusCode::BAD_REQUEST, "Invalid body"));
        }
    };

    serde_json::from_slice(&bytes)
        .map_err(|_| error_response(StatusCode::BAD_REQUEST, "Invalid JSON"))
}

/// Extract the `collection` query parameter, if present and non-empty
fn collection_param(query: Option<&str>) -> Option<String> {
    let query = query?;

    for pair in query.split('&') {
        if let Some((key, value)) = pair.split_once('=') {
            if key == "collection" {
                let decoded = urlencoding::decode(value).unwrap_or_default();
                if !decoded.is_empty() {
                    return Some(decoded.to_string());
                }
            }
        }
    }

    None
}

/// Handle POST /apps/{namespace}/storage
pub async fn handle_create(
    state: Arc<AppState>,
    req: Request<Incoming>,
    namespace: &str,
) -> Response<Full<Bytes>> {
    if let Some(rejection) = authorize(&state, &req, namespace).await {
        return rejection;
    }

    let payload = match read_json_body(req, state.args.max_body_bytes).await {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match state.synchronizer.create(namespace, payload).await {
        Ok(record_id) => {
            info!("Created record {}/{}", namespace, record_id);
            json_response(
                StatusCode::CREATED,
                &json!({ "success": true, "databaseId": record_id }),
            )
        }
        Err(e) => failure(e),
    }
}

/// Handle GET /apps/{namespace}/storage/{record_id}
///
/// With `?collection={name}` the members of one child group are returned
/// (empty array when the group is empty or unknown); otherwise the root
/// document, or 404 when the record does not exist.
pub async fn handle_get(
    state: Arc<AppState>,
    req: Request<Incoming>,
    namespace: &str,
    record_id: &str,
) -> Response<Full<Bytes>> {
    if let Some(rejection) = authorize(&state, &req, namespace).await {
        return rejection;
    }

    if let Some(set) = collection_param(req.uri().query()) {
        return match state
            .synchronizer
            .get_children(namespace, record_id, &set)
            .await
        {
            Ok(children) => {
                json_response(StatusCode::OK, &json!({ "success": true, "data": children }))
            }
            Err(e) => failure(e),
        };
    }

    match state.synchronizer.get(namespace, record_id).await {
        Ok(Some(data)) => json_response(StatusCode::OK, &json!({ "success": true, "data": data })),
        Ok(None) => error_response(StatusCode::NOT_FOUND, "Data not found"),
        Err(e) => failure(e),
    }
}

/// Handle PUT /apps/{namespace}/storage/{record_id}
pub async fn handle_update(
    state: Arc<AppState>,
    req: Request<Incoming>,
    namespace: &str,
    record_id: &str,
) -> Response<Full<Bytes>> {
    if let Some(rejection) = authorize(&state, &req, namespace).await {
        return rejection;
    }

    // Existence pre-check keeps 404 semantics out of the storage core
    match state.synchronizer.exists(namespace, record_id).await {
        Ok(true) => {}
        Ok(false) => return error_response(StatusCode::NOT_FOUND, "Data not found"),
        Err(e) => return failure(e),
    }

    let payload = match read_json_body(req, state.args.max_body_bytes).await {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match state
        .synchronizer
        .update(namespace, record_id, payload)
        .await
    {
        Ok(id) => {
            info!("Updated record {}/{}", namespace, id);
            json_response(StatusCode::OK, &json!({ "success": true, "databaseId": id }))
        }
        Err(e) => failure(e),
    }
}

/// Handle DELETE /apps/{namespace}/storage/{record_id}
pub async fn handle_delete(
    state: Arc<AppState>,
    req: Request<Incoming>,
    namespace: &str,
    record_id: &str,
) -> Response<Full<Bytes>> {
    if let Some(rejection) = authorize(&state, &req, namespace).await {
        return rejection;
    }

    match state.synchronizer.exists(namespace, record_id).await {
        Ok(true) => {}
        Ok(false) => return error_response(StatusCode::NOT_FOUND, "Data not found"),
        Err(e) => return failure(e),
    }

    match state.deleter.delete(namespace, record_id).await {
        Ok(()) => {
            info!("Deleted record {}/{}", namespace, record_id);
            json_response(
                StatusCode::OK,
                &json!({ "success": true, "message": "Data deleted successfully" }),
            )
        }
        Err(e) => failure(e),
    }
}

/// Handle DELETE /apps/{namespace}/storage (namespace wipe)
pub async fn handle_wipe(
    state: Arc<AppState>,
    req: Request<Incoming>,
    namespace: &str,
) -> Response<Full<Bytes>> {
    if let Some(rejection) = authorize(&state, &req, namespace).await {
        return rejection;
    }

    match state.deleter.delete_all(namespace).await {
        Ok(count) => {
            info!("Wiped namespace {} ({} records)", namespace, count);
            json_response(
                StatusCode::OK,
                &json!({ "success": true, "deletedCount": count }),
            )
        }
        Err(e) => failure(e),
    }
}
