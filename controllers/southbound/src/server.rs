//! HTTP transport for the southbound handler.
//!
//! Callers are authenticated by a gateway in front of this service, which
//! forwards the tenant in `x-tenant-id` and the caller's roles in `x-roles`.

use crate::error::SouthboundError;
use crate::handler::{RegisterResponse, SouthboundHandler, StatusCode, UpdateStatusResponse};
use crate::policy::RequestContext;
use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode as HttpStatus},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::error;

pub const TENANT_HEADER: &str = "x-tenant-id";
pub const ROLES_HEADER: &str = "x-roles";

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub node_guid: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStatusRequest {
    pub node_guid: String,
    pub code: StatusCode,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

fn header_string(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Caller identity from gateway headers
pub fn request_context(headers: &HeaderMap) -> Result<RequestContext, SouthboundError> {
    let tenant = header_string(headers, TENANT_HEADER)
        .ok_or_else(|| SouthboundError::Unauthenticated(format!("missing {} header", TENANT_HEADER)))?;
    let roles = header_string(headers, ROLES_HEADER)
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    Ok(RequestContext { tenant, roles })
}

fn status_for(error: &SouthboundError) -> HttpStatus {
    match error {
        SouthboundError::Unauthenticated(_) => HttpStatus::UNAUTHORIZED,
        SouthboundError::InvalidNodeGuid(_) => HttpStatus::BAD_REQUEST,
        SouthboundError::NotFound(_) => HttpStatus::NOT_FOUND,
        _ => HttpStatus::INTERNAL_SERVER_ERROR,
    }
}

pub fn create_router(handler: Arc<SouthboundHandler>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/v1/register", post(register))
        .route("/v1/status", post(update_status))
        .layer(TraceLayer::new_for_http())
        .with_state(handler)
}

async fn healthz() -> &'static str {
    "ok"
}

/// Failures are reported as a bare `ERROR` result
async fn register(
    State(handler): State<Arc<SouthboundHandler>>,
    headers: HeaderMap,
    Json(request): Json<RegisterRequest>,
) -> Response {
    let result = match request_context(&headers) {
        Ok(ctx) => handler.register_cluster(&ctx, &request.node_guid).await,
        Err(e) => Err(e),
    };
    match result {
        Ok(response) => Json(response).into_response(),
        Err(e) => {
            error!(node = %request.node_guid, "Register failed: {}", e);
            (HttpStatus::INTERNAL_SERVER_ERROR, Json(RegisterResponse::error())).into_response()
        }
    }
}

async fn update_status(
    State(handler): State<Arc<SouthboundHandler>>,
    headers: HeaderMap,
    Json(request): Json<UpdateStatusRequest>,
) -> Result<Json<UpdateStatusResponse>, (HttpStatus, Json<ErrorBody>)> {
    let ctx = request_context(&headers).map_err(error_response)?;
    handler
        .update_cluster_status(&ctx, &request.node_guid, request.code)
        .await
        .map(Json)
        .map_err(|e| {
            error!(node = %request.node_guid, "Status update failed: {}", e);
            error_response(e)
        })
}

fn error_response(error: SouthboundError) -> (HttpStatus, Json<ErrorBody>) {
    (status_for(&error), Json(ErrorBody { error: error.to_string() }))
}
