//! System handlers: health, OpenAPI, unknown-route fallback.

use super::HealthResponse;
use crate::error::ApiError;
use axum::{Json, http::StatusCode, response::IntoResponse};

/// GET /health - Health check
#[utoipa::path(
    get,
    path = "/api/health",
    tag = "system",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    )
)]
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// GET /openapi.json - OpenAPI specification
#[utoipa::path(
    get,
    path = "/api/openapi.json",
    tag = "system",
    responses(
        (status = 200, description = "OpenAPI 3.1 specification in JSON format")
    )
)]
pub async fn openapi_spec() -> impl IntoResponse {
    use crate::api::openapi::ApiDoc;
    use utoipa::OpenApi;

    Json(ApiDoc::openapi())
}

/// Fallback for unknown `/api` paths
pub async fn api_not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, Json(ApiError::new("Not found")))
}
