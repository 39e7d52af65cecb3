//! Health Check Handlers

use axum::Json;
use serde::Serialize;
use utoipa::ToSchema;

use crate::dto::ResponseMessage;

/// Answer of the whitelist API health endpoint
pub const READY_MESSAGE: &str = "Web server running on Connector and ready for requests";

/// Health check response
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Service status
    pub status: String,
    /// Service version
    pub version: String,
    /// Timestamp
    pub timestamp: i64,
}

/// Health check endpoint
///
/// Returns 200 if the service is running.
#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    )
)]
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: chrono::Utc::now().timestamp_millis(),
    })
}

/// Health of the whitelist API
#[utoipa::path(
    get,
    path = "/api/trusted-participants/health",
    tag = "Trusted Participants",
    responses(
        (status = 200, description = "Web server is up", body = ResponseMessage)
    )
)]
pub async fn participants_health() -> Json<ResponseMessage> {
    tracing::info!("Received a health request");
    Json(ResponseMessage::new(READY_MESSAGE))
}
