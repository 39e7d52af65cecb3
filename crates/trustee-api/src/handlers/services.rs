//! Anonymisation Service Handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;
use trustee_types::ServiceDescriptor;

use crate::error::{ApiError, ApiResult, ErrorResponse};
use crate::extractors::ApiJson;
use crate::state::AppState;

/// Publish or replace a service
#[utoipa::path(
    post,
    path = "/api/services",
    tag = "Services",
    request_body = ServiceDescriptor,
    responses(
        (status = 201, description = "Service registered"),
        (status = 400, description = "id missing", body = ErrorResponse)
    )
)]
pub async fn add_service(
    State(state): State<Arc<AppState>>,
    ApiJson(descriptor): ApiJson<ServiceDescriptor>,
) -> ApiResult<StatusCode> {
    if descriptor.id.trim().is_empty() {
        return Err(ApiError::BadRequest("id missing".to_string()));
    }
    tracing::info!(service_id = %descriptor.id, "Service registered");
    state.services.add(descriptor);
    Ok(StatusCode::CREATED)
}

/// Withdraw a service
#[utoipa::path(
    delete,
    path = "/api/services/{id}",
    tag = "Services",
    params(("id" = String, Path, description = "Service id")),
    responses(
        (status = 204, description = "Service removed"),
        (status = 404, description = "Unknown service")
    )
)]
pub async fn remove_service(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> StatusCode {
    if state.services.remove(&id) {
        tracing::info!(service_id = %id, "Service removed");
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

/// Published services
#[utoipa::path(
    get,
    path = "/api/services",
    tag = "Services",
    responses(
        (status = 200, description = "All services", body = Vec<ServiceDescriptor>)
    )
)]
pub async fn list_services(State(state): State<Arc<AppState>>) -> Json<Vec<ServiceDescriptor>> {
    Json(state.services.list())
}

/// One published service
#[utoipa::path(
    get,
    path = "/api/services/{id}",
    tag = "Services",
    params(("id" = String, Path, description = "Service id")),
    responses(
        (status = 200, description = "Service", body = ServiceDescriptor),
        (status = 404, description = "Unknown service", body = ErrorResponse)
    )
)]
pub async fn get_service(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<ServiceDescriptor>> {
    state
        .services
        .get(&id)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("service {id} not found")))
}
