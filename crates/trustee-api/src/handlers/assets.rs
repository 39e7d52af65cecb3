//! Asset Handlers
//!
//! Local cache of asset payloads. Peers push payloads here and the
//! management API of this connector points its data addresses at it.

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use std::sync::Arc;

use crate::error::{ApiResult, ErrorResponse};
use crate::state::AppState;

/// Store an asset payload
#[utoipa::path(
    post,
    path = "/api/assets/{id}/binary",
    tag = "Assets",
    params(("id" = String, Path, description = "Asset id")),
    request_body(content = String, content_type = "application/octet-stream"),
    responses(
        (status = 201, description = "Asset stored"),
        (status = 400, description = "Invalid asset id", body = ErrorResponse)
    )
)]
pub async fn upload_asset(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Bytes,
) -> ApiResult<StatusCode> {
    let size = body.len();
    state.store.save(&id, body).await?;
    tracing::info!(asset_id = %id, size, "Asset stored");
    Ok(StatusCode::CREATED)
}

/// Read an asset payload
#[utoipa::path(
    get,
    path = "/api/assets/{id}/binary",
    tag = "Assets",
    params(("id" = String, Path, description = "Asset id")),
    responses(
        (status = 200, description = "Asset payload", content_type = "application/json"),
        (status = 404, description = "Unknown asset", body = ErrorResponse)
    )
)]
pub async fn download_asset(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    let payload = state.store.load(&id).await?;
    Ok(([(header::CONTENT_TYPE, "application/json")], payload).into_response())
}
