//! Exchange Context Handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use crate::dto::{ContextBody, ContextResponse};
use crate::error::{ApiError, ApiResult, ErrorResponse};
use crate::extractors::ApiJson;
use crate::state::AppState;

/// Provider and consumer base URLs of a queued asset
#[utoipa::path(
    get,
    path = "/api/context/{asset_id}",
    tag = "Context",
    params(("asset_id" = String, Path, description = "Context key, `{entryId}::{asset}`")),
    responses(
        (status = 200, description = "Exchange endpoints", body = ContextResponse),
        (status = 404, description = "No context for the asset", body = ErrorResponse)
    )
)]
pub async fn get_context(
    State(state): State<Arc<AppState>>,
    Path(asset_id): Path<String>,
) -> ApiResult<Json<ContextResponse>> {
    let endpoints = state.context.get(&asset_id).ok_or_else(|| {
        ApiError::NotFound(format!("No exchange context found for asset {asset_id}"))
    })?;
    Ok(Json(ContextResponse {
        provider: endpoints.provider,
        consumer: endpoints.consumer,
    }))
}

/// Set the provider and consumer base URLs of an asset
#[utoipa::path(
    post,
    path = "/api/context/{asset_id}",
    tag = "Context",
    params(("asset_id" = String, Path, description = "Context key, `{entryId}::{asset}`")),
    request_body = ContextBody,
    responses(
        (status = 204, description = "Context stored"),
        (status = 400, description = "provider / consumer missing", body = ErrorResponse)
    )
)]
pub async fn put_context(
    State(state): State<Arc<AppState>>,
    Path(asset_id): Path<String>,
    ApiJson(body): ApiJson<ContextBody>,
) -> ApiResult<StatusCode> {
    let present = |v: Option<String>| v.filter(|s| !s.trim().is_empty());
    let (Some(provider), Some(consumer)) = (present(body.provider), present(body.consumer)) else {
        return Err(ApiError::BadRequest("provider / consumer missing".to_string()));
    };
    tracing::info!(asset_id = %asset_id, provider = %provider, consumer = %consumer, "Context set");
    state.context.put(asset_id, provider, consumer);
    Ok(StatusCode::NO_CONTENT)
}
