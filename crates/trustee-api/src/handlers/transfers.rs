//! Transfer Handlers
//!
//! Moving asset payloads between connectors. Transfers run in the
//! background; their outcome is polled through the status endpoint.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde_json::Value;
use std::sync::Arc;
use trustee_exchange::MergeMode;

use crate::dto::{
    MergeQuery, PullTransferQuery, PushRequest, TransferAccepted, TransferStarted,
    TransferStatusResponse,
};
use crate::error::{ApiResult, ErrorResponse};
use crate::extractors::ValidatedJson;
use crate::state::AppState;

/// Push a cached asset to another connector
#[utoipa::path(
    post,
    path = "/api/transfers/push",
    tag = "Transfers",
    request_body = PushRequest,
    responses(
        (status = 202, description = "Push started", body = TransferAccepted),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 404, description = "Asset not cached", body = ErrorResponse)
    )
)]
pub async fn push(
    State(state): State<Arc<AppState>>,
    ValidatedJson(request): ValidatedJson<PushRequest>,
) -> ApiResult<(StatusCode, Json<TransferAccepted>)> {
    let transfer_id = state
        .pipeline
        .push(&request.asset_id, &request.target_url)
        .await?;
    metrics::counter!("trustee_transfers_started_total").increment(1);
    Ok((StatusCode::ACCEPTED, Json(TransferAccepted { transfer_id })))
}

/// State of a background transfer
#[utoipa::path(
    get,
    path = "/api/transfers/status/{id}",
    tag = "Transfers",
    params(("id" = String, Path, description = "Transfer id")),
    responses(
        (status = 200, description = "Transfer state", body = TransferStatusResponse)
    )
)]
pub async fn status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Json<TransferStatusResponse> {
    let transfer_state = state.pipeline.transfers().state_of(&id);
    Json(TransferStatusResponse {
        state: transfer_state.to_string(),
    })
}

/// Pull an asset from its provider, optionally anonymise it, and push it to the consumer
#[utoipa::path(
    post,
    path = "/api/transfers/pull-transfer",
    tag = "Transfers",
    params(PullTransferQuery),
    responses(
        (status = 202, description = "Transfer started", body = TransferStarted),
        (status = 400, description = "Unknown service", body = ErrorResponse),
        (status = 404, description = "No exchange context for the asset", body = ErrorResponse),
        (status = 500, description = "Processing failed", body = ErrorResponse),
        (status = 502, description = "Provider unreachable", body = ErrorResponse)
    )
)]
pub async fn pull_transfer(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PullTransferQuery>,
) -> ApiResult<(StatusCode, Json<TransferStarted>)> {
    let service_id = query.service_id.as_deref().or(query.transform.as_deref());
    tracing::info!(asset_id = %query.asset_id, service_id = ?service_id, "Pull transfer requested");

    let transfer_id = state
        .pipeline
        .pull_transfer(&query.asset_id, service_id)
        .await?;
    metrics::counter!("trustee_transfers_started_total").increment(1);

    Ok((
        StatusCode::ACCEPTED,
        Json(TransferStarted {
            message: "Transfer started".to_string(),
            transfer_id,
        }),
    ))
}

/// Merge the assets of one or all exchanges into one document and push it to the consumer
#[utoipa::path(
    post,
    path = "/api/transfers/merge",
    tag = "Transfers",
    params(MergeQuery),
    responses(
        (status = 200, description = "Merged document"),
        (status = 400, description = "Unknown service", body = ErrorResponse),
        (status = 404, description = "No assets to merge", body = ErrorResponse),
        (status = 500, description = "An asset could not be merged", body = ErrorResponse)
    )
)]
pub async fn merge(
    State(state): State<Arc<AppState>>,
    Query(query): Query<MergeQuery>,
) -> ApiResult<Json<Value>> {
    let mode = MergeMode::parse(query.mode.as_deref());
    let merged = state
        .pipeline
        .merge(query.entry_id.as_deref(), mode, query.service_id.as_deref())
        .await?;
    metrics::counter!("trustee_transfers_started_total").increment(1);
    Ok(Json(merged))
}
