//! Trusted Participants Handlers
//!
//! Whitelist maintenance, trustee negotiation between connectors and the
//! notifications a data trustee receives.

use axum::{
    extract::{OriginalUri, Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use std::sync::Arc;
use trustee_exchange::LogEntry;
use trustee_types::{
    verify_hash, DataExchangeEntry, DataExchangeState, DataTrusteeRequest, NegotiationReply,
    NegotiationRequest, NegotiationResponse, Participant, SenderRole, TrustedParticipantsResponse,
    TRUSTED_PARTICIPANTS_PATH,
};

use crate::dto::{
    MessageResponse, NegotiateBody, NotificationAck, ResponseMessage, UpdateEntryStateQuery,
};
use crate::error::{ApiError, ApiResult, ErrorResponse};
use crate::extractors::ApiJson;
use crate::state::AppState;

const RECEIVE_NEGOTIATION: &str = "/receive-negotiation";
const NEGOTIATE: &str = "/negotiate/";

// =============================================================================
// Whitelist
// =============================================================================

/// Add a data trustee to the whitelist
#[utoipa::path(
    post,
    path = "/api/trusted-participants/add",
    tag = "Trusted Participants",
    request_body = Participant,
    responses(
        (status = 200, description = "Participant added or already present", body = ResponseMessage)
    )
)]
pub async fn add_participant(
    State(state): State<Arc<AppState>>,
    ApiJson(participant): ApiJson<Participant>,
) -> Json<ResponseMessage> {
    tracing::info!(name = %participant.name, "Adding trusted participant");
    if state.whitelist.add(participant) {
        Json(ResponseMessage::new("Participant added successfully"))
    } else {
        Json(ResponseMessage::new("Participant already exists"))
    }
}

/// List the whitelist together with its hash
#[utoipa::path(
    get,
    path = "/api/trusted-participants/list",
    tag = "Trusted Participants",
    responses(
        (status = 200, description = "Current whitelist", body = TrustedParticipantsResponse)
    )
)]
pub async fn list_participants(
    State(state): State<Arc<AppState>>,
) -> Json<TrustedParticipantsResponse> {
    tracing::info!("Retrieving trusted participants");
    let participants = state.whitelist.list();
    let hash = trustee_types::compute_hash(&participants);
    Json(TrustedParticipantsResponse { participants, hash })
}

/// Remove a data trustee from the whitelist
#[utoipa::path(
    delete,
    path = "/api/trusted-participants/remove",
    tag = "Trusted Participants",
    request_body = Participant,
    responses(
        (status = 200, description = "Participant removed or not listed", body = ResponseMessage)
    )
)]
pub async fn remove_participant(
    State(state): State<Arc<AppState>>,
    ApiJson(participant): ApiJson<Participant>,
) -> Json<ResponseMessage> {
    tracing::info!(name = %participant.name, "Removing trusted participant");
    if state.whitelist.remove(&participant) {
        Json(ResponseMessage::new("Participant removed successfully"))
    } else {
        Json(ResponseMessage::new("Participant not found"))
    }
}

// =============================================================================
// Negotiation
// =============================================================================

/// Negotiate a commonly trusted data trustee with a counterparty
///
/// The counterparty URL is the rest of the path (percent-encoded or not) and
/// must point at the counterparty's `receive-negotiation` endpoint. The
/// counterparty's answer is passed through unchanged.
#[utoipa::path(
    post,
    path = "/api/trusted-participants/negotiate/{counter_party_url}",
    tag = "Trusted Participants",
    params(
        ("counter_party_url" = String, Path, description = "URL of the counterparty's receive-negotiation endpoint")
    ),
    request_body(content = NegotiateBody, description = "Assets to exchange, optional"),
    responses(
        (status = 200, description = "Counterparty answer"),
        (status = 400, description = "Malformed counterparty URL or body", body = ErrorResponse),
        (status = 502, description = "Counterparty unreachable", body = ErrorResponse)
    )
)]
pub async fn negotiate(
    State(state): State<Arc<AppState>>,
    Path(counter_party_url): Path<String>,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Response> {
    let counter_party_url = counter_party_url.trim_start_matches('/').to_string();
    let data_source_url = counter_party_url
        .find(RECEIVE_NEGOTIATION)
        .map(|idx| counter_party_url[..idx].to_string())
        .ok_or_else(|| {
            ApiError::BadRequest(format!(
                "Counterparty URL must point at {RECEIVE_NEGOTIATION}: {counter_party_url}"
            ))
        })?;
    url::Url::parse(&counter_party_url)
        .map_err(|e| ApiError::BadRequest(format!("Invalid counterparty URL: {e}")))?;

    let assets = parse_negotiate_body(&body)?
        .assets
        .unwrap_or_else(|| state.negotiation.default_assets.clone());
    let data_sink_url = match &state.negotiation.public_api_url {
        Some(url) => url.clone(),
        None => derive_data_sink_url(&headers, uri.path()),
    };

    let trusted_data_trustees = state.whitelist.list();
    let request = NegotiationRequest {
        data_source: Participant::anonymous("provider", data_source_url),
        data_sink: Participant::anonymous("consumer", data_sink_url),
        hash: trustee_types::compute_hash(&trusted_data_trustees),
        trusted_data_trustees,
        assets,
    };

    let reply_body = match state.client.send_negotiation(&counter_party_url, &request).await {
        Ok(body) => body,
        Err(e) => {
            tracing::warn!(counterparty = %counter_party_url, error = %e, "Failed to initiate negotiation");
            metrics::counter!("trustee_negotiations_total", "outcome" => "failed").increment(1);
            return Err(ApiError::BadGateway(format!(
                "Failed to send negotiation request: {e}"
            )));
        }
    };
    tracing::info!(counterparty = %counter_party_url, response = %reply_body, "Negotiation initiated");

    match serde_json::from_str::<NegotiationReply>(&reply_body) {
        Ok(NegotiationReply::Matched(response)) if response.trusted_data_trustee.has_url() => {
            metrics::counter!("trustee_negotiations_total", "outcome" => "matched").increment(1);
            let notification = DataTrusteeRequest::new(
                response.data_source,
                response.data_sink,
                response.assets,
                SenderRole::Consumer,
            );
            notify_trustee(&state, &response.trusted_data_trustee, &notification).await;
        }
        _ => {
            metrics::counter!("trustee_negotiations_total", "outcome" => "unmatched").increment(1);
            tracing::warn!("No commonly trusted data trustee found.");
        }
    }

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/json")],
        reply_body,
    )
        .into_response())
}

/// Answer a negotiation with the first whitelisted trustee both sides trust
#[utoipa::path(
    post,
    path = "/api/trusted-participants/receive-negotiation",
    tag = "Trusted Participants",
    request_body = NegotiationRequest,
    responses(
        (status = 200, description = "Chosen trustee, or a message that none is shared", body = NegotiationResponse),
        (status = 400, description = "Hash does not match the received list", body = ErrorResponse)
    )
)]
pub async fn receive_negotiation(
    State(state): State<Arc<AppState>>,
    ApiJson(request): ApiJson<NegotiationRequest>,
) -> ApiResult<Response> {
    tracing::info!("Received negotiation request");
    if !verify_hash(&request.trusted_data_trustees, &request.hash) {
        tracing::warn!("Hash mismatch: possible data tampering detected.");
        return Err(ApiError::HashMismatch);
    }

    let chosen = state
        .whitelist
        .list()
        .into_iter()
        .find(|ours| request.trusted_data_trustees.contains(ours))
        .filter(Participant::has_url);

    let Some(trustee) = chosen else {
        return Ok(Json(NegotiationReply::unmatched()).into_response());
    };

    let notification = DataTrusteeRequest::new(
        request.data_source.clone(),
        request.data_sink.clone(),
        request.assets.clone(),
        SenderRole::Provider,
    );
    notify_trustee(&state, &trustee, &notification).await;

    Ok(Json(NegotiationResponse {
        data_source: request.data_source,
        data_sink: request.data_sink,
        trusted_data_trustee: trustee,
        assets: request.assets,
    })
    .into_response())
}

async fn notify_trustee(state: &AppState, trustee: &Participant, notification: &DataTrusteeRequest) {
    match state.client.notify_trustee(&trustee.url, notification).await {
        Ok(body) => {
            tracing::info!(trustee = %trustee.name, response = %body, "Notification sent");
        }
        Err(e) => {
            tracing::warn!(trustee = %trustee.name, error = %e, "Failed to send notification");
        }
    }
}

fn parse_negotiate_body(body: &[u8]) -> ApiResult<NegotiateBody> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(NegotiateBody::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| ApiError::BadRequest(format!("Invalid negotiation body: {e}")))
}

/// Whitelist API URL of this connector as seen by the caller
fn derive_data_sink_url(headers: &HeaderMap, path: &str) -> String {
    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("localhost");
    let base = match path.find(TRUSTED_PARTICIPANTS_PATH) {
        Some(idx) => path[..idx + TRUSTED_PARTICIPANTS_PATH.len()].to_string(),
        None => {
            let prefix = path.find(NEGOTIATE).map(|idx| &path[..idx]).unwrap_or("");
            format!("{prefix}{TRUSTED_PARTICIPANTS_PATH}")
        }
    };
    format!("http://{host}{base}")
}

// =============================================================================
// Trustee Notifications
// =============================================================================

/// Record that a provider or consumer chose this connector as data trustee
#[utoipa::path(
    post,
    path = "/api/trusted-participants/notify",
    tag = "Trusted Participants",
    request_body = DataTrusteeRequest,
    responses(
        (status = 200, description = "Notification queued", body = NotificationAck),
        (status = 400, description = "Invalid sender type", body = ErrorResponse)
    )
)]
pub async fn notify(
    State(state): State<Arc<AppState>>,
    ApiJson(request): ApiJson<DataTrusteeRequest>,
) -> ApiResult<Json<NotificationAck>> {
    tracing::info!(request = %request, "Received notification");

    let entry_id = match request.sender() {
        Some(SenderRole::Provider) => {
            state
                .queue
                .add_provider_notification(request.data_source, request.assets)
                .await
        }
        Some(SenderRole::Consumer) => {
            state
                .queue
                .add_consumer_notification(request.data_sink, request.assets)
                .await
        }
        None => return Err(ApiError::BadRequest("Invalid sender type".to_string())),
    };
    metrics::counter!(
        "trustee_notifications_total",
        "sender" => request.sender_type.to_ascii_lowercase()
    )
    .increment(1);

    state.queue.process_entries();

    Ok(Json(NotificationAck {
        message: "Notification received".to_string(),
        entry_id,
    }))
}

/// Completion notice sent by a data trustee
#[utoipa::path(
    post,
    path = "/api/trusted-participants/notify-completion",
    tag = "Trusted Participants",
    responses(
        (status = 200, description = "Notice logged", body = MessageResponse)
    )
)]
pub async fn notify_completion(
    ApiJson(notification): ApiJson<std::collections::HashMap<String, String>>,
) -> Json<MessageResponse> {
    let message = notification.get("message").map(String::as_str).unwrap_or_default();
    let role = notification.get("role").map(String::as_str).unwrap_or_default();
    tracing::info!(role = %role, message = %message, "Received completion notification");
    Json(MessageResponse::new("Completion notification received."))
}

/// Move a data exchange entry to IN_PROGRESS or COMPLETED
#[utoipa::path(
    post,
    path = "/api/trusted-participants/update-entry-state",
    tag = "Trusted Participants",
    params(UpdateEntryStateQuery),
    responses(
        (status = 200, description = "State updated", body = MessageResponse),
        (status = 400, description = "Invalid state", body = ErrorResponse),
        (status = 404, description = "Entry not found or not in READY state", body = ErrorResponse)
    )
)]
pub async fn update_entry_state(
    State(state): State<Arc<AppState>>,
    Query(query): Query<UpdateEntryStateQuery>,
) -> ApiResult<Json<MessageResponse>> {
    let entry_id = query.entry_id.unwrap_or_default();
    let requested = query.new_state.unwrap_or_default();
    tracing::info!(entry_id = %entry_id, new_state = %requested, "Received request to update entry state");

    let new_state: DataExchangeState = requested
        .parse()
        .map_err(|_| ApiError::BadRequest("Invalid state value.".to_string()))?;
    if !matches!(new_state, DataExchangeState::InProgress | DataExchangeState::Completed) {
        return Err(ApiError::BadRequest(
            "Invalid state. Only IN_PROGRESS or COMPLETED allowed.".to_string(),
        ));
    }

    state
        .queue
        .update_entry_state_manually(&entry_id, new_state)
        .map_err(|_| ApiError::NotFound("Entry not found or not in READY state.".to_string()))?;

    Ok(Json(MessageResponse::new("State updated successfully.")))
}

/// Snapshot of the data exchange queue
#[utoipa::path(
    get,
    path = "/api/trusted-participants/data-exchange-entries",
    tag = "Trusted Participants",
    responses(
        (status = 200, description = "Queued entries", body = Vec<DataExchangeEntry>)
    )
)]
pub async fn data_exchange_entries(
    State(state): State<Arc<AppState>>,
) -> Json<Vec<DataExchangeEntry>> {
    tracing::info!("Retrieving current data exchange entries");
    Json(state.queue.entries())
}

/// Recent log events of this connector
#[utoipa::path(
    get,
    path = "/api/trusted-participants/logs",
    tag = "Trusted Participants",
    responses(
        (status = 200, description = "Buffered log events, oldest first")
    )
)]
pub async fn logs(State(state): State<Arc<AppState>>) -> Json<Vec<LogEntry>> {
    Json(state.logs.entries())
}
