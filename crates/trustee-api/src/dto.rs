//! Request and response bodies that are not domain types

use serde::{Deserialize, Serialize};
use trustee_policy::Policy;
use trustee_types::Participant;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

// =============================================================================
// Trusted Participants
// =============================================================================

/// `{"response": ...}` acknowledgement used by the whitelist endpoints
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ResponseMessage {
    pub response: String,
}

impl ResponseMessage {
    pub fn new(response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
        }
    }
}

/// `{"message": ...}` acknowledgement
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Optional body of a negotiation initiation
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct NegotiateBody {
    /// Assets to exchange; defaults to the configured assets
    #[serde(default)]
    pub assets: Option<Vec<String>>,
}

/// Answer to a trustee notification
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NotificationAck {
    pub message: String,
    pub entry_id: String,
}

#[derive(Debug, Clone, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct UpdateEntryStateQuery {
    pub entry_id: Option<String>,
    /// `IN_PROGRESS` or `COMPLETED`
    pub new_state: Option<String>,
}

// =============================================================================
// Transfers
// =============================================================================

/// Push a stored asset to a target connector
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PushRequest {
    #[validate(length(min = 1, message = "assetId missing"))]
    pub asset_id: String,
    #[validate(url(message = "targetUrl must be a URL"))]
    pub target_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TransferAccepted {
    pub transfer_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TransferStarted {
    pub message: String,
    pub transfer_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TransferStatusResponse {
    /// `UNKNOWN`, `RUNNING`, `COMPLETED` or `ERROR`
    pub state: String,
}

#[derive(Debug, Clone, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct PullTransferQuery {
    /// Raw asset id, without the entry prefix
    pub asset_id: String,
    /// Legacy name for `serviceId`
    pub transform: Option<String>,
    /// Anonymisation service to apply
    pub service_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct MergeQuery {
    /// Restrict the merge to one data exchange entry
    pub entry_id: Option<String>,
    /// `array` (default) or `object`
    pub mode: Option<String>,
    pub service_id: Option<String>,
}

// =============================================================================
// Exchange Context
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct ContextBody {
    pub provider: Option<String>,
    pub consumer: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ContextResponse {
    pub provider: String,
    pub consumer: String,
}

// =============================================================================
// Policies
// =============================================================================

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct EvaluatePolicyRequest {
    pub policy: Policy,
    pub counterparty: Participant,
}
