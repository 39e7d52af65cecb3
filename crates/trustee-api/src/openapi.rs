//! OpenAPI Documentation

use utoipa::OpenApi;

use crate::dto;
use crate::error::ErrorResponse;
use crate::handlers;

/// Trustee API Documentation
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Trustee API",
        description = "Trusted participants whitelist, data trustee negotiation and asset exchange between dataspace connectors.",
        version = "0.1.0",
        license(
            name = "Apache-2.0",
            url = "https://www.apache.org/licenses/LICENSE-2.0"
        )
    ),
    servers(
        (url = "http://localhost:9191", description = "Local connector")
    ),
    paths(
        // Health
        handlers::health::health_check,
        handlers::health::participants_health,
        // Trusted participants
        handlers::participants::add_participant,
        handlers::participants::list_participants,
        handlers::participants::remove_participant,
        handlers::participants::negotiate,
        handlers::participants::receive_negotiation,
        handlers::participants::notify,
        handlers::participants::notify_completion,
        handlers::participants::update_entry_state,
        handlers::participants::data_exchange_entries,
        handlers::participants::logs,
        // Assets
        handlers::assets::upload_asset,
        handlers::assets::download_asset,
        // Transfers
        handlers::transfers::push,
        handlers::transfers::status,
        handlers::transfers::pull_transfer,
        handlers::transfers::merge,
        // Context
        handlers::context::get_context,
        handlers::context::put_context,
        // Services
        handlers::services::add_service,
        handlers::services::remove_service,
        handlers::services::list_services,
        handlers::services::get_service,
        // Policies
        handlers::policies::evaluate_policy,
    ),
    components(
        schemas(
            // Common
            ErrorResponse,
            handlers::health::HealthResponse,
            dto::ResponseMessage,
            dto::MessageResponse,
            // Trusted participants
            trustee_types::Participant,
            trustee_types::TrustedParticipantsResponse,
            trustee_types::NegotiationRequest,
            trustee_types::NegotiationResponse,
            trustee_types::DataTrusteeRequest,
            trustee_types::CompletionNotice,
            trustee_types::DataExchangeEntry,
            trustee_types::DataExchangeState,
            dto::NegotiateBody,
            dto::NotificationAck,
            // Transfers
            dto::PushRequest,
            dto::TransferAccepted,
            dto::TransferStarted,
            dto::TransferStatusResponse,
            // Context
            dto::ContextBody,
            dto::ContextResponse,
            // Services
            trustee_types::ServiceDescriptor,
            // Policies
            trustee_policy::Policy,
            trustee_policy::Rule,
            trustee_policy::AtomicConstraint,
            trustee_policy::Operator,
            trustee_policy::PolicyEvaluation,
            dto::EvaluatePolicyRequest,
        )
    ),
    tags(
        (name = "Health", description = "Service health"),
        (name = "Trusted Participants", description = "Whitelist, negotiation and trustee notifications"),
        (name = "Assets", description = "Local asset cache"),
        (name = "Transfers", description = "Push, pull-transfer and merge of assets"),
        (name = "Context", description = "Provider and consumer addresses per asset"),
        (name = "Services", description = "Anonymisation services"),
        (name = "Policies", description = "Policy evaluation against the whitelist")
    )
)]
pub struct ApiDoc;

/// Get the OpenAPI JSON specification
pub fn openapi_json() -> serde_json::Result<String> {
    ApiDoc::openapi().to_json()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_generation() {
        let spec = ApiDoc::openapi();
        assert_eq!(spec.info.title, "Trustee API");
        assert!(spec
            .paths
            .paths
            .contains_key("/api/trusted-participants/receive-negotiation"));
    }

    #[test]
    fn test_openapi_json() {
        let json = openapi_json().unwrap();
        assert!(json.contains("Trustee API"));
        assert!(json.contains("TrustedParticipantsResponse"));
    }
}
