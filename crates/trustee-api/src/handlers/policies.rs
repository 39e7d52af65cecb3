//! Policy Handlers

use axum::{extract::State, Json};
use std::sync::Arc;
use trustee_policy::{PolicyContext, PolicyEvaluation};

use crate::dto::EvaluatePolicyRequest;
use crate::error::ErrorResponse;
use crate::extractors::ApiJson;
use crate::state::AppState;

/// Evaluate a policy for a counterparty
///
/// Constraints on `trustedParticipant` are checked against this connector's
/// whitelist. Unknown left operands are reported as problems and fail their
/// rule.
#[utoipa::path(
    post,
    path = "/api/policies/evaluate",
    tag = "Policies",
    request_body = EvaluatePolicyRequest,
    responses(
        (status = 200, description = "Evaluation outcome", body = PolicyEvaluation),
        (status = 400, description = "Malformed policy", body = ErrorResponse)
    )
)]
pub async fn evaluate_policy(
    State(state): State<Arc<AppState>>,
    ApiJson(request): ApiJson<EvaluatePolicyRequest>,
) -> Json<PolicyEvaluation> {
    let context = PolicyContext::new(request.counterparty);
    let evaluation = state.policy.evaluate(&request.policy, &context);
    tracing::info!(
        counterparty = %context.counterparty.name,
        passed = evaluation.passed,
        rules_checked = evaluation.rules_checked.len(),
        "Policy evaluated"
    );
    Json(evaluation)
}
