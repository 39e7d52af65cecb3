//! API Routes
//!
//! Route definitions for all API endpoints.

use axum::{
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;

use crate::handlers;
use crate::state::AppState;

/// Create `/api` routes
pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .nest("/trusted-participants", trusted_participants_routes())
        .nest("/assets", asset_routes())
        .nest("/transfers", transfer_routes())
        .route(
            "/context/:asset_id",
            get(handlers::context::get_context).post(handlers::context::put_context),
        )
        .nest("/services", service_routes())
        .route("/policies/evaluate", post(handlers::policies::evaluate_policy))
}

/// Whitelist, negotiation and trustee notification routes
fn trusted_participants_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(handlers::health::participants_health))
        // Whitelist
        .route("/add", post(handlers::participants::add_participant))
        .route("/list", get(handlers::participants::list_participants))
        .route("/remove", delete(handlers::participants::remove_participant))
        // Negotiation
        .route("/negotiate/*counter_party_url", post(handlers::participants::negotiate))
        .route("/receive-negotiation", post(handlers::participants::receive_negotiation))
        // Trustee side
        .route("/notify", post(handlers::participants::notify))
        .route("/notify-completion", post(handlers::participants::notify_completion))
        .route("/update-entry-state", post(handlers::participants::update_entry_state))
        .route("/data-exchange-entries", get(handlers::participants::data_exchange_entries))
        .route("/logs", get(handlers::participants::logs))
}

/// Local asset cache routes
fn asset_routes() -> Router<Arc<AppState>> {
    Router::new().route(
        "/:id/binary",
        get(handlers::assets::download_asset).post(handlers::assets::upload_asset),
    )
}

/// Transfer routes
fn transfer_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/push", post(handlers::transfers::push))
        .route("/status/:id", get(handlers::transfers::status))
        .route("/pull-transfer", post(handlers::transfers::pull_transfer))
        .route("/merge", post(handlers::transfers::merge))
}

/// Anonymisation service routes
fn service_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/",
            get(handlers::services::list_services).post(handlers::services::add_service),
        )
        .route(
            "/:id",
            get(handlers::services::get_service).delete(handlers::services::remove_service),
        )
}

/// Create Swagger UI routes
pub fn swagger_routes() -> Router<Arc<AppState>> {
    use crate::openapi::ApiDoc;
    use utoipa::OpenApi;
    use utoipa_swagger_ui::SwaggerUi;

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}
