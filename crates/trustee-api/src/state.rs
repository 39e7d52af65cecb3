//! Application state shared across handlers
//!
//! One instance of every registry lives here; handlers never reach for
//! process-wide globals.

use std::sync::Arc;
use trustee_exchange::{
    AssetPipeline, AssetStore, ConnectorClient, DataExchangeQueueManager, ExchangeContext,
    ExchangeSettings, LogBuffer, PipelineSettings, ServiceRegistry, TransferRegistry,
};
use trustee_policy::PolicyEngine;
use trustee_whitelist::TrustedParticipantsWhitelist;

/// Settings for negotiations this connector initiates
#[derive(Debug, Clone)]
pub struct NegotiationSettings {
    /// Public URL of our whitelist API, used as the data sink URL; derived from the request if unset
    pub public_api_url: Option<String>,
    /// Assets requested when a negotiation names none
    pub default_assets: Vec<String>,
}

impl Default for NegotiationSettings {
    fn default() -> Self {
        Self {
            public_api_url: None,
            default_assets: vec!["asset1".to_string(), "asset2".to_string()],
        }
    }
}

/// Everything needed to assemble [`AppState`] besides the injected services
#[derive(Debug, Clone, Default)]
pub struct StateSettings {
    pub negotiation: NegotiationSettings,
    pub exchange: ExchangeSettings,
    pub pipeline: PipelineSettings,
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Data trustees this connector trusts
    pub whitelist: Arc<TrustedParticipantsWhitelist>,
    /// Policy engine with the trusted participant constraint registered
    pub policy: Arc<PolicyEngine>,
    /// Pending data exchanges
    pub queue: Arc<DataExchangeQueueManager>,
    /// Provider/consumer addresses per queued asset
    pub context: Arc<ExchangeContext>,
    /// Anonymisation services
    pub services: Arc<ServiceRegistry>,
    /// Local asset cache
    pub store: Arc<dyn AssetStore>,
    /// Pull/process/push of asset payloads
    pub pipeline: Arc<AssetPipeline>,
    /// Outbound HTTP to peers
    pub client: Arc<dyn ConnectorClient>,
    /// Recent log events
    pub logs: LogBuffer,
    pub negotiation: NegotiationSettings,
}

impl AppState {
    /// Wire the registries around the injected whitelist, client and store
    pub fn new(
        whitelist: Arc<TrustedParticipantsWhitelist>,
        client: Arc<dyn ConnectorClient>,
        store: Arc<dyn AssetStore>,
        logs: LogBuffer,
        settings: StateSettings,
    ) -> Self {
        let policy = Arc::new(PolicyEngine::with_defaults(Arc::clone(&whitelist)));
        let context = Arc::new(ExchangeContext::new());
        let services = Arc::new(ServiceRegistry::with_builtin());
        let queue = Arc::new(DataExchangeQueueManager::new(
            settings.exchange,
            Arc::clone(&context),
            Arc::clone(&services),
            Arc::clone(&client),
        ));
        let pipeline = Arc::new(AssetPipeline::new(
            Arc::clone(&client),
            Arc::clone(&store),
            Arc::clone(&services),
            Arc::clone(&context),
            TransferRegistry::new(),
            settings.pipeline,
        ));

        Self {
            whitelist,
            policy,
            queue,
            context,
            services,
            store,
            pipeline,
            client,
            logs,
            negotiation: settings.negotiation,
        }
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("whitelist", &self.whitelist.len())
            .field("queue", &self.queue)
            .field("negotiation", &self.negotiation)
            .finish_non_exhaustive()
    }
}
