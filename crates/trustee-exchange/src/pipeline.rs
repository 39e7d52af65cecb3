//! Moving asset payloads from provider to consumer
//!
//! The trustee pulls each asset from the provider named in the exchange
//! context, caches it locally, optionally runs an anonymisation service over
//! it, and pushes the result to the consumer. Pushes run in the background
//! and are tracked in the [`TransferRegistry`].

use bytes::Bytes;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use trustee_types::{Result, TrusteeError};

use crate::client::{
    asset_binary_url, asset_definition, management_base_for, ConnectorClient, ManagementApi,
};
use crate::context::{strip_entry_prefix, ExchangeContext};
use crate::services::{AssetProcessor, ServiceRegistry};
use crate::store::AssetStore;
use crate::transfer::TransferRegistry;

/// Addresses of this connector and the port layout of its peers
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Port of a peer's public connector API, swapped for the management port
    pub connector_port: u16,
    /// Management API port of peers
    pub management_port: u16,
    /// Management API path of peers
    pub management_path: String,
    /// This connector's own management API
    pub local_management_base: String,
    /// This connector's own public API base, used in cached asset definitions
    pub local_api_base: String,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            connector_port: 9191,
            management_port: 9193,
            management_path: "/management/v3".to_string(),
            local_management_base: "http://localhost:9193/management/v3".to_string(),
            local_api_base: "http://localhost:9191".to_string(),
        }
    }
}

/// Shape of a merged payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MergeMode {
    /// JSON array in asset order
    #[default]
    Array,
    /// JSON object keyed by asset id
    Object,
}

impl MergeMode {
    /// `object` in any case selects [`MergeMode::Object`]; anything else is an array
    pub fn parse(value: Option<&str>) -> Self {
        match value {
            Some(v) if v.eq_ignore_ascii_case("object") => Self::Object,
            _ => Self::Array,
        }
    }
}

/// Pull, process and push asset payloads
pub struct AssetPipeline {
    client: Arc<dyn ConnectorClient>,
    store: Arc<dyn AssetStore>,
    services: Arc<ServiceRegistry>,
    context: Arc<ExchangeContext>,
    transfers: TransferRegistry,
    settings: PipelineSettings,
}

impl AssetPipeline {
    pub fn new(
        client: Arc<dyn ConnectorClient>,
        store: Arc<dyn AssetStore>,
        services: Arc<ServiceRegistry>,
        context: Arc<ExchangeContext>,
        transfers: TransferRegistry,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            client,
            store,
            services,
            context,
            transfers,
            settings,
        }
    }

    pub fn transfers(&self) -> &TransferRegistry {
        &self.transfers
    }

    /// Push a stored asset to `{target_url}/assets/{id}/binary`; returns the transfer id
    pub async fn push(&self, asset_id: &str, target_url: &str) -> Result<String> {
        if !self.store.exists(asset_id).await? {
            return Err(TrusteeError::NotFound("asset not found".to_string()));
        }
        let payload = self.store.load(asset_id).await?;
        let url = format!("{}/assets/{}/binary", target_url.trim_end_matches('/'), asset_id);

        let client = Arc::clone(&self.client);
        let (transfer_id, _) = self
            .transfers
            .track(async move { client.post_binary(&url, payload).await });
        tracing::info!(transfer_id = %transfer_id, asset_id = %asset_id, target = %target_url, "Push started");
        Ok(transfer_id)
    }

    /// Pull one asset of a ready exchange and push it to the consumer; returns the transfer id
    pub async fn pull_transfer(&self, asset_id: &str, service_id: Option<&str>) -> Result<String> {
        let key = self.context.find_by_asset_id(asset_id).ok_or_else(|| {
            tracing::warn!(
                asset_id = %asset_id,
                known = ?self.context.all_assets(),
                "No exchange context found"
            );
            TrusteeError::NotFound(format!("No exchange context found for asset {asset_id}"))
        })?;
        let provider = self.context.provider(&key)?;
        let consumer = self.context.consumer(&key)?;
        tracing::info!(
            asset_id = %asset_id,
            key = %key,
            provider = %provider,
            consumer = %consumer,
            "Pull transfer"
        );

        let payload = self.client.fetch_asset(asset_id, &provider).await.map_err(|e| {
            tracing::error!(asset_id = %asset_id, provider = %provider, error = %e, "Failed to fetch asset");
            TrusteeError::Upstream(format!("Failed to fetch asset from original provider: {e}"))
        })?;

        if !self.store.exists(asset_id).await? {
            self.store.save(asset_id, payload.clone()).await?;
            self.ensure_registered(asset_id).await;
        }

        let processor = self.resolve_processor(service_id)?;
        let outgoing = match processor {
            Some(processor) => processor
                .apply(payload)
                .map_err(|e| TrusteeError::Processing(format!("service processing failed: {e}")))?,
            None => payload,
        };

        let transfer_id = self.start_push(asset_id.to_string(), consumer.clone(), outgoing);
        tracing::info!(
            transfer_id = %transfer_id,
            asset_id = %asset_id,
            consumer = %consumer,
            "Transfer initiated"
        );
        Ok(transfer_id)
    }

    /// Pull every asset of an entry (or of all entries), merge them into one
    /// JSON document and push it to the consumer as `merged-{entry|all}`
    pub async fn merge(
        &self,
        entry_id: Option<&str>,
        mode: MergeMode,
        service_id: Option<&str>,
    ) -> Result<Value> {
        let entry_id = entry_id.filter(|id| !id.trim().is_empty());
        let keys = match entry_id {
            Some(id) => self.context.assets_of_entry(id),
            None => self.context.all_assets(),
        };
        if keys.is_empty() {
            let message = if entry_id.is_some() {
                "no assets for entry"
            } else {
                "no assets available"
            };
            return Err(TrusteeError::NotFound(message.to_string()));
        }
        let processor = self.resolve_processor(service_id)?;

        let mut documents = Vec::with_capacity(keys.len());
        for key in &keys {
            let failed = |e: TrusteeError| TrusteeError::Processing(format!("failed on asset {key}: {e}"));
            let provider = self.context.provider(key).map_err(failed)?;
            let mut payload = self.client.fetch_asset(key, &provider).await.map_err(failed)?;
            if let Some(processor) = &processor {
                payload = processor.apply(payload).map_err(failed)?;
            }
            let document: Value = serde_json::from_slice(&payload)
                .map_err(|e| failed(TrusteeError::Serialization(e.to_string())))?;
            documents.push(document);
        }

        let merged = match mode {
            MergeMode::Array => Value::Array(documents),
            MergeMode::Object => Value::Object(
                keys.iter()
                    .map(|k| strip_entry_prefix(k).to_string())
                    .zip(documents)
                    .collect::<Map<String, Value>>(),
            ),
        };

        let merged_id = format!("merged-{}", entry_id.unwrap_or("all"));
        let consumer = self.context.consumer(&keys[0])?;
        let body = Bytes::from(serde_json::to_vec(&merged)?);
        let transfer_id = self.start_push(merged_id.clone(), consumer, body);
        tracing::info!(merged_id = %merged_id, transfer_id = %transfer_id, assets = keys.len(), "Merged asset pushed");

        Ok(merged)
    }

    fn resolve_processor(
        &self,
        service_id: Option<&str>,
    ) -> Result<Option<Arc<dyn AssetProcessor>>> {
        match service_id.filter(|id| !id.trim().is_empty()) {
            None => Ok(None),
            Some(id) => self
                .services
                .processor(id)
                .map(Some)
                .ok_or_else(|| TrusteeError::InvalidInput("unknown serviceId".to_string())),
        }
    }

    /// Push to the consumer and describe the asset at its management API
    fn start_push(&self, asset_id: String, consumer_base: String, payload: Bytes) -> String {
        let client = Arc::clone(&self.client);
        let management = ManagementApi {
            port: self.settings.management_port,
            path: self.settings.management_path.clone(),
        };
        let management_base = management_base_for(&consumer_base, self.settings.connector_port, &management);

        let (transfer_id, _) = self.transfers.track(async move {
            let status = client.push_asset(&asset_id, &consumer_base, payload).await?;
            let management_base = match management_base {
                Ok(base) => base,
                Err(e) => {
                    tracing::warn!(asset_id = %asset_id, error = %e, "No management API for consumer");
                    return Ok(status);
                }
            };

            let mut definition = asset_definition(
                &asset_id,
                &asset_binary_url(&consumer_base, &asset_id),
                json!({ "key": "value" }),
            );
            definition["privateProperties"] = json!({ "privateKey": "privateValue" });
            if let Err(e) = client.register_asset(&management_base, &definition).await {
                tracing::warn!(asset_id = %asset_id, error = %e, "Metadata creation at consumer failed");
            }
            Ok::<u16, TrusteeError>(status)
        });
        transfer_id
    }

    /// Make sure a cached asset is described at our own management API
    async fn ensure_registered(&self, asset_id: &str) {
        let base = &self.settings.local_management_base;
        match self.client.asset_registered(base, asset_id).await {
            Ok(true) => return,
            Ok(false) => {}
            Err(e) => {
                tracing::warn!(asset_id = %asset_id, error = %e, "Could not check asset registration");
            }
        }

        let definition = asset_definition(
            asset_id,
            &asset_binary_url(&self.settings.local_api_base, asset_id),
            json!({ "name": format!("Raw-{asset_id}"), "contenttype": "application/json" }),
        );
        if let Err(e) = self.client.register_asset(base, &definition).await {
            tracing::warn!(asset_id = %asset_id, error = %e, "Could not register asset on trustee");
        }
    }
}

impl std::fmt::Debug for AssetPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssetPipeline")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::FileSystemAssetStore;
    use crate::testing::RecordingClient;
    use crate::transfer::TransferState;
    use crate::MASK_TITLE_ID;

    struct Fixture {
        pipeline: AssetPipeline,
        client: Arc<RecordingClient>,
        store: Arc<FileSystemAssetStore>,
        _dir: tempfile::TempDir,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let client = Arc::new(RecordingClient::default());
        let store = Arc::new(FileSystemAssetStore::new(dir.path()).unwrap());
        let context = Arc::new(ExchangeContext::new());
        context.put("e1::a1", "http://provider:9191", "http://consumer:9191");
        context.put("e1::a2", "http://provider:9191", "http://consumer:9191");

        let pipeline = AssetPipeline::new(
            client.clone(),
            store.clone(),
            Arc::new(ServiceRegistry::with_builtin()),
            context,
            TransferRegistry::new(),
            PipelineSettings::default(),
        );
        Fixture {
            pipeline,
            client,
            store,
            _dir: dir,
        }
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_pull_transfer_caches_processes_and_pushes() {
        let f = fixture();
        f.client.serve_asset("a1", r#"{"title":"Secret","n":1}"#);

        let transfer_id = f
            .pipeline
            .pull_transfer("a1", Some(MASK_TITLE_ID))
            .await
            .unwrap();
        settle().await;

        assert_eq!(f.client.fetched_assets(), vec![("a1".to_string(), "http://provider:9191".to_string())]);
        // The cache keeps the original payload
        assert_eq!(
            f.store.load("a1").await.unwrap(),
            Bytes::from_static(br#"{"title":"Secret","n":1}"#)
        );

        let registrations = f.client.registrations();
        assert_eq!(registrations[0].0, "http://localhost:9193/management/v3");
        assert_eq!(registrations[0].1["properties"]["name"], "Raw-a1");

        let pushes = f.client.pushes();
        assert_eq!(pushes[0].0, "http://consumer:9191/api/assets/a1/binary");
        let pushed: Value = serde_json::from_slice(&pushes[0].1).unwrap();
        assert_eq!(pushed["title"], "xxx");
        assert_eq!(
            registrations.last().unwrap().0,
            "http://consumer:9193/management/v3"
        );
        assert_eq!(f.pipeline.transfers().state_of(&transfer_id), TransferState::Completed);
    }

    #[tokio::test]
    async fn test_pull_transfer_errors() {
        let f = fixture();
        assert!(matches!(
            f.pipeline.pull_transfer("a9", None).await,
            Err(TrusteeError::NotFound(m)) if m.contains("a9")
        ));
        // Provider has nothing to serve
        assert!(matches!(
            f.pipeline.pull_transfer("a1", None).await,
            Err(TrusteeError::Upstream(_))
        ));

        f.client.serve_asset("a1", "{}");
        assert!(matches!(
            f.pipeline.pull_transfer("a1", Some("nope")).await,
            Err(TrusteeError::InvalidInput(m)) if m == "unknown serviceId"
        ));

        f.client.serve_asset("a2", "plain text");
        assert!(matches!(
            f.pipeline.pull_transfer("a2", Some(MASK_TITLE_ID)).await,
            Err(TrusteeError::Processing(_))
        ));
    }

    #[tokio::test]
    async fn test_already_registered_asset_is_not_registered_again() {
        let f = fixture();
        f.client.serve_asset("a1", "{}");
        f.client.set_registered(true);
        f.pipeline.pull_transfer("a1", None).await.unwrap();
        settle().await;
        assert!(f
            .client
            .registrations()
            .iter()
            .all(|(base, _)| base != "http://localhost:9193/management/v3"));
    }

    #[tokio::test]
    async fn test_merge_modes() {
        let f = fixture();
        f.client.serve_asset("a1", r#"{"title":"one"}"#);
        f.client.serve_asset("a2", r#"{"title":"two"}"#);

        let merged = f
            .pipeline
            .merge(Some("e1"), MergeMode::Array, None)
            .await
            .unwrap();
        assert_eq!(merged, json!([{"title": "one"}, {"title": "two"}]));

        let merged = f
            .pipeline
            .merge(None, MergeMode::parse(Some("OBJECT")), Some(MASK_TITLE_ID))
            .await
            .unwrap();
        assert_eq!(merged, json!({"a1": {"title": "xxx"}, "a2": {"title": "xxx"}}));
        settle().await;

        let urls: Vec<_> = f.client.pushes().into_iter().map(|(url, _)| url).collect();
        assert!(urls.contains(&"http://consumer:9191/api/assets/merged-e1/binary".to_string()));
        assert!(urls.contains(&"http://consumer:9191/api/assets/merged-all/binary".to_string()));
    }

    #[tokio::test]
    async fn test_merge_errors() {
        let f = fixture();
        assert!(matches!(
            f.pipeline.merge(Some("e2"), MergeMode::Array, None).await,
            Err(TrusteeError::NotFound(m)) if m == "no assets for entry"
        ));
        assert!(matches!(
            f.pipeline.merge(None, MergeMode::Array, Some("nope")).await,
            Err(TrusteeError::InvalidInput(_))
        ));

        f.client.serve_asset("a1", "{}");
        assert!(matches!(
            f.pipeline.merge(None, MergeMode::Array, None).await,
            Err(TrusteeError::Processing(m)) if m.starts_with("failed on asset e1::a2")
        ));
    }

    #[tokio::test]
    async fn test_push_stored_asset() {
        let f = fixture();
        assert!(matches!(
            f.pipeline.push("a1", "http://target/api").await,
            Err(TrusteeError::NotFound(_))
        ));

        f.store.save("a1", Bytes::from_static(b"[1]")).await.unwrap();
        f.client.set_push_status(503);
        let id = f.pipeline.push("a1", "http://target/api").await.unwrap();
        settle().await;
        assert_eq!(f.client.pushes()[0].0, "http://target/api/assets/a1/binary");
        assert_eq!(f.pipeline.transfers().state_of(&id), TransferState::Error);
    }

    #[test]
    fn test_merge_mode_parse() {
        assert_eq!(MergeMode::parse(None), MergeMode::Array);
        assert_eq!(MergeMode::parse(Some("array")), MergeMode::Array);
        assert_eq!(MergeMode::parse(Some("Object")), MergeMode::Object);
        assert_eq!(MergeMode::parse(Some("tree")), MergeMode::Array);
    }
}
