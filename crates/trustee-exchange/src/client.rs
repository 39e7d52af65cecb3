//! Outbound HTTP to other connectors
//!
//! Every call a trustee or connector makes to a peer goes through
//! [`ConnectorClient`], so handlers and the queue never touch reqwest directly.

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::{json, Value};
use std::time::Duration;
use trustee_types::{
    connector_base, CompletionNotice, DataTrusteeRequest, NegotiationRequest, Result,
    ServiceDescriptor, TrusteeError,
};

use crate::context::strip_entry_prefix;

// =============================================================================
// Management API addressing
// =============================================================================

/// Where a connector's management API listens relative to its public API
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagementApi {
    /// Port of the management API on the same host
    pub port: u16,
    /// Path prefix, e.g. `/management/v3`
    pub path: String,
}

impl Default for ManagementApi {
    fn default() -> Self {
        Self {
            port: 9193,
            path: "/management/v3".to_string(),
        }
    }
}

/// Management URL of a remote asset, derived from the provider's connector URL
pub fn management_asset_url(provider_url: &str, remote_id: &str, api: &ManagementApi) -> Result<String> {
    let parsed = url::Url::parse(provider_url)
        .map_err(|e| TrusteeError::InvalidInput(format!("invalid provider url {provider_url}: {e}")))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| TrusteeError::InvalidInput(format!("provider url {provider_url} has no host")))?;
    Ok(format!(
        "{}://{}:{}{}/assets/{}",
        parsed.scheme(),
        host,
        api.port,
        api.path,
        remote_id
    ))
}

/// Management base of a connector, found by swapping its connector port for the management port
///
/// Only the authority's port changes; a base on any other port keeps it.
pub fn management_base_for(base: &str, connector_port: u16, api: &ManagementApi) -> Result<String> {
    let base = connector_base(base);
    let mut parsed = url::Url::parse(&base)
        .map_err(|e| TrusteeError::InvalidInput(format!("invalid connector url {base}: {e}")))?;
    if parsed.port() == Some(connector_port) {
        parsed
            .set_port(Some(api.port))
            .map_err(|_| TrusteeError::InvalidInput(format!("connector url {base} cannot carry a port")))?;
    }
    Ok(format!("{}{}", parsed.as_str().trim_end_matches('/'), api.path))
}

/// `{base}/api/assets/{id}/binary`
pub fn asset_binary_url(base: &str, asset_id: &str) -> String {
    format!(
        "{}/api/assets/{}/binary",
        connector_base(base).trim_end_matches('/'),
        asset_id
    )
}

/// Asset definition for a connector management API, pointing at a binary URL
pub fn asset_definition(id: &str, binary_url: &str, properties: Value) -> Value {
    json!({
        "@context": { "@vocab": "https://w3id.org/edc/v0.0.1/ns/" },
        "@id": id,
        "@type": "Asset",
        "properties": properties,
        "dataAddress": {
            "type": "HttpData",
            "baseUrl": binary_url,
        },
    })
}

// =============================================================================
// Client Trait
// =============================================================================

/// Outbound calls to peer connectors and data trustees
#[async_trait]
pub trait ConnectorClient: Send + Sync {
    /// POST a negotiation request and return the raw reply body
    async fn send_negotiation(&self, url: &str, request: &NegotiationRequest) -> Result<String>;

    /// POST a notification to `{trustee_url}/notify` and return the raw reply body
    async fn notify_trustee(&self, trustee_url: &str, request: &DataTrusteeRequest) -> Result<String>;

    /// POST a completion notice, returning the remote status
    async fn notify_completion(&self, url: &str, notice: &CompletionNotice) -> Result<u16>;

    /// GET `{provider_base}/api/services`
    async fn fetch_services(&self, provider_base: &str) -> Result<Vec<ServiceDescriptor>>;

    /// Pull an asset's payload from the provider through its management API
    async fn fetch_asset(&self, asset_id: &str, provider_url: &str) -> Result<Bytes>;

    /// POST an octet-stream body, returning the remote status
    async fn post_binary(&self, url: &str, body: Bytes) -> Result<u16>;

    /// Whether the management API already knows the asset
    async fn asset_registered(&self, management_base: &str, asset_id: &str) -> Result<bool>;

    /// POST an asset definition to `{management_base}/assets`
    async fn register_asset(&self, management_base: &str, asset: &Value) -> Result<()>;

    /// Push a payload to `{target_base}/api/assets/{id}/binary`
    async fn push_asset(&self, asset_id: &str, target_base: &str, body: Bytes) -> Result<u16> {
        self.post_binary(&asset_binary_url(target_base, asset_id), body).await
    }
}

// =============================================================================
// reqwest implementation
// =============================================================================

/// [`ConnectorClient`] over HTTP
#[derive(Debug, Clone)]
pub struct HttpConnectorClient {
    http: reqwest::Client,
    management: ManagementApi,
}

impl HttpConnectorClient {
    pub fn new(management: ManagementApi, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TrusteeError::Upstream(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { http, management })
    }

    pub fn management(&self) -> &ManagementApi {
        &self.management
    }

    async fn post_json_text<T: serde::Serialize + ?Sized>(&self, url: &str, body: &T) -> Result<String> {
        let response = self
            .http
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| upstream(url, e))?;
        response.text().await.map_err(|e| upstream(url, e))
    }
}

fn upstream(url: &str, err: reqwest::Error) -> TrusteeError {
    TrusteeError::Upstream(format!("{url}: {err}"))
}

#[async_trait]
impl ConnectorClient for HttpConnectorClient {
    async fn send_negotiation(&self, url: &str, request: &NegotiationRequest) -> Result<String> {
        tracing::debug!(url = %url, assets = ?request.assets, "Sending negotiation request");
        self.post_json_text(url, request).await
    }

    async fn notify_trustee(&self, trustee_url: &str, request: &DataTrusteeRequest) -> Result<String> {
        let url = format!("{}/notify", trustee_url.trim_end_matches('/'));
        tracing::debug!(url = %url, sender = %request.sender_type, "Notifying data trustee");
        self.post_json_text(&url, request).await
    }

    async fn notify_completion(&self, url: &str, notice: &CompletionNotice) -> Result<u16> {
        let response = self
            .http
            .post(url)
            .json(notice)
            .send()
            .await
            .map_err(|e| upstream(url, e))?;
        Ok(response.status().as_u16())
    }

    async fn fetch_services(&self, provider_base: &str) -> Result<Vec<ServiceDescriptor>> {
        let url = format!("{}/api/services", provider_base.trim_end_matches('/'));
        let response = self.http.get(&url).send().await.map_err(|e| upstream(&url, e))?;
        if !response.status().is_success() {
            return Err(TrusteeError::Upstream(format!(
                "{url} replied {}",
                response.status()
            )));
        }
        response
            .json::<Vec<ServiceDescriptor>>()
            .await
            .map_err(|e| upstream(&url, e))
    }

    async fn fetch_asset(&self, asset_id: &str, provider_url: &str) -> Result<Bytes> {
        let remote_id = strip_entry_prefix(asset_id);
        let metadata_url = management_asset_url(provider_url, remote_id, &self.management)?;
        tracing::info!(
            provider_url = %provider_url,
            metadata_url = %metadata_url,
            local_asset_id = %asset_id,
            remote_asset_id = %remote_id,
            "Pulling asset"
        );

        let response = self
            .http
            .get(&metadata_url)
            .send()
            .await
            .map_err(|e| upstream(&metadata_url, e))?;
        if response.status() != reqwest::StatusCode::OK {
            return Err(TrusteeError::Upstream(format!(
                "Management API replied {}",
                response.status().as_u16()
            )));
        }
        let metadata: Value = response.json().await.map_err(|e| upstream(&metadata_url, e))?;
        let source_url = metadata
            .pointer("/dataAddress/baseUrl")
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| {
                TrusteeError::Upstream(format!("Asset {remote_id} has no dataAddress.baseUrl"))
            })?
            .to_string();

        let response = self
            .http
            .get(&source_url)
            .send()
            .await
            .map_err(|e| upstream(&source_url, e))?;
        if response.status() != reqwest::StatusCode::OK {
            return Err(TrusteeError::Upstream(format!(
                "Source HTTP fetch failed ({})",
                response.status().as_u16()
            )));
        }
        response.bytes().await.map_err(|e| upstream(&source_url, e))
    }

    async fn post_binary(&self, url: &str, body: Bytes) -> Result<u16> {
        let response = self
            .http
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(body)
            .send()
            .await
            .map_err(|e| upstream(url, e))?;
        tracing::info!(url = %url, status = response.status().as_u16(), "Pushed asset payload");
        Ok(response.status().as_u16())
    }

    async fn asset_registered(&self, management_base: &str, asset_id: &str) -> Result<bool> {
        let url = format!("{}/assets/{}", management_base.trim_end_matches('/'), asset_id);
        let response = self.http.head(&url).send().await.map_err(|e| upstream(&url, e))?;
        Ok(response.status() == reqwest::StatusCode::OK)
    }

    async fn register_asset(&self, management_base: &str, asset: &Value) -> Result<()> {
        let url = format!("{}/assets", management_base.trim_end_matches('/'));
        let response = self
            .http
            .post(&url)
            .json(asset)
            .send()
            .await
            .map_err(|e| upstream(&url, e))?;
        if !response.status().is_success() {
            return Err(TrusteeError::Upstream(format!(
                "{url} replied {}",
                response.status()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_management_asset_url() {
        let api = ManagementApi::default();
        assert_eq!(
            management_asset_url("http://provider-connector:9191", "asset1", &api).unwrap(),
            "http://provider-connector:9193/management/v3/assets/asset1"
        );
        assert_eq!(
            management_asset_url("https://p.example.com/api", "a", &api).unwrap(),
            "https://p.example.com:9193/management/v3/assets/a"
        );
        assert!(matches!(
            management_asset_url("not a url", "a", &api),
            Err(TrusteeError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_management_base_swaps_port() {
        let api = ManagementApi::default();
        assert_eq!(
            management_base_for("http://consumer-connector:9191", 9191, &api).unwrap(),
            "http://consumer-connector:9193/management/v3"
        );
        assert_eq!(
            management_base_for("http://consumer-connector:9191/api/trusted-participants", 9191, &api)
                .unwrap(),
            "http://consumer-connector:9193/management/v3"
        );
    }

    #[test]
    fn test_management_base_only_touches_the_authority() {
        let api = ManagementApi::default();
        assert_eq!(
            management_base_for("http://consumer-connector:9191/proxy:9191", 9191, &api).unwrap(),
            "http://consumer-connector:9193/proxy:9191/management/v3"
        );
        assert_eq!(
            management_base_for("http://consumer-connector:39191", 9191, &api).unwrap(),
            "http://consumer-connector:39191/management/v3"
        );
        assert!(management_base_for("consumer-connector", 9191, &api).is_err());
    }

    #[test]
    fn test_asset_binary_url() {
        assert_eq!(
            asset_binary_url("http://consumer:9191/", "merged-all"),
            "http://consumer:9191/api/assets/merged-all/binary"
        );
    }

    #[test]
    fn test_asset_definition_shape() {
        let def = asset_definition("a1", "http://x/api/assets/a1/binary", json!({"key": "value"}));
        assert_eq!(def["@type"], "Asset");
        assert_eq!(def["@id"], "a1");
        assert_eq!(def["@context"]["@vocab"], "https://w3id.org/edc/v0.0.1/ns/");
        assert_eq!(def["dataAddress"]["type"], "HttpData");
        assert_eq!(def["dataAddress"]["baseUrl"], "http://x/api/assets/a1/binary");
    }

    mod http {
        use super::*;
        use axum::{
            extract::{Path, State},
            http::StatusCode,
            response::IntoResponse,
            routing::{get, post},
            Json, Router,
        };
        use parking_lot::Mutex;
        use std::sync::Arc;
        use trustee_types::{Participant, SenderRole};

        #[derive(Clone)]
        struct Peer {
            base: String,
            notifications: Arc<Mutex<Vec<Value>>>,
        }

        async fn asset_metadata(State(peer): State<Peer>, Path(id): Path<String>) -> impl IntoResponse {
            match id.as_str() {
                "ok" => Json(json!({ "dataAddress": { "baseUrl": format!("{}/source/ok", peer.base) } }))
                    .into_response(),
                "broken-source" => {
                    Json(json!({ "dataAddress": { "baseUrl": format!("{}/source/broken", peer.base) } }))
                        .into_response()
                }
                "no-address" => Json(json!({ "@id": "no-address" })).into_response(),
                "blank-address" => Json(json!({ "dataAddress": { "baseUrl": "  " } })).into_response(),
                _ => StatusCode::NOT_FOUND.into_response(),
            }
        }

        async fn record_notification(State(peer): State<Peer>, Json(body): Json<Value>) -> &'static str {
            peer.notifications.lock().push(body);
            "Notification received"
        }

        /// Serve a fake peer connector on an ephemeral port; returns its base URL
        async fn spawn_peer() -> (String, u16, Arc<Mutex<Vec<Value>>>) {
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            let port = listener.local_addr().unwrap().port();
            let base = format!("http://127.0.0.1:{port}");
            let notifications = Arc::new(Mutex::new(Vec::new()));
            let peer = Peer {
                base: base.clone(),
                notifications: Arc::clone(&notifications),
            };

            let app = Router::new()
                .route("/management/v3/assets/:id", get(asset_metadata))
                .route("/source/ok", get(|| async { r#"{"title":"report"}"# }))
                .route(
                    "/source/broken",
                    get(|| async { StatusCode::INTERNAL_SERVER_ERROR }),
                )
                .route(
                    "/trustee/api/trusted-participants/notify",
                    post(record_notification),
                )
                .route(
                    "/good/api/services",
                    get(|| async { Json(json!([{ "id": "mask-title", "name": "Mask titles" }])) }),
                )
                .route(
                    "/down/api/services",
                    get(|| async { StatusCode::SERVICE_UNAVAILABLE }),
                )
                .with_state(peer);
            tokio::spawn(async move {
                axum::serve(listener, app).await.unwrap();
            });
            (base, port, notifications)
        }

        fn client(port: u16) -> HttpConnectorClient {
            let api = ManagementApi {
                port,
                path: "/management/v3".to_string(),
            };
            HttpConnectorClient::new(api, Duration::from_secs(5)).unwrap()
        }

        #[tokio::test]
        async fn test_fetch_asset_follows_data_address() {
            let (base, port, _) = spawn_peer().await;
            let bytes = client(port).fetch_asset("entry-1::ok", &base).await.unwrap();
            assert_eq!(&bytes[..], br#"{"title":"report"}"#);
        }

        #[tokio::test]
        async fn test_fetch_asset_rejects_failed_metadata_lookup() {
            let (base, port, _) = spawn_peer().await;
            let err = client(port).fetch_asset("unknown", &base).await.unwrap_err();
            assert!(matches!(&err, TrusteeError::Upstream(msg) if msg.contains("404")), "{err}");
        }

        #[tokio::test]
        async fn test_fetch_asset_requires_base_url() {
            let (base, port, _) = spawn_peer().await;
            let client = client(port);
            for id in ["no-address", "blank-address"] {
                let err = client.fetch_asset(id, &base).await.unwrap_err();
                assert!(
                    matches!(&err, TrusteeError::Upstream(msg) if msg.contains("dataAddress.baseUrl")),
                    "{id}: {err}"
                );
            }
        }

        #[tokio::test]
        async fn test_fetch_asset_rejects_failed_source() {
            let (base, port, _) = spawn_peer().await;
            let err = client(port).fetch_asset("broken-source", &base).await.unwrap_err();
            assert!(
                matches!(&err, TrusteeError::Upstream(msg) if msg.contains("Source HTTP fetch failed (500)")),
                "{err}"
            );
        }

        #[tokio::test]
        async fn test_notify_trustee_posts_to_notify_endpoint() {
            let (base, port, notifications) = spawn_peer().await;
            let request = DataTrusteeRequest::new(
                Participant::anonymous("provider", "http://provider:9191/api/trusted-participants"),
                Participant::anonymous("consumer", "http://consumer:9191/api/trusted-participants"),
                vec!["asset1".to_string()],
                SenderRole::Provider,
            );

            let body = client(port)
                .notify_trustee(&format!("{base}/trustee/api/trusted-participants/"), &request)
                .await
                .unwrap();
            assert_eq!(body, "Notification received");

            let received = notifications.lock().clone();
            assert_eq!(received.len(), 1);
            assert_eq!(received[0]["senderType"], "provider");
            assert_eq!(received[0]["assets"], json!(["asset1"]));
        }

        #[tokio::test]
        async fn test_fetch_services_checks_status() {
            let (base, port, _) = spawn_peer().await;
            let client = client(port);

            let services = client.fetch_services(&format!("{base}/good")).await.unwrap();
            assert_eq!(services, vec![ServiceDescriptor::new("mask-title", "Mask titles")]);

            let err = client.fetch_services(&format!("{base}/down/")).await.unwrap_err();
            assert!(matches!(&err, TrusteeError::Upstream(msg) if msg.contains("503")), "{err}");
        }
    }
}
