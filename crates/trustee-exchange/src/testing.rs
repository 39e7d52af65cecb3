//! In-memory [`ConnectorClient`] that records every call
//!
//! Used by the unit tests here and by the API integration tests.

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use trustee_types::{
    CompletionNotice, DataTrusteeRequest, NegotiationRequest, Result, ServiceDescriptor,
    TrusteeError,
};

use crate::client::ConnectorClient;
use crate::context::strip_entry_prefix;

/// Scripted connector client
#[derive(Debug)]
pub struct RecordingClient {
    negotiation_reply: Mutex<Option<String>>,
    notify_reply: Mutex<Option<String>>,
    services: Mutex<Option<Vec<ServiceDescriptor>>>,
    assets: Mutex<HashMap<String, Bytes>>,
    push_status: Mutex<u16>,
    registered: Mutex<bool>,

    negotiations: Mutex<Vec<(String, NegotiationRequest)>>,
    trustee_notifications: Mutex<Vec<(String, DataTrusteeRequest)>>,
    completions: Mutex<Vec<(String, CompletionNotice)>>,
    fetched_services: Mutex<Vec<String>>,
    fetched_assets: Mutex<Vec<(String, String)>>,
    pushes: Mutex<Vec<(String, Bytes)>>,
    registrations: Mutex<Vec<(String, Value)>>,
}

impl Default for RecordingClient {
    fn default() -> Self {
        Self {
            negotiation_reply: Mutex::new(None),
            notify_reply: Mutex::new(Some(r#"{"message":"Notification received"}"#.to_string())),
            services: Mutex::new(Some(Vec::new())),
            assets: Mutex::new(HashMap::new()),
            push_status: Mutex::new(200),
            registered: Mutex::new(false),
            negotiations: Mutex::default(),
            trustee_notifications: Mutex::default(),
            completions: Mutex::default(),
            fetched_services: Mutex::default(),
            fetched_assets: Mutex::default(),
            pushes: Mutex::default(),
            registrations: Mutex::default(),
        }
    }
}

impl RecordingClient {
    // ---- scripting ----

    /// Body returned by the counterparty; unset means the request fails
    pub fn set_negotiation_reply(&self, body: impl Into<String>) {
        *self.negotiation_reply.lock() = Some(body.into());
    }

    /// Make trustee notifications fail
    pub fn fail_notifications(&self) {
        *self.notify_reply.lock() = None;
    }

    pub fn set_services(&self, services: Vec<ServiceDescriptor>) {
        *self.services.lock() = Some(services);
    }

    pub fn fail_services(&self) {
        *self.services.lock() = None;
    }

    /// Payload served for a remote asset id
    pub fn serve_asset(&self, remote_id: impl Into<String>, body: impl Into<Bytes>) {
        self.assets.lock().insert(remote_id.into(), body.into());
    }

    pub fn set_push_status(&self, status: u16) {
        *self.push_status.lock() = status;
    }

    pub fn set_registered(&self, registered: bool) {
        *self.registered.lock() = registered;
    }

    // ---- inspection ----

    pub fn negotiations(&self) -> Vec<(String, NegotiationRequest)> {
        self.negotiations.lock().clone()
    }

    pub fn trustee_notifications(&self) -> Vec<(String, DataTrusteeRequest)> {
        self.trustee_notifications.lock().clone()
    }

    pub fn completions(&self) -> Vec<(String, CompletionNotice)> {
        self.completions.lock().clone()
    }

    pub fn fetched_services(&self) -> Vec<String> {
        self.fetched_services.lock().clone()
    }

    /// `(asset id as requested, provider url)` pairs
    pub fn fetched_assets(&self) -> Vec<(String, String)> {
        self.fetched_assets.lock().clone()
    }

    /// `(url, body)` of every binary push
    pub fn pushes(&self) -> Vec<(String, Bytes)> {
        self.pushes.lock().clone()
    }

    /// `(management base, asset definition)` of every registration
    pub fn registrations(&self) -> Vec<(String, Value)> {
        self.registrations.lock().clone()
    }
}

#[async_trait]
impl ConnectorClient for RecordingClient {
    async fn send_negotiation(&self, url: &str, request: &NegotiationRequest) -> Result<String> {
        self.negotiations.lock().push((url.to_string(), request.clone()));
        self.negotiation_reply
            .lock()
            .clone()
            .ok_or_else(|| TrusteeError::Upstream(format!("{url}: connection refused")))
    }

    async fn notify_trustee(&self, trustee_url: &str, request: &DataTrusteeRequest) -> Result<String> {
        self.trustee_notifications
            .lock()
            .push((trustee_url.to_string(), request.clone()));
        self.notify_reply
            .lock()
            .clone()
            .ok_or_else(|| TrusteeError::Upstream(format!("{trustee_url}: connection refused")))
    }

    async fn notify_completion(&self, url: &str, notice: &CompletionNotice) -> Result<u16> {
        self.completions.lock().push((url.to_string(), notice.clone()));
        Ok(200)
    }

    async fn fetch_services(&self, provider_base: &str) -> Result<Vec<ServiceDescriptor>> {
        self.fetched_services.lock().push(provider_base.to_string());
        self.services
            .lock()
            .clone()
            .ok_or_else(|| TrusteeError::Upstream(format!("{provider_base}/api/services unavailable")))
    }

    async fn fetch_asset(&self, asset_id: &str, provider_url: &str) -> Result<Bytes> {
        self.fetched_assets
            .lock()
            .push((asset_id.to_string(), provider_url.to_string()));
        let remote_id = strip_entry_prefix(asset_id);
        self.assets
            .lock()
            .get(remote_id)
            .cloned()
            .ok_or_else(|| TrusteeError::Upstream("Management API replied 404".to_string()))
    }

    async fn post_binary(&self, url: &str, body: Bytes) -> Result<u16> {
        self.pushes.lock().push((url.to_string(), body));
        Ok(*self.push_status.lock())
    }

    async fn asset_registered(&self, _management_base: &str, _asset_id: &str) -> Result<bool> {
        Ok(*self.registered.lock())
    }

    async fn register_asset(&self, management_base: &str, asset: &Value) -> Result<()> {
        self.registrations
            .lock()
            .push((management_base.to_string(), asset.clone()));
        Ok(())
    }
}
