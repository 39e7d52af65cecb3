//! Exchange context: where each queued asset comes from and goes to

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use trustee_types::{Result, TrusteeError};

/// Separator between entry id and asset id in context keys
pub const ENTRY_SEPARATOR: &str = "::";

/// Build the context key for an asset of a data exchange entry
pub fn context_key(entry_id: &str, asset_id: &str) -> String {
    format!("{entry_id}{ENTRY_SEPARATOR}{asset_id}")
}

/// The asset id without its `entryId::` prefix
pub fn strip_entry_prefix(key: &str) -> &str {
    match key.split_once(ENTRY_SEPARATOR) {
        Some((_, asset)) => asset,
        None => key,
    }
}

/// Connector base URLs for one asset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeEndpoints {
    pub provider: String,
    pub consumer: String,
}

/// Concurrent map from asset key to provider/consumer base URLs
#[derive(Debug, Default)]
pub struct ExchangeContext {
    endpoints: DashMap<String, ExchangeEndpoints>,
}

impl ExchangeContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, key: impl Into<String>, provider: impl Into<String>, consumer: impl Into<String>) {
        self.endpoints.insert(
            key.into(),
            ExchangeEndpoints {
                provider: provider.into(),
                consumer: consumer.into(),
            },
        );
    }

    pub fn get(&self, key: &str) -> Option<ExchangeEndpoints> {
        self.endpoints.get(key).map(|e| e.value().clone())
    }

    pub fn provider(&self, key: &str) -> Result<String> {
        self.get(key)
            .map(|e| e.provider)
            .ok_or_else(|| Self::unknown(key))
    }

    pub fn consumer(&self, key: &str) -> Result<String> {
        self.get(key)
            .map(|e| e.consumer)
            .ok_or_else(|| Self::unknown(key))
    }

    /// Every known key, sorted
    pub fn all_assets(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.endpoints.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }

    /// Keys belonging to one data exchange entry, sorted
    pub fn assets_of_entry(&self, entry_id: &str) -> Vec<String> {
        let prefix = format!("{entry_id}{ENTRY_SEPARATOR}");
        let mut keys: Vec<String> = self
            .endpoints
            .iter()
            .filter(|e| e.key().starts_with(&prefix))
            .map(|e| e.key().clone())
            .collect();
        keys.sort();
        keys
    }

    /// The first key (in sorted order) that carries the given raw asset id
    pub fn find_by_asset_id(&self, asset_id: &str) -> Option<String> {
        let suffix = format!("{ENTRY_SEPARATOR}{asset_id}");
        self.all_assets().into_iter().find(|k| k.ends_with(&suffix))
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    fn unknown(key: &str) -> TrusteeError {
        TrusteeError::NotFound(format!("No exchange context found for asset {key}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> ExchangeContext {
        let ctx = ExchangeContext::new();
        ctx.put(context_key("e1", "asset1"), "http://provider:9191", "http://consumer:9191");
        ctx.put(context_key("e1", "asset2"), "http://provider:9191", "http://consumer:9191");
        ctx.put(context_key("e2", "asset3"), "http://other:9191", "http://consumer:9191");
        ctx
    }

    #[test]
    fn test_lookup() {
        let ctx = context();
        assert_eq!(ctx.provider("e1::asset1").unwrap(), "http://provider:9191");
        assert_eq!(ctx.consumer("e2::asset3").unwrap(), "http://consumer:9191");

        let err = ctx.provider("e9::nope").unwrap_err();
        assert!(matches!(err, TrusteeError::NotFound(ref m) if m.contains("e9::nope")));
    }

    #[test]
    fn test_assets_of_entry_uses_full_prefix() {
        let ctx = context();
        ctx.put("e10::asset9", "p", "c");
        assert_eq!(ctx.assets_of_entry("e1"), vec!["e1::asset1", "e1::asset2"]);
        assert_eq!(ctx.assets_of_entry("e10"), vec!["e10::asset9"]);
        assert!(ctx.assets_of_entry("missing").is_empty());
        assert_eq!(ctx.all_assets().len(), 4);
    }

    #[test]
    fn test_find_by_asset_id() {
        let ctx = context();
        assert_eq!(ctx.find_by_asset_id("asset3").as_deref(), Some("e2::asset3"));
        assert_eq!(ctx.find_by_asset_id("set3"), None);
        assert_eq!(ctx.find_by_asset_id("asset4"), None);
    }

    #[test]
    fn test_strip_entry_prefix() {
        assert_eq!(strip_entry_prefix("e1::asset1"), "asset1");
        assert_eq!(strip_entry_prefix("e1::a::b"), "a::b");
        assert_eq!(strip_entry_prefix("asset1"), "asset1");
    }
}
