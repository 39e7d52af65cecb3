//! Data exchange entries tracked by a data trustee

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;

use crate::error::TrusteeError;
use crate::participant::Participant;

/// Lifecycle state of a data exchange entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DataExchangeState {
    /// Only one side has notified the trustee
    NotReady,
    /// Provider and consumer are both known
    Ready,
    /// The exchange is running
    InProgress,
    /// The exchange finished; parties get notified and the entry is dropped
    Completed,
    /// The exchange failed or timed out; the entry is dropped
    Failed,
}

impl DataExchangeState {
    /// Canonical wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotReady => "NOT_READY",
            Self::Ready => "READY",
            Self::InProgress => "IN_PROGRESS",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        }
    }
}

impl fmt::Display for DataExchangeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataExchangeState {
    type Err = TrusteeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NOT_READY" => Ok(Self::NotReady),
            "READY" => Ok(Self::Ready),
            "IN_PROGRESS" => Ok(Self::InProgress),
            "COMPLETED" => Ok(Self::Completed),
            "FAILED" => Ok(Self::Failed),
            other => Err(TrusteeError::InvalidInput(format!(
                "unknown data exchange state: {other}"
            ))),
        }
    }
}

/// A pending exchange between a provider and a consumer, as seen by the trustee
///
/// Every mutation refreshes `last_updated_at`; the `NOT_READY` timeout is
/// measured from it.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DataExchangeEntry {
    id: String,
    provider: Option<Participant>,
    consumer: Option<Participant>,
    assets: Vec<String>,
    state: DataExchangeState,
    created_at: DateTime<Utc>,
    last_updated_at: DateTime<Utc>,
}

impl DataExchangeEntry {
    /// Create a new entry in `NOT_READY`
    pub fn new(
        provider: Option<Participant>,
        consumer: Option<Participant>,
        assets: Vec<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            provider,
            consumer,
            assets,
            state: DataExchangeState::NotReady,
            created_at: now,
            last_updated_at: now,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn provider(&self) -> Option<&Participant> {
        self.provider.as_ref()
    }

    pub fn consumer(&self) -> Option<&Participant> {
        self.consumer.as_ref()
    }

    pub fn assets(&self) -> &[String] {
        &self.assets
    }

    pub fn state(&self) -> DataExchangeState {
        self.state
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn last_updated_at(&self) -> DateTime<Utc> {
        self.last_updated_at
    }

    pub fn set_provider(&mut self, provider: Participant) {
        self.provider = Some(provider);
        self.touch();
    }

    pub fn set_consumer(&mut self, consumer: Participant) {
        self.consumer = Some(consumer);
        self.touch();
    }

    pub fn set_assets(&mut self, assets: Vec<String>) {
        self.assets = assets;
        self.touch();
    }

    pub fn set_state(&mut self, state: DataExchangeState) {
        self.state = state;
        self.touch();
    }

    /// Refresh the last-updated timestamp
    pub fn touch(&mut self) {
        self.last_updated_at = Utc::now();
    }

    /// Whether this entry covers exactly the given assets, ignoring order
    pub fn has_same_assets(&self, assets: &[String]) -> bool {
        let ours: HashSet<&String> = self.assets.iter().collect();
        let theirs: HashSet<&String> = assets.iter().collect();
        ours == theirs
    }

    /// Whether both sides of the exchange are known
    pub fn is_paired(&self) -> bool {
        self.provider.is_some() && self.consumer.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_round_trip_names() {
        for state in [
            DataExchangeState::NotReady,
            DataExchangeState::Ready,
            DataExchangeState::InProgress,
            DataExchangeState::Completed,
            DataExchangeState::Failed,
        ] {
            assert_eq!(state.as_str().parse::<DataExchangeState>().unwrap(), state);
        }
        assert!("DONE".parse::<DataExchangeState>().is_err());
        assert!("ready".parse::<DataExchangeState>().is_err());
    }

    #[test]
    fn test_new_entry_starts_not_ready() {
        let entry = DataExchangeEntry::new(None, None, vec!["asset1".into()]);
        assert_eq!(entry.state(), DataExchangeState::NotReady);
        assert_eq!(entry.created_at(), entry.last_updated_at());
        assert!(!entry.is_paired());
        assert!(uuid::Uuid::parse_str(entry.id()).is_ok());
    }

    #[test]
    fn test_same_assets_ignores_order() {
        let entry = DataExchangeEntry::new(None, None, vec!["a".into(), "b".into()]);
        assert!(entry.has_same_assets(&["b".into(), "a".into()]));
        assert!(!entry.has_same_assets(&["a".into()]));
    }

    #[test]
    fn test_serializes_camel_case() {
        let entry = DataExchangeEntry::new(None, None, vec![]);
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["state"], "NOT_READY");
        assert!(json.get("lastUpdatedAt").is_some());
        assert!(json.get("createdAt").is_some());
    }
}
