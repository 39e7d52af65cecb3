//! Outcome tracking for background transfers

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinHandle;
use trustee_types::Result;

/// Observable state of a transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransferState {
    /// Never registered
    Unknown,
    Running,
    /// Remote answered with a 2xx status
    Completed,
    /// Remote answered with a non-2xx status, or the request failed
    Error,
}

impl fmt::Display for TransferState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Unknown => "UNKNOWN",
            Self::Running => "RUNNING",
            Self::Completed => "COMPLETED",
            Self::Error => "ERROR",
        })
    }
}

/// Registry of spawned transfers, cheap to clone
#[derive(Debug, Clone, Default)]
pub struct TransferRegistry {
    transfers: Arc<DashMap<String, TransferState>>,
}

impl TransferRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn a transfer resolving to the remote HTTP status and record its outcome
    ///
    /// Returns the new transfer id and the task handle.
    pub fn track<F>(&self, transfer: F) -> (String, JoinHandle<()>)
    where
        F: Future<Output = Result<u16>> + Send + 'static,
    {
        let id = uuid::Uuid::new_v4().to_string();
        self.transfers.insert(id.clone(), TransferState::Running);

        let transfers = Arc::clone(&self.transfers);
        let transfer_id = id.clone();
        let handle = tokio::spawn(async move {
            let state = match transfer.await {
                Ok(status) if (200..300).contains(&status) => TransferState::Completed,
                Ok(status) => {
                    tracing::warn!(transfer_id = %transfer_id, status, "Transfer rejected by remote");
                    TransferState::Error
                }
                Err(e) => {
                    tracing::warn!(transfer_id = %transfer_id, error = %e, "Transfer failed");
                    TransferState::Error
                }
            };
            tracing::info!(transfer_id = %transfer_id, state = %state, "Transfer finished");
            transfers.insert(transfer_id, state);
        });

        (id, handle)
    }

    pub fn state_of(&self, id: &str) -> TransferState {
        self.transfers
            .get(id)
            .map(|s| *s.value())
            .unwrap_or(TransferState::Unknown)
    }
}
