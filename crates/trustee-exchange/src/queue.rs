//! Data exchange queue
//!
//! A data trustee receives one notification from each side of a negotiated
//! exchange. The queue pairs them into a [`DataExchangeEntry`]:
//!
//! ```text
//! first notification   ──▶ NOT_READY ──(timeout)──▶ FAILED ──▶ removed
//! second notification  ──▶ READY ──▶ IN_PROGRESS ──▶ COMPLETED ──▶ notified, removed
//! ```
//!
//! Once an entry is READY the exchange context knows where each of its
//! assets is pulled from and pushed to.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use trustee_types::{
    connector_base, CompletionNotice, DataExchangeEntry, DataExchangeState, Participant, Result,
    SenderRole, TrusteeError, TRUSTED_PARTICIPANTS_PATH,
};

use crate::client::ConnectorClient;
use crate::context::{context_key, ExchangeContext};
use crate::services::ServiceRegistry;

/// Tunables for pairing notifications
#[derive(Debug, Clone)]
pub struct ExchangeSettings {
    /// How long an entry may wait for its second notification
    pub not_ready_timeout: Duration,
    /// URL prefixes under which a consumer may appear when it reached us through the trustee itself
    pub trustee_url_prefixes: Vec<String>,
    /// Base URL used for such a consumer instead
    pub consumer_fallback_base: String,
}

impl Default for ExchangeSettings {
    fn default() -> Self {
        Self {
            not_ready_timeout: Duration::from_secs(5),
            trustee_url_prefixes: vec![
                "http://localhost:39191".to_string(),
                "http://trustee-connector:39191".to_string(),
                "http://trustee-connector:9191".to_string(),
                "http://localhost:19191".to_string(),
            ],
            consumer_fallback_base: "http://consumer-connector:9191".to_string(),
        }
    }
}

impl ExchangeSettings {
    /// Base URL for pushing to a consumer
    fn consumer_base(&self, consumer: &Participant) -> String {
        let misaddressed = consumer.name == "consumer"
            && self
                .trustee_url_prefixes
                .iter()
                .any(|prefix| consumer.url.starts_with(prefix.as_str()));
        if misaddressed {
            self.consumer_fallback_base.clone()
        } else {
            connector_base(&consumer.url)
        }
    }
}

/// What one pass over the queue did
#[derive(Debug, Default)]
pub struct SweepReport {
    /// Entries that timed out waiting for their second notification
    pub timed_out: Vec<String>,
    /// Completed entries whose parties were notified
    pub completed: Vec<String>,
    /// Entries dropped from the queue
    pub removed: Vec<String>,
    notifications: Vec<JoinHandle<()>>,
}

impl SweepReport {
    /// Wait for the completion notifications spawned by this pass
    pub async fn notifications_sent(self) {
        for handle in self.notifications {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "Completion notification task failed");
            }
        }
    }
}

/// Pairs provider and consumer notifications into data exchange entries
pub struct DataExchangeQueueManager {
    queue: Mutex<Vec<DataExchangeEntry>>,
    settings: ExchangeSettings,
    context: Arc<ExchangeContext>,
    services: Arc<ServiceRegistry>,
    client: Arc<dyn ConnectorClient>,
}

impl DataExchangeQueueManager {
    pub fn new(
        settings: ExchangeSettings,
        context: Arc<ExchangeContext>,
        services: Arc<ServiceRegistry>,
        client: Arc<dyn ConnectorClient>,
    ) -> Self {
        Self {
            queue: Mutex::new(Vec::new()),
            settings,
            context,
            services,
            client,
        }
    }

    pub fn settings(&self) -> &ExchangeSettings {
        &self.settings
    }

    /// Snapshot of the queue
    pub fn entries(&self) -> Vec<DataExchangeEntry> {
        self.queue.lock().clone()
    }

    pub async fn add_provider_notification(&self, provider: Participant, assets: Vec<String>) -> String {
        self.add_notification(SenderRole::Provider, provider, assets).await
    }

    pub async fn add_consumer_notification(&self, consumer: Participant, assets: Vec<String>) -> String {
        self.add_notification(SenderRole::Consumer, consumer, assets).await
    }

    async fn add_notification(&self, role: SenderRole, participant: Participant, assets: Vec<String>) -> String {
        let (entry_id, provider_base) = {
            let mut queue = self.queue.lock();
            let index = match role {
                SenderRole::Provider => Self::find_or_create(&mut queue, Some(&participant), None, assets),
                SenderRole::Consumer => Self::find_or_create(&mut queue, None, Some(&participant), assets),
            };
            let entry = &mut queue[index];
            match role {
                SenderRole::Provider => entry.set_provider(participant),
                SenderRole::Consumer => entry.set_consumer(participant),
            }
            let provider_base = self.update_entry_state(entry);
            (entry.id().to_string(), provider_base)
        };

        if let Some(base) = provider_base {
            self.sync_services(&base).await;
        }
        entry_id
    }

    fn find_or_create(
        queue: &mut Vec<DataExchangeEntry>,
        provider: Option<&Participant>,
        consumer: Option<&Participant>,
        assets: Vec<String>,
    ) -> usize {
        let fits = |ours: Option<&Participant>, theirs: Option<&Participant>| match (ours, theirs) {
            (Some(a), Some(b)) => a == b,
            _ => true,
        };

        let existing = queue.iter().position(|entry| {
            entry.has_same_assets(&assets)
                && fits(entry.provider(), provider)
                && fits(entry.consumer(), consumer)
                && entry.state() != DataExchangeState::Failed
        });
        if let Some(index) = existing {
            return index;
        }

        let entry = DataExchangeEntry::new(provider.cloned(), consumer.cloned(), assets);
        tracing::info!(entry_id = %entry.id(), "Creating new data exchange entry");
        queue.push(entry);
        queue.len() - 1
    }

    /// Recompute the state after a notification; returns the provider base to sync services from
    fn update_entry_state(&self, entry: &mut DataExchangeEntry) -> Option<String> {
        let (provider, consumer) = match (entry.provider(), entry.consumer()) {
            (Some(p), Some(c)) => (p.clone(), c.clone()),
            (p, c) => {
                let first = p.or(c).map(|x| x.name.as_str()).unwrap_or("unknown participant");
                tracing::info!(
                    entry_id = %entry.id(),
                    from = %first,
                    "First notification received, waiting for second notification"
                );
                entry.set_state(DataExchangeState::NotReady);
                return None;
            }
        };

        entry.set_state(DataExchangeState::Ready);
        tracing::info!(
            entry_id = %entry.id(),
            provider = %provider.name,
            consumer = %consumer.name,
            "Data exchange entry is READY"
        );

        if !consumer.has_url() {
            tracing::error!(
                entry_id = %entry.id(),
                "Consumer URL missing, cannot record exchange context"
            );
            entry.set_state(DataExchangeState::Failed);
            return None;
        }

        let provider_base = connector_base(&provider.url);
        let consumer_base = self.settings.consumer_base(&consumer);
        for asset in entry.assets() {
            let key = context_key(entry.id(), asset);
            tracing::info!(
                key = %key,
                provider_base = %provider_base,
                consumer_base = %consumer_base,
                "Storing exchange context"
            );
            self.context.put(key, provider_base.clone(), consumer_base.clone());
        }
        Some(provider_base)
    }

    async fn sync_services(&self, provider_base: &str) {
        match self.client.fetch_services(provider_base).await {
            Ok(remote) => {
                let count = remote.len();
                for descriptor in remote {
                    self.services.add(descriptor);
                }
                tracing::info!(count, provider_base = %provider_base, "Fetched services from provider");
            }
            Err(e) => {
                tracing::warn!(provider_base = %provider_base, error = %e, "Could not fetch services");
            }
        }
    }

    /// Run one pass over the queue using the current time
    pub fn process_entries(&self) -> SweepReport {
        self.process_entries_at(Utc::now())
    }

    /// Run one pass over the queue as of `now`
    pub fn process_entries_at(&self, now: DateTime<Utc>) -> SweepReport {
        let mut report = SweepReport::default();
        let mut queue = self.queue.lock();

        queue.retain_mut(|entry| match entry.state() {
            DataExchangeState::NotReady => {
                if self.has_timed_out(entry, now) {
                    entry.set_state(DataExchangeState::Failed);
                    tracing::warn!(entry_id = %entry.id(), "Entry FAILED, timed out in NOT_READY");
                    report.timed_out.push(entry.id().to_string());
                }
                true
            }
            DataExchangeState::Ready => true,
            DataExchangeState::InProgress => {
                tracing::info!(entry_id = %entry.id(), "Data exchange IN_PROGRESS");
                true
            }
            DataExchangeState::Completed => {
                tracing::info!(entry_id = %entry.id(), "Data exchange COMPLETED");
                report.notifications.extend(self.send_completion_notification(entry));
                report.completed.push(entry.id().to_string());
                report.removed.push(entry.id().to_string());
                false
            }
            DataExchangeState::Failed => {
                tracing::warn!(entry_id = %entry.id(), "Entry FAILED, removing");
                report.removed.push(entry.id().to_string());
                false
            }
        });

        report
    }

    fn has_timed_out(&self, entry: &DataExchangeEntry, now: DateTime<Utc>) -> bool {
        (now - entry.last_updated_at())
            .to_std()
            .map(|waited| waited > self.settings.not_ready_timeout)
            .unwrap_or(false)
    }

    /// Set an entry's state on request of an operator or the transfer pipeline
    ///
    /// Allowed from READY or IN_PROGRESS, and to FAILED from anywhere.
    /// COMPLETED and FAILED trigger an immediate queue pass.
    pub fn update_entry_state_manually(
        &self,
        entry_id: &str,
        new_state: DataExchangeState,
    ) -> Result<SweepReport> {
        {
            let mut queue = self.queue.lock();
            let Some(entry) = queue.iter_mut().find(|e| e.id() == entry_id) else {
                tracing::warn!(entry_id = %entry_id, "Entry not found for manual state update");
                return Err(TrusteeError::NotFound(format!("data exchange entry {entry_id} not found")));
            };

            let from = entry.state();
            let allowed = matches!(from, DataExchangeState::Ready | DataExchangeState::InProgress)
                || new_state == DataExchangeState::Failed;
            if !allowed {
                tracing::warn!(entry_id = %entry_id, from = %from, to = %new_state, "Refusing manual state update");
                return Err(TrusteeError::InvalidTransition {
                    entry_id: entry_id.to_string(),
                    from,
                    to: new_state,
                });
            }
            entry.set_state(new_state);
            tracing::info!(entry_id = %entry_id, from = %from, to = %new_state, "State manually updated");
        }

        if matches!(new_state, DataExchangeState::Completed | DataExchangeState::Failed) {
            Ok(self.process_entries())
        } else {
            Ok(SweepReport::default())
        }
    }

    /// Tell both parties that an exchange has completed
    ///
    /// Sends run in the background; their outcomes are only logged.
    pub fn send_completion_notification(&self, entry: &DataExchangeEntry) -> Vec<JoinHandle<()>> {
        let (Some(provider), Some(consumer)) = (entry.provider(), entry.consumer()) else {
            tracing::warn!(
                entry_id = %entry.id(),
                "Cannot send completion notification, provider or consumer missing"
            );
            return Vec::new();
        };

        let message = format!(
            "Data exchange has been completed for assets: {} (Entry ID: {})",
            entry.assets().join(", "),
            entry.id()
        );

        let mut handles = Vec::with_capacity(2);
        if provider.has_url() {
            let url = completion_url(&connector_base(&provider.url));
            handles.push(self.spawn_notice(url, &provider.name, &message, SenderRole::Provider));
        }
        if consumer.has_url() {
            let url = completion_url(&self.settings.consumer_base(consumer));
            handles.push(self.spawn_notice(url, &consumer.name, &message, SenderRole::Consumer));
        }
        handles
    }

    fn spawn_notice(&self, url: String, name: &str, message: &str, role: SenderRole) -> JoinHandle<()> {
        let client = Arc::clone(&self.client);
        let name = name.to_string();
        let notice = CompletionNotice {
            message: message.to_string(),
            role: role.as_str().to_string(),
        };
        tokio::spawn(async move {
            match client.notify_completion(&url, &notice).await {
                Ok(status) => {
                    tracing::info!(participant = %name, role = %role, status, "Completion notification sent")
                }
                Err(e) => {
                    tracing::warn!(participant = %name, role = %role, error = %e, "Failed to send completion notification")
                }
            }
        })
    }
}

fn completion_url(base: &str) -> String {
    format!(
        "{}{}/notify-completion",
        base.trim_end_matches('/'),
        TRUSTED_PARTICIPANTS_PATH
    )
}

impl std::fmt::Debug for DataExchangeQueueManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataExchangeQueueManager")
            .field("entries", &self.queue.lock().len())
            .field("settings", &self.settings)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingClient;
    use trustee_types::ServiceDescriptor;

    fn provider() -> Participant {
        Participant::anonymous("provider", "http://provider-connector:9191/api/trusted-participants")
    }

    fn consumer() -> Participant {
        Participant::anonymous("consumer", "http://consumer-connector:9191/api/trusted-participants")
    }

    fn assets(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    fn manager(client: Arc<RecordingClient>) -> (DataExchangeQueueManager, Arc<ExchangeContext>, Arc<ServiceRegistry>) {
        let context = Arc::new(ExchangeContext::new());
        let services = Arc::new(ServiceRegistry::with_builtin());
        let manager = DataExchangeQueueManager::new(
            ExchangeSettings::default(),
            Arc::clone(&context),
            Arc::clone(&services),
            client,
        );
        (manager, context, services)
    }

    #[tokio::test]
    async fn test_pairs_notifications_regardless_of_asset_order() {
        let client = Arc::new(RecordingClient::default());
        client.set_services(vec![ServiceDescriptor::new("remote-svc", "Remote")]);
        let (manager, context, services) = manager(Arc::clone(&client));

        let first = manager.add_provider_notification(provider(), assets(&["a1", "a2"])).await;
        assert_eq!(manager.entries()[0].state(), DataExchangeState::NotReady);
        assert!(context.is_empty());

        let second = manager.add_consumer_notification(consumer(), assets(&["a2", "a1"])).await;
        assert_eq!(first, second);

        let entries = manager.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].state(), DataExchangeState::Ready);

        let key = context_key(&first, "a1");
        assert_eq!(context.provider(&key).unwrap(), "http://provider-connector:9191");
        assert_eq!(context.consumer(&key).unwrap(), "http://consumer-connector:9191");
        assert_eq!(context.assets_of_entry(&first).len(), 2);

        assert_eq!(client.fetched_services(), vec!["http://provider-connector:9191"]);
        assert!(services.get("remote-svc").is_some());
    }

    #[tokio::test]
    async fn test_different_assets_make_separate_entries() {
        let (manager, _, _) = manager(Arc::new(RecordingClient::default()));
        let a = manager.add_provider_notification(provider(), assets(&["a1"])).await;
        let b = manager.add_consumer_notification(consumer(), assets(&["a1", "a2"])).await;
        assert_ne!(a, b);
        assert!(manager
            .entries()
            .iter()
            .all(|e| e.state() == DataExchangeState::NotReady));
    }

    #[tokio::test]
    async fn test_second_provider_notification_reuses_entry() {
        let (manager, _, _) = manager(Arc::new(RecordingClient::default()));
        let a = manager.add_provider_notification(provider(), assets(&["a1"])).await;
        let b = manager.add_provider_notification(provider(), assets(&["a1"])).await;
        assert_eq!(a, b);

        let other = Participant::anonymous("provider2", "http://p2:9191");
        let c = manager.add_provider_notification(other, assets(&["a1"])).await;
        assert_ne!(a, c);
    }

    #[tokio::test]
    async fn test_service_sync_failure_is_not_fatal() {
        let client = Arc::new(RecordingClient::default());
        client.fail_services();
        let (manager, _, _) = manager(Arc::clone(&client));
        manager.add_provider_notification(provider(), assets(&["a1"])).await;
        manager.add_consumer_notification(consumer(), assets(&["a1"])).await;
        assert_eq!(manager.entries()[0].state(), DataExchangeState::Ready);
    }

    #[tokio::test]
    async fn test_consumer_through_trustee_uses_fallback() {
        let (manager, context, _) = manager(Arc::new(RecordingClient::default()));
        let misaddressed = Participant::anonymous("consumer", "http://localhost:39191/api/trusted-participants");
        let id = manager.add_provider_notification(provider(), assets(&["a1"])).await;
        manager.add_consumer_notification(misaddressed, assets(&["a1"])).await;
        assert_eq!(
            context.consumer(&context_key(&id, "a1")).unwrap(),
            "http://consumer-connector:9191"
        );

        // Only a participant literally named "consumer" is redirected
        let (manager, context, _) = self::manager(Arc::new(RecordingClient::default()));
        let named = Participant::anonymous("sink", "http://localhost:39191/api/trusted-participants");
        let id = manager.add_provider_notification(provider(), assets(&["a1"])).await;
        manager.add_consumer_notification(named, assets(&["a1"])).await;
        assert_eq!(
            context.consumer(&context_key(&id, "a1")).unwrap(),
            "http://localhost:39191"
        );
    }

    #[tokio::test]
    async fn test_consumer_without_url_fails_entry() {
        let (manager, context, _) = manager(Arc::new(RecordingClient::default()));
        manager.add_provider_notification(provider(), assets(&["a1"])).await;
        manager
            .add_consumer_notification(Participant::anonymous("consumer", ""), assets(&["a1"]))
            .await;
        assert_eq!(manager.entries()[0].state(), DataExchangeState::Failed);
        assert!(context.is_empty());

        // A failed entry is not reused
        let again = manager.add_consumer_notification(consumer(), assets(&["a1"])).await;
        assert_eq!(manager.entries().len(), 2);
        assert_ne!(manager.entries()[0].id(), again);
    }

    #[tokio::test]
    async fn test_not_ready_times_out_then_is_removed() {
        let (manager, _, _) = manager(Arc::new(RecordingClient::default()));
        let id = manager.add_provider_notification(provider(), assets(&["a1"])).await;

        let report = manager.process_entries_at(Utc::now() + chrono::Duration::seconds(1));
        assert!(report.timed_out.is_empty());
        assert_eq!(manager.entries()[0].state(), DataExchangeState::NotReady);

        let report = manager.process_entries_at(Utc::now() + chrono::Duration::seconds(6));
        assert_eq!(report.timed_out, vec![id.clone()]);
        assert_eq!(manager.entries()[0].state(), DataExchangeState::Failed);

        let report = manager.process_entries();
        assert_eq!(report.removed, vec![id]);
        assert!(manager.entries().is_empty());
    }

    #[tokio::test]
    async fn test_manual_transitions() {
        let (manager, _, _) = manager(Arc::new(RecordingClient::default()));
        let pending = manager.add_provider_notification(provider(), assets(&["a1"])).await;

        let err = manager
            .update_entry_state_manually(&pending, DataExchangeState::InProgress)
            .unwrap_err();
        assert!(matches!(err, TrusteeError::InvalidTransition { .. }));

        let err = manager
            .update_entry_state_manually("missing", DataExchangeState::Failed)
            .unwrap_err();
        assert!(matches!(err, TrusteeError::NotFound(_)));

        // FAILED is allowed from any state and removes the entry
        let report = manager
            .update_entry_state_manually(&pending, DataExchangeState::Failed)
            .unwrap();
        assert_eq!(report.removed, vec![pending]);
        assert!(manager.entries().is_empty());
    }

    #[tokio::test]
    async fn test_completion_notifies_both_parties_and_removes_entry() {
        let client = Arc::new(RecordingClient::default());
        let (manager, _, _) = manager(Arc::clone(&client));
        manager.add_provider_notification(provider(), assets(&["a1", "a2"])).await;
        let id = manager.add_consumer_notification(consumer(), assets(&["a1", "a2"])).await;

        manager
            .update_entry_state_manually(&id, DataExchangeState::InProgress)
            .unwrap();
        assert_eq!(manager.entries()[0].state(), DataExchangeState::InProgress);

        let report = manager
            .update_entry_state_manually(&id, DataExchangeState::Completed)
            .unwrap();
        assert_eq!(report.completed, vec![id.clone()]);
        report.notifications_sent().await;
        assert!(manager.entries().is_empty());

        let mut notices = client.completions();
        notices.sort_by(|a, b| a.1.role.cmp(&b.1.role));
        assert_eq!(notices.len(), 2);
        assert_eq!(
            notices[0].0,
            "http://consumer-connector:9191/api/trusted-participants/notify-completion"
        );
        assert_eq!(notices[0].1.role, "consumer");
        assert_eq!(
            notices[1].0,
            "http://provider-connector:9191/api/trusted-participants/notify-completion"
        );
        assert_eq!(
            notices[1].1.message,
            format!("Data exchange has been completed for assets: a1, a2 (Entry ID: {id})")
        );
    }

    #[tokio::test]
    async fn test_completion_skipped_without_both_parties() {
        let client = Arc::new(RecordingClient::default());
        let (manager, _, _) = manager(Arc::clone(&client));
        let entry = DataExchangeEntry::new(Some(provider()), None, assets(&["a1"]));
        assert!(manager.send_completion_notification(&entry).is_empty());
        assert!(client.completions().is_empty());
    }
}
