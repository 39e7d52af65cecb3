//! Trustee Exchange - data exchange machinery of a data trustee
//!
//! - [`DataExchangeQueueManager`]: pairs provider and consumer notifications
//!   into data exchange entries and drives their lifecycle
//! - [`ExchangeContext`]: where each queued asset is pulled from and pushed to
//! - [`AssetPipeline`]: pull, anonymise and push asset payloads
//! - [`ServiceRegistry`]: published anonymisation services and local processors
//! - [`AssetStore`]: local cache of asset payloads
//! - [`TransferRegistry`]: outcome of background transfers
//! - [`ConnectorClient`]: every outbound HTTP call to peers
//! - [`LogBuffer`]: recent log events for the logs endpoint

pub mod client;
pub mod context;
pub mod logs;
pub mod pipeline;
pub mod queue;
pub mod services;
pub mod store;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod transfer;

pub use client::{ConnectorClient, HttpConnectorClient, ManagementApi};
pub use context::{context_key, strip_entry_prefix, ExchangeContext, ExchangeEndpoints};
pub use logs::{LogBuffer, LogBufferLayer, LogEntry, DEFAULT_LOG_CAPACITY};
pub use pipeline::{AssetPipeline, MergeMode, PipelineSettings};
pub use queue::{DataExchangeQueueManager, ExchangeSettings, SweepReport};
pub use services::{AssetProcessor, MaskTitleProcessor, ServiceRegistry, MASK_TITLE_ID};
pub use store::{AssetStore, FileSystemAssetStore, DEFAULT_ASSET_ROOT};
pub use transfer::{TransferRegistry, TransferState};
