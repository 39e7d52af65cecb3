//! Local asset storage

use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};
use trustee_types::{Result, TrusteeError};

/// Default directory for cached asset payloads
pub const DEFAULT_ASSET_ROOT: &str = "opt/asset-store";

/// Binary asset storage keyed by asset id
#[async_trait]
pub trait AssetStore: Send + Sync {
    async fn save(&self, id: &str, data: Bytes) -> Result<()>;

    /// Load an asset; `NotFound` if it was never saved
    async fn load(&self, id: &str) -> Result<Bytes>;

    async fn exists(&self, id: &str) -> Result<bool>;
}

/// Stores each asset as one file under a root directory
#[derive(Debug, Clone)]
pub struct FileSystemAssetStore {
    root: PathBuf,
}

impl FileSystemAssetStore {
    /// Open a store, creating the root directory if needed
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        tracing::debug!(root = %root.display(), "Asset store ready");
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_of(&self, id: &str) -> Result<PathBuf> {
        if id.is_empty()
            || id == "."
            || id.contains("..")
            || id.contains('/')
            || id.contains('\\')
            || id.contains('\0')
        {
            return Err(TrusteeError::InvalidInput(format!("invalid asset id '{id}'")));
        }
        Ok(self.root.join(id))
    }
}

#[async_trait]
impl AssetStore for FileSystemAssetStore {
    async fn save(&self, id: &str, data: Bytes) -> Result<()> {
        let path = self.path_of(id)?;
        tokio::fs::write(&path, &data).await?;
        tracing::debug!(asset_id = %id, bytes = data.len(), "Asset stored");
        Ok(())
    }

    async fn load(&self, id: &str) -> Result<Bytes> {
        let path = self.path_of(id)?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(TrusteeError::NotFound(format!("asset {id} not found")))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, id: &str) -> Result<bool> {
        let path = self.path_of(id)?;
        Ok(tokio::fs::try_exists(&path).await?)
    }
}
