//! Filesystem-backed blob store.

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;

use super::{BlobError, BlobRef, BlobStore};

/// Stores blobs as files under `root`, addressed by relative key.
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a key to a path under the root, refusing anything that could
    /// escape it.
    fn path_for(&self, key: &str) -> Result<PathBuf, BlobError> {
        let relative = Path::new(key);
        let safe = !key.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !safe {
            return Err(BlobError::InvalidRef(key.to_string()));
        }
        Ok(self.root.join(relative))
    }

    fn path_for_ref(&self, blob: &BlobRef) -> Result<PathBuf, BlobError> {
        let key = blob
            .local_key()
            .ok_or_else(|| BlobError::InvalidRef(blob.to_string()))?;
        self.path_for(key)
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn fetch(&self, blob: &BlobRef) -> Result<Vec<u8>, BlobError> {
        let path = self.path_for_ref(blob)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(BlobError::NotFound(blob.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    /// Writes to a sibling temp file first and renames it into place, so a
    /// reader never sees a half-written blob.
    async fn store(&self, bytes: Vec<u8>, key: &str) -> Result<BlobRef, BlobError> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
        tmp_name.push(format!(".{}.tmp", uuid::Uuid::new_v4().simple()));
        let tmp = path.with_file_name(tmp_name);

        tokio::fs::write(&tmp, &bytes).await?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }

        log::debug!("blob: stored {} bytes at {}", bytes.len(), path.display());
        Ok(BlobRef::local(key))
    }

    async fn remove(&self, blob: &BlobRef) -> Result<(), BlobError> {
        let path = self.path_for_ref(blob)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
