//! Scheme-based routing between the local and remote blob stores.

use async_trait::async_trait;

use crate::config::StorageConfig;

use super::{BlobError, BlobRef, BlobStore, HttpBlobStore, LocalBlobStore};

/// Reads from whichever backend a reference points at; writes go to the
/// remote store when one is configured and to the local store otherwise.
///
/// The pipeline only ever sees `Arc<dyn BlobStore>`, so whether a page lives
/// on disk or in a bucket is transparent to it.
pub struct BlobRouter {
    local: LocalBlobStore,
    remote: HttpBlobStore,
}

impl BlobRouter {
    pub fn new(local: LocalBlobStore, remote: HttpBlobStore) -> Self {
        Self { local, remote }
    }

    pub fn from_config(config: &StorageConfig) -> Self {
        Self::new(
            LocalBlobStore::new(config.blob_root()),
            HttpBlobStore::new(config.remote_base_url.clone(), config.remote_timeout()),
        )
    }

    fn backend_for(&self, blob: &BlobRef) -> &dyn BlobStore {
        if blob.is_remote() {
            &self.remote
        } else {
            &self.local
        }
    }
}

#[async_trait]
impl BlobStore for BlobRouter {
    async fn fetch(&self, blob: &BlobRef) -> Result<Vec<u8>, BlobError> {
        self.backend_for(blob).fetch(blob).await
    }

    async fn store(&self, bytes: Vec<u8>, key: &str) -> Result<BlobRef, BlobError> {
        if self.remote.can_store() {
            self.remote.store(bytes, key).await
        } else {
            self.local.store(bytes, key).await
        }
    }

    async fn remove(&self, blob: &BlobRef) -> Result<(), BlobError> {
        self.backend_for(blob).remove(blob).await
    }
}
