//! Remote object store reached over plain HTTP.
//!
//! Objects are read with `GET <ref>`, written with `PUT <base_url>/<key>` and
//! deleted with `DELETE <ref>`, which covers S3-style buckets behind a
//! gateway as well as simple WebDAV servers.  Fetches are not retried: a
//! failed download is reported to the caller as-is.

use std::time::Duration;

use async_trait::async_trait;

use super::{BlobError, BlobRef, BlobStore};

pub struct HttpBlobStore {
    client: reqwest::Client,
    base_url: Option<String>,
}

impl HttpBlobStore {
    /// Build a store that can read any `http(s)://` reference and, when
    /// `base_url` is set, write under it.
    pub fn new(base_url: Option<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            base_url: base_url.map(|u| u.trim_end_matches('/').to_string()),
        }
    }

    pub fn can_store(&self) -> bool {
        self.base_url.is_some()
    }

    fn check_remote(blob: &BlobRef) -> Result<(), BlobError> {
        if blob.is_remote() {
            Ok(())
        } else {
            Err(BlobError::InvalidRef(blob.to_string()))
        }
    }
}

#[async_trait]
impl BlobStore for HttpBlobStore {
    async fn fetch(&self, blob: &BlobRef) -> Result<Vec<u8>, BlobError> {
        Self::check_remote(blob)?;
        let response = self.client.get(blob.as_str()).send().await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(BlobError::NotFound(blob.to_string()));
        }
        let bytes = response.error_for_status()?.bytes().await?;
        log::debug!("blob: fetched {} bytes from {blob}", bytes.len());
        Ok(bytes.to_vec())
    }

    async fn store(&self, bytes: Vec<u8>, key: &str) -> Result<BlobRef, BlobError> {
        let base = self.base_url.as_deref().ok_or(BlobError::RemoteDisabled)?;
        let url = format!("{base}/{}", key.trim_start_matches('/'));

        self.client
            .put(&url)
            .body(bytes)
            .send()
            .await?
            .error_for_status()?;

        Ok(BlobRef::new(url))
    }

    async fn remove(&self, blob: &BlobRef) -> Result<(), BlobError> {
        Self::check_remote(blob)?;
        let response = self.client.delete(blob.as_str()).send().await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(());
        }
        response.error_for_status()?;
        Ok(())
    }
}
