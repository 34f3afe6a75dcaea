//! Blob storage for source files, page sub-documents and audio tracks.
//!
//! This module provides:
//! * [`BlobRef`] — opaque locator stored in the database.
//! * [`BlobStore`] — async trait implemented by every backend.
//! * [`LocalBlobStore`] — files under a root directory (`file:` refs).
//! * [`HttpBlobStore`] — remote object store over HTTP (`http(s)://` refs).
//! * [`BlobRouter`] — picks the backend from the reference scheme.
//! * [`keys`] — key layout and file-name cleaning.

pub mod http;
pub mod keys;
pub mod local;
pub mod router;

use std::fmt;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

pub use http::HttpBlobStore;
pub use local::LocalBlobStore;
pub use router::BlobRouter;

// ---------------------------------------------------------------------------
// BlobError
// ---------------------------------------------------------------------------

/// Errors that can occur while fetching or storing blobs.
#[derive(Debug, Error)]
pub enum BlobError {
    #[error("blob not found: {0}")]
    NotFound(String),

    #[error("invalid blob reference: {0}")]
    InvalidRef(String),

    #[error("blob I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP transport error or non-success status.
    #[error("HTTP request failed: {0}")]
    Request(String),

    #[error("blob request timed out")]
    Timeout,

    /// A write was routed to remote storage but no base URL is configured.
    #[error("remote storage is not configured")]
    RemoteDisabled,
}

impl From<reqwest::Error> for BlobError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            BlobError::Timeout
        } else {
            BlobError::Request(e.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// BlobRef
// ---------------------------------------------------------------------------

/// Opaque locator of a stored blob.
///
/// `file:<key>` points into the local store; `http://…` / `https://…` points
/// at a remote object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct BlobRef(String);

impl BlobRef {
    const LOCAL_SCHEME: &'static str = "file:";

    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Reference to `key` inside the local store.
    pub fn local(key: &str) -> Self {
        Self(format!("{}{key}", Self::LOCAL_SCHEME))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_remote(&self) -> bool {
        self.0.starts_with("http://") || self.0.starts_with("https://")
    }

    /// Key inside the local store, if this is a local reference.
    pub fn local_key(&self) -> Option<&str> {
        self.0.strip_prefix(Self::LOCAL_SCHEME)
    }
}

impl fmt::Display for BlobRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// BlobStore trait
// ---------------------------------------------------------------------------

/// Fetch-by-reference blob storage.
///
/// Implementors must be `Send + Sync` so they can be shared as
/// `Arc<dyn BlobStore>` between the splitter and every generation task.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Read the whole blob into memory.
    async fn fetch(&self, blob: &BlobRef) -> Result<Vec<u8>, BlobError>;

    /// Write `bytes` under `key` and return the reference to it.
    async fn store(&self, bytes: Vec<u8>, key: &str) -> Result<BlobRef, BlobError>;

    /// Delete a blob.  Removing a blob that does not exist is not an error.
    async fn remove(&self, blob: &BlobRef) -> Result<(), BlobError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_ref_round_trips_key() {
        let blob = BlobRef::local("pages/3/1.pdf");
        assert_eq!(blob.as_str(), "file:pages/3/1.pdf");
        assert_eq!(blob.local_key(), Some("pages/3/1.pdf"));
        assert!(!blob.is_remote());
    }

    #[test]
    fn http_refs_are_remote() {
        let blob = BlobRef::new("https://bucket.example.com/files/a.pdf");
        assert!(blob.is_remote());
        assert!(blob.local_key().is_none());
    }

    #[test]
    fn blob_store_is_object_safe() {
        fn _accepts(_: Box<dyn BlobStore>) {}
    }
}
