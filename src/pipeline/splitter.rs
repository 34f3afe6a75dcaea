//! Document → page units.

use std::sync::Arc;

use thiserror::Error;

use crate::blob::keys::{page_key, unique_id};
use crate::blob::{BlobError, BlobRef, BlobStore};
use crate::source::{DocumentFormat, SourceError};
use crate::store::{Document, DocumentId, Store, StoreError, Unit};

#[derive(Debug, Error)]
pub enum SplitError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("could not fetch source document: {0}")]
    Fetch(#[source] BlobError),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("could not store page sub-document: {0}")]
    Storage(#[source] BlobError),

    /// A previous split of this document failed; splits are not retried.
    #[error("document {document} failed to split earlier: {reason}")]
    PreviouslyFailed { document: DocumentId, reason: String },

    #[error("split task failed: {0}")]
    Internal(String),
}

/// Turns one stored source document into its page units.
pub struct Splitter {
    store: Arc<Store>,
    blobs: Arc<dyn BlobStore>,
    format: Arc<dyn DocumentFormat>,
}

impl Splitter {
    pub fn new(
        store: Arc<Store>,
        blobs: Arc<dyn BlobStore>,
        format: Arc<dyn DocumentFormat>,
    ) -> Self {
        Self {
            store,
            blobs,
            format,
        }
    }

    /// Split `document` into one unit per page.
    ///
    /// Returns the existing units when the document was already split.  Any
    /// failure leaves the document without units and is recorded on it, so
    /// it reports `Failed` from then on.
    pub async fn split(&self, document: DocumentId) -> Result<Vec<Unit>, SplitError> {
        let doc = self.store.blocking(move |store| store.document(document)).await?;
        if doc.is_split() {
            log::debug!("splitter: document {document} already split");
            return Ok(self.store.blocking(move |store| store.units(document)).await?);
        }
        if let Some(reason) = doc.split_error.clone() {
            return Err(SplitError::PreviouslyFailed { document, reason });
        }

        match self.split_pages(&doc).await {
            Ok(units) => {
                log::info!("splitter: document {document} split into {} pages", units.len());
                Ok(units)
            }
            Err(e) => {
                log::error!("splitter: document {document} failed to split: {e}");
                let message = e.to_string();
                let recorded = self
                    .store
                    .blocking(move |store| store.record_split_failure(document, &message))
                    .await;
                if let Err(record) = recorded {
                    log::warn!("splitter: could not record failure of {document}: {record}");
                }
                Err(e)
            }
        }
    }

    async fn split_pages(&self, doc: &Document) -> Result<Vec<Unit>, SplitError> {
        let source = self.blobs.fetch(&doc.source).await.map_err(SplitError::Fetch)?;

        let format = Arc::clone(&self.format);
        let (extension, pages) = tokio::task::spawn_blocking(move || {
            let extension = format.extension(&source);
            format.split(&source).map(|pages| (extension, pages))
        })
        .await
        .map_err(|e| SplitError::Internal(e.to_string()))??;

        log::debug!(
            "splitter: document {} has {} {extension} pages",
            doc.id,
            pages.len()
        );

        // Pages of this attempt only; a concurrent split writes its own.
        let split = unique_id();
        let mut stored: Vec<BlobRef> = Vec::with_capacity(pages.len());
        for (page, bytes) in (1u32..).zip(pages) {
            match self.blobs.store(bytes, &page_key(doc.id, page, &split, extension)).await {
                Ok(blob) => stored.push(blob),
                Err(e) => {
                    self.discard(&stored).await;
                    return Err(SplitError::Storage(e));
                }
            }
        }

        let (id, sources) = (doc.id, stored.clone());
        match self
            .store
            .blocking(move |store| store.insert_units(id, &sources))
            .await
        {
            Ok(units) => Ok(units),
            Err(StoreError::AlreadySplit(id)) => {
                log::debug!("splitter: document {id} was split concurrently");
                self.discard(&stored).await;
                Ok(self.store.blocking(move |store| store.units(id)).await?)
            }
            Err(e) => {
                self.discard(&stored).await;
                Err(e.into())
            }
        }
    }

    /// Best-effort removal of this attempt's page blobs.
    async fn discard(&self, blobs: &[BlobRef]) {
        for blob in blobs {
            if let Err(e) = self.blobs.remove(blob).await {
                log::warn!("splitter: could not remove {blob}: {e}");
            }
        }
    }
}
