//! In-process fan-out of generation work around the reading position.
//!
//! [`Dispatcher::on_document_activity`] claims every pending unit in the
//! lookahead window and spawns one tokio task per granted claim.  Tasks wait
//! on a shared semaphore, so at most `concurrency` generations run at once
//! no matter how many documents are active.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Semaphore;

use super::activity::Activity;
use super::generator::{GenerateOutcome, Generator};
use crate::config::DispatcherConfig;
use crate::store::{DocumentId, Store, StoreError};

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

struct Inner {
    store: Arc<Store>,
    generator: Arc<Generator>,
    activity: Arc<Activity>,
    permits: Arc<Semaphore>,
    lookahead: u32,
}

impl Dispatcher {
    pub fn new(
        store: Arc<Store>,
        generator: Arc<Generator>,
        activity: Arc<Activity>,
        config: &DispatcherConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                generator,
                activity,
                permits: Arc::new(Semaphore::new(config.concurrency.max(1))),
                lookahead: config.lookahead,
            }),
        }
    }

    /// Pages `current ..= current + lookahead`, clipped to the document.
    pub fn window(current_page: u32, lookahead: u32, total_units: u32) -> Option<(u32, u32)> {
        if total_units == 0 {
            return None;
        }
        let first = current_page.clamp(1, total_units);
        let last = first.saturating_add(lookahead).min(total_units);
        Some((first, last))
    }

    /// Schedule generation for the pending units in the document's window.
    ///
    /// Returns how many tasks were spawned.  Must be called from within the
    /// tokio runtime; the tasks run detached.
    pub async fn on_document_activity(&self, document: DocumentId) -> Result<usize, DispatchError> {
        let inner = &self.inner;
        let lookahead = inner.lookahead;
        let Some((first, last, claims)) = inner
            .store
            .blocking(move |store| {
                let doc = store.document(document)?;
                let Some((first, last)) =
                    Self::window(doc.current_page, lookahead, doc.total_units)
                else {
                    return Ok(None);
                };
                let mut claims = Vec::new();
                for unit in store.pending_in_window(document, first, last)? {
                    match store.try_claim(unit.id)?.granted() {
                        Some(claim) => claims.push(claim),
                        None => log::debug!("dispatcher: unit {} already claimed", unit.id),
                    }
                }
                Ok(Some((first, last, claims)))
            })
            .await?
        else {
            log::debug!("dispatcher: document {document} not split yet");
            return Ok(0);
        };

        let scheduled = claims.len();
        for claim in claims {
            let guard = inner.activity.begin_generation(document);
            let task = Arc::clone(inner);
            tokio::spawn(async move {
                let _guard = guard;
                let Ok(_permit) = task.permits.acquire().await else {
                    log::warn!("dispatcher: pool closed, unit {} left claimed", claim.unit_id);
                    return;
                };
                // `generate` touches the claim first; a claim taken over
                // while queued comes back as ClaimLost.
                match task.generator.generate(&claim).await {
                    Ok(GenerateOutcome::Generated { .. }) => {}
                    Ok(outcome) => {
                        log::debug!("dispatcher: unit {}: {outcome:?}", claim.unit_id);
                    }
                    Err(e) => log::warn!("dispatcher: unit {} failed: {e}", claim.unit_id),
                }
            });
        }

        if scheduled > 0 {
            log::info!(
                "dispatcher: document {document}: scheduled {scheduled} of pages {first}..={last}"
            );
        }
        Ok(scheduled)
    }
}
