//! Unit → audio artifact.
//!
//! # Flow
//!
//! ```text
//! claim ─▶ touch: still pending and ours? ──no──▶ AlreadyGenerated / ClaimLost
//!              │ yes (claimed_at restarts)
//!              ▼
//!          fetch page blob            (failure: claim left for stale reclaim)
//!              ▼
//!          spawn_blocking(extract)    (failure: treated as empty text)
//!              ▼
//!          prepare_text               (empty ⇒ language placeholder)
//!              ▼
//!          synthesize                 (failure: claim abandoned)
//!              ▼
//!          store track blob ─▶ Store::complete (sets artifact, releases claim)
//! ```

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::blob::keys::{track_key, unit_label};
use crate::blob::{BlobError, BlobRef, BlobStore};
use crate::source::TextExtractor;
use crate::speech::{prepare_text, SpeechSynthesizer, SynthError};
use crate::store::{Claim, Store, StoreError};

#[derive(Debug, Error)]
pub enum GenerateError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("could not fetch page sub-document: {0}")]
    Fetch(#[source] BlobError),

    #[error(transparent)]
    Synthesis(#[from] SynthError),

    #[error("could not store audio: {0}")]
    Storage(#[source] BlobError),

    #[error("generation timed out after {0:?}")]
    Timeout(Duration),
}

/// Successful results of [`Generator::generate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum GenerateOutcome {
    /// Audio was produced and recorded on the unit.
    Generated { artifact: BlobRef },
    /// The unit already had an artifact; nothing was done.
    AlreadyGenerated,
    /// Another worker took the claim over; nothing was recorded.
    ClaimLost,
}

pub struct Generator {
    store: Arc<Store>,
    blobs: Arc<dyn BlobStore>,
    extractor: Arc<dyn TextExtractor>,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    audio_extension: String,
    timeout: Duration,
}

impl Generator {
    pub fn new(
        store: Arc<Store>,
        blobs: Arc<dyn BlobStore>,
        extractor: Arc<dyn TextExtractor>,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        audio_extension: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            blobs,
            extractor,
            synthesizer,
            audio_extension: audio_extension.into(),
            timeout,
        }
    }

    /// Produce the audio for the unit named by `claim`.
    ///
    /// The caller must hold `claim`, obtained from [`Store::try_claim`].
    /// The claim's staleness clock restarts here, so time spent waiting
    /// before this call does not count against it.
    pub async fn generate(&self, claim: &Claim) -> Result<GenerateOutcome, GenerateError> {
        let result = match tokio::time::timeout(self.timeout, self.run(claim)).await {
            Ok(result) => result,
            Err(_) => Err(GenerateError::Timeout(self.timeout)),
        };

        match &result {
            Ok(_) => {}
            // The claim stays until it goes stale.
            Err(GenerateError::Fetch(e)) => {
                log::warn!("generator: unit {} fetch failed: {e}", claim.unit_id);
            }
            Err(e) => {
                log::warn!("generator: unit {} failed: {e}", claim.unit_id);
                self.release(claim).await;
            }
        }
        result
    }

    async fn run(&self, claim: &Claim) -> Result<GenerateOutcome, GenerateError> {
        let held = claim.clone();
        let Some((unit, document)) = self
            .store
            .blocking(move |store| {
                if !store.touch(&held)? {
                    return Ok(None);
                }
                let unit = store.unit(held.unit_id)?;
                let document = store.document(unit.document_id)?;
                Ok(Some((unit, document)))
            })
            .await?
        else {
            let id = claim.unit_id;
            let unit = self.store.blocking(move |store| store.unit(id)).await?;
            return Ok(if unit.is_ready() {
                GenerateOutcome::AlreadyGenerated
            } else {
                GenerateOutcome::ClaimLost
            });
        };
        let label = unit_label(document.id, unit.page, unit.id);

        let page = self
            .blobs
            .fetch(&unit.source)
            .await
            .map_err(GenerateError::Fetch)?;

        let extractor = Arc::clone(&self.extractor);
        let extracted = match tokio::task::spawn_blocking(move || extractor.extract(&page)).await {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => {
                log::warn!("generator: {label}: extraction failed ({e}), using placeholder");
                String::new()
            }
            Err(e) => {
                log::warn!("generator: {label}: extraction task failed ({e}), using placeholder");
                String::new()
            }
        };

        let text = prepare_text(&extracted, &document.language);
        log::debug!("generator: {label}: synthesizing {} chars", text.chars().count());
        let audio = self.synthesizer.synthesize(&text, &document.language).await?;

        let key = track_key(document.id, unit.page, &claim.token, &self.audio_extension);
        let artifact = self
            .blobs
            .store(audio, &key)
            .await
            .map_err(GenerateError::Storage)?;

        let (held, recorded) = (claim.clone(), artifact.clone());
        if self
            .store
            .blocking(move |store| store.complete(&held, &recorded))
            .await?
        {
            log::info!("generator: {label} ready");
            return Ok(GenerateOutcome::Generated { artifact });
        }

        log::info!("generator: {label}: claim superseded, discarding audio");
        if let Err(e) = self.blobs.remove(&artifact).await {
            log::warn!("generator: could not remove orphaned {artifact}: {e}");
        }
        Ok(GenerateOutcome::ClaimLost)
    }

    async fn release(&self, claim: &Claim) {
        let held = claim.clone();
        match self.store.blocking(move |store| store.abandon(&held)).await {
            Ok(true) => log::debug!("generator: released claim on unit {}", claim.unit_id),
            Ok(false) => {}
            Err(e) => log::warn!("generator: could not release unit {}: {e}", claim.unit_id),
        }
    }
}
