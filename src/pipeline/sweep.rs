//! Single-shot backlog worker.
//!
//! Meant to be run by an external scheduler (cron, systemd timer) as
//! `misojo sweep`.  Each call handles at most one unit: the oldest one,
//! across all documents, that has no artifact and no live claim.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use super::generator::{GenerateError, GenerateOutcome, Generator};
use crate::store::{Store, StoreError, UnitId};

#[derive(Debug, Error)]
pub enum SweepError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("unit {unit_id}: {source}")]
    Generate {
        unit_id: UnitId,
        #[source]
        source: GenerateError,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum SweepOutcome {
    /// No claimable unit exists.
    Idle,
    /// The selected unit was claimed by someone else first.
    LostRace { unit_id: UnitId },
    Processed {
        unit_id: UnitId,
        outcome: GenerateOutcome,
    },
}

pub struct SweepWorker {
    store: Arc<Store>,
    generator: Arc<Generator>,
}

impl SweepWorker {
    pub fn new(store: Arc<Store>, generator: Arc<Generator>) -> Self {
        Self { store, generator }
    }

    /// Generate the oldest claimable unit, if any, to completion.
    pub async fn sweep_once(&self) -> Result<SweepOutcome, SweepError> {
        let Some(unit) = self.store.blocking(|store| store.oldest_claimable()).await? else {
            log::debug!("sweep: backlog empty");
            return Ok(SweepOutcome::Idle);
        };

        let id = unit.id;
        let Some(claim) = self
            .store
            .blocking(move |store| store.try_claim(id))
            .await?
            .granted()
        else {
            log::debug!("sweep: lost race for unit {}", unit.id);
            return Ok(SweepOutcome::LostRace { unit_id: unit.id });
        };

        log::info!("sweep: generating unit {} (document {})", unit.id, unit.document_id);
        let outcome = self
            .generator
            .generate(&claim)
            .await
            .map_err(|source| SweepError::Generate {
                unit_id: unit.id,
                source,
            })?;
        Ok(SweepOutcome::Processed {
            unit_id: unit.id,
            outcome,
        })
    }
}
