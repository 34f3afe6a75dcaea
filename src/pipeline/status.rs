//! Document status, derived on demand.
//!
//! Status is never stored.  It is recomputed from the unit rows plus the
//! transient [`Activity`] flags every time it is asked for.

use serde::Serialize;

use super::activity::Activity;
use crate::store::{DocumentId, Store, StoreError};

// ---------------------------------------------------------------------------
// DocumentStatus
// ---------------------------------------------------------------------------

/// Where a document stands.
///
/// ```text
/// New ──split starts──▶ Splitting ──split ok──▶ Generating ⇄ Queued ──▶ Complete
///                          └──split fails──▶ Failed
/// ```
///
/// `Complete` flips back to `Generating`/`Queued` if an artifact goes
/// missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    /// Not split yet and no split running.
    New,
    Splitting,
    /// Some pages lack audio and at least one generation is running, in this
    /// process or in another worker holding a live claim.
    Generating,
    /// Some pages lack audio and nothing is working on them.
    Queued,
    Complete,
    /// Splitting failed; the document will not be retried.
    Failed,
}

impl DocumentStatus {
    /// ```
    /// use misojo::pipeline::DocumentStatus;
    ///
    /// assert!(DocumentStatus::Generating.is_busy());
    /// assert!(!DocumentStatus::Queued.is_busy());
    /// ```
    pub fn is_busy(&self) -> bool {
        matches!(self, DocumentStatus::Splitting | DocumentStatus::Generating)
    }

    pub fn label(&self) -> &'static str {
        match self {
            DocumentStatus::New => "New",
            DocumentStatus::Splitting => "Splitting",
            DocumentStatus::Generating => "Generating",
            DocumentStatus::Queued => "Queued",
            DocumentStatus::Complete => "Complete",
            DocumentStatus::Failed => "Failed",
        }
    }
}

impl std::fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

// ---------------------------------------------------------------------------
// DocumentProgress
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentProgress {
    pub document: DocumentId,
    pub status: DocumentStatus,
    pub total_units: u32,
    pub ready_units: u32,
    /// Generations scheduled or running in this process.
    pub in_flight: u32,
    /// Pending units with a live claim, from any worker.
    pub live_claims: u32,
    pub current_page: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub split_error: Option<String>,
}

pub fn progress(
    store: &Store,
    activity: &Activity,
    document: DocumentId,
) -> Result<DocumentProgress, StoreError> {
    let doc = store.document(document)?;
    let in_flight = activity.in_flight(document);

    let mut progress = DocumentProgress {
        document,
        status: DocumentStatus::New,
        total_units: doc.total_units,
        ready_units: 0,
        in_flight,
        live_claims: 0,
        current_page: doc.current_page,
        split_error: doc.split_error.clone(),
    };

    if doc.split_error.is_some() {
        progress.status = DocumentStatus::Failed;
        return Ok(progress);
    }
    if !doc.is_split() {
        progress.status = if activity.is_splitting(document) {
            DocumentStatus::Splitting
        } else {
            DocumentStatus::New
        };
        return Ok(progress);
    }

    let counts = store.counts(document)?;
    progress.ready_units = counts.ready;
    progress.live_claims = counts.live_claims;

    progress.status = if counts.total == doc.total_units && counts.ready == doc.total_units {
        DocumentStatus::Complete
    } else if in_flight > 0 || counts.live_claims > 0 {
        DocumentStatus::Generating
    } else {
        DocumentStatus::Queued
    };
    Ok(progress)
}

pub fn status(
    store: &Store,
    activity: &Activity,
    document: DocumentId,
) -> Result<DocumentStatus, StoreError> {
    Ok(progress(store, activity, document)?.status)
}
