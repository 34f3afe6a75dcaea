//! Row types returned by the unit store.

use std::fmt;

use serde::Serialize;

use crate::blob::BlobRef;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Primary key of a document row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct DocumentId(pub i64);

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Primary key of a unit row.  Ids are assigned in creation order, which is
/// the order the sweep worker drains the backlog in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct UnitId(pub i64);

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Document
// ---------------------------------------------------------------------------

/// Input for [`Store::insert_document`](super::Store::insert_document).
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub owner: String,
    pub name: String,
    pub language: String,
    pub source: BlobRef,
}

/// A submitted source document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Document {
    pub id: DocumentId,
    /// Opaque reference to the owning user in the surrounding application.
    pub owner: String,
    /// Cleaned file name, unique per language for bulk imports.
    pub name: String,
    /// Language code used for placeholders and synthesis (`en`, `es`, ...).
    pub language: String,
    /// Where the full source file is stored.
    pub source: BlobRef,
    /// Number of pages; `0` until the splitter has run.
    pub total_units: u32,
    /// 1-based page the reader is currently on.
    pub current_page: u32,
    /// Set when splitting failed permanently.
    pub split_error: Option<String>,
    /// Unix milliseconds.
    pub created_at: i64,
    /// Unix milliseconds.
    pub updated_at: i64,
}

impl Document {
    pub fn is_split(&self) -> bool {
        self.total_units > 0
    }
}

// ---------------------------------------------------------------------------
// Unit
// ---------------------------------------------------------------------------

/// One page of one document and its generation state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Unit {
    pub id: UnitId,
    pub document_id: DocumentId,
    /// 1-based position of the page inside its document.
    pub page: u32,
    /// Single-page sub-document produced by the splitter.
    pub source: BlobRef,
    /// Generated audio; `None` until the unit is ready.
    pub artifact: Option<BlobRef>,
    /// Token of the worker currently holding the generation claim.
    pub claim_token: Option<String>,
    /// Unix milliseconds at which the current claim was taken.
    pub claimed_at: Option<i64>,
    /// Unix milliseconds at which the artifact was written.
    pub generated_at: Option<i64>,
}

impl Unit {
    pub fn is_ready(&self) -> bool {
        self.artifact.is_some()
    }
}

// ---------------------------------------------------------------------------
// Claims
// ---------------------------------------------------------------------------

/// Proof that the caller won the exclusive right to generate one unit.
///
/// Only the holder of a matching token can write the artifact or release
/// the claim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claim {
    pub unit_id: UnitId,
    pub token: String,
    pub claimed_at: i64,
}

/// Result of [`Store::try_claim`](super::Store::try_claim).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimOutcome {
    Granted(Claim),
    /// The unit already has an artifact or another worker holds a live claim.
    AlreadyClaimed,
}

impl ClaimOutcome {
    pub fn granted(self) -> Option<Claim> {
        match self {
            ClaimOutcome::Granted(claim) => Some(claim),
            ClaimOutcome::AlreadyClaimed => None,
        }
    }
}

/// Per-document counters used by the status aggregator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UnitCounts {
    /// Units with a page inside `1..=total_units`.
    pub total: u32,
    /// Of those, units that have an artifact.
    pub ready: u32,
    /// Units without an artifact whose claim is still live (not stale).
    pub live_claims: u32,
}
