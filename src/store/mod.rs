//! Durable unit store backed by SQLite.
//!
//! # Overview
//!
//! [`Store`] records every document and its page units, and is the sole
//! arbiter of generation claims.  The serving process (dispatcher) and the
//! out-of-process sweep worker each open their own [`Store`] on the same
//! database file; SQLite's write lock makes [`Store::try_claim`] and
//! [`Store::complete`] atomic across both.
//!
//! # Claim lifecycle
//!
//! ```text
//! pending ──try_claim──▶ claimed ──complete──▶ ready
//!    ▲                      │
//!    ├────── abandon ───────┤
//!    └── stale_after elapses┘ (claim may be taken over)
//! ```

pub mod schema;
pub mod types;

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use thiserror::Error;

use crate::blob::BlobRef;

use schema::{DOCUMENT_COLUMNS, SCHEMA, UNIT_COLUMNS};

pub use types::{
    Claim, ClaimOutcome, Document, DocumentId, NewDocument, Unit, UnitCounts, UnitId,
};

/// How long a connection waits on another process's write lock.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// StoreError
// ---------------------------------------------------------------------------

/// Errors that can occur while reading or writing the unit store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("could not prepare database location: {0}")]
    Io(#[from] std::io::Error),

    #[error("document {0} not found")]
    DocumentNotFound(DocumentId),

    #[error("unit {0} not found")]
    UnitNotFound(UnitId),

    /// The document already has its units; the total is set exactly once.
    #[error("document {0} has already been split")]
    AlreadySplit(DocumentId),

    #[error("a split must produce at least one page")]
    EmptySplit,

    #[error("page {page} is outside 1..={total} for document {document}")]
    PageOutOfRange {
        document: DocumentId,
        page: u32,
        total: u32,
    },

    #[error("store connection lock poisoned")]
    Poisoned,

    #[error("store task failed: {0}")]
    Task(String),
}

/// Current wall-clock time in Unix milliseconds.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// One connection to the unit database.
pub struct Store {
    conn: Mutex<Connection>,
    stale_after: Duration,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("stale_after", &self.stale_after)
            .finish_non_exhaustive()
    }
}

impl Store {
    /// Open (creating if needed) the database at `path`.
    ///
    /// `stale_after` is the age at which a claim is considered abandoned.
    pub fn open(path: impl AsRef<Path>, stale_after: Duration) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        Self::init(conn, stale_after)
    }

    /// Open a private in-memory database.  Only this handle can see it.
    pub fn open_in_memory(stale_after: Duration) -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?, stale_after)
    }

    fn init(conn: Connection, stale_after: Duration) -> Result<Self, StoreError> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        log::debug!("store: journal_mode = {mode}");
        conn.pragma_update(None, "foreign_keys", true)?;
        conn.execute_batch(SCHEMA)?;

        Ok(Self {
            conn: Mutex::new(conn),
            stale_after,
        })
    }

    pub fn stale_after(&self) -> Duration {
        self.stale_after
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Run `f` against the store on the blocking thread pool.
    ///
    /// Every store call may wait up to the busy timeout on another
    /// process's write lock, so async callers go through here.
    pub async fn blocking<T, F>(self: &Arc<Self>, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Store) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let store = Arc::clone(self);
        match tokio::task::spawn_blocking(move || f(&store)).await {
            Ok(result) => result,
            Err(e) => Err(StoreError::Task(e.to_string())),
        }
    }

    /// Claims taken at or before this instant are stale.
    fn stale_cutoff(&self, now: i64) -> i64 {
        now - i64::try_from(self.stale_after.as_millis()).unwrap_or(i64::MAX)
    }

    // -----------------------------------------------------------------------
    // Documents
    // -----------------------------------------------------------------------

    pub fn insert_document(&self, new: &NewDocument) -> Result<Document, StoreError> {
        let now = now_millis();
        let id = {
            let conn = self.conn()?;
            conn.execute(
                "INSERT INTO documents (owner, name, language, source, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
                params![new.owner, new.name, new.language, new.source.as_str(), now],
            )?;
            DocumentId(conn.last_insert_rowid())
        };
        self.document(id)
    }

    pub fn document(&self, id: DocumentId) -> Result<Document, StoreError> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {DOCUMENT_COLUMNS} FROM documents WHERE id = ?1"),
            params![id.0],
            document_from_row,
        )
        .optional()?
        .ok_or(StoreError::DocumentNotFound(id))
    }

    /// Look up a document by cleaned name and language.
    pub fn find_document(&self, name: &str, language: &str) -> Result<Option<Document>, StoreError> {
        let conn = self.conn()?;
        let doc = conn
            .query_row(
                &format!(
                    "SELECT {DOCUMENT_COLUMNS} FROM documents
                     WHERE name = ?1 AND language = ?2 ORDER BY id LIMIT 1"
                ),
                params![name, language],
                document_from_row,
            )
            .optional()?;
        Ok(doc)
    }

    pub fn documents(&self) -> Result<Vec<Document>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents ORDER BY id"
        ))?;
        let rows = stmt.query_map([], document_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Move the reading position of a split document.
    pub fn set_current_page(&self, id: DocumentId, page: u32) -> Result<Document, StoreError> {
        let doc = self.document(id)?;
        if page == 0 || (doc.is_split() && page > doc.total_units) {
            return Err(StoreError::PageOutOfRange {
                document: id,
                page,
                total: doc.total_units,
            });
        }
        {
            let conn = self.conn()?;
            conn.execute(
                "UPDATE documents SET current_page = ?1, updated_at = ?2 WHERE id = ?3",
                params![page, now_millis(), id.0],
            )?;
        }
        self.document(id)
    }

    /// Mark the split of `id` as permanently failed.
    pub fn record_split_failure(&self, id: DocumentId, message: &str) -> Result<(), StoreError> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE documents SET split_error = ?1, updated_at = ?2
             WHERE id = ?3 AND total_units = 0",
            params![message, now_millis(), id.0],
        )?;
        if changed == 0 {
            log::warn!("store: split failure for document {id} not recorded (missing or split)");
        }
        Ok(())
    }

    /// Delete a document and, through the foreign-key cascade, its units.
    ///
    /// Returns every blob the rows referenced so the caller can remove them.
    pub fn delete_document(&self, id: DocumentId) -> Result<Vec<BlobRef>, StoreError> {
        let doc = self.document(id)?;
        let units = self.units(id)?;

        let conn = self.conn()?;
        conn.execute("DELETE FROM documents WHERE id = ?1", params![id.0])?;

        let mut blobs = vec![doc.source];
        for unit in units {
            blobs.push(unit.source);
            blobs.extend(unit.artifact);
        }
        Ok(blobs)
    }

    // -----------------------------------------------------------------------
    // Units
    // -----------------------------------------------------------------------

    /// Create one unit per page source and fix the document's total, all in
    /// one transaction.
    ///
    /// `sources[i]` becomes page `i + 1`.
    pub fn insert_units(
        &self,
        document: DocumentId,
        sources: &[BlobRef],
    ) -> Result<Vec<Unit>, StoreError> {
        if sources.is_empty() {
            return Err(StoreError::EmptySplit);
        }
        let total = u32::try_from(sources.len()).map_err(|_| StoreError::EmptySplit)?;
        let now = now_millis();

        {
            let mut conn = self.conn()?;
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let changed = tx.execute(
                "UPDATE documents SET total_units = ?1, updated_at = ?2
                 WHERE id = ?3 AND total_units = 0 AND split_error IS NULL",
                params![total, now, document.0],
            )?;
            if changed == 0 {
                let exists: bool = tx.query_row(
                    "SELECT EXISTS (SELECT 1 FROM documents WHERE id = ?1)",
                    params![document.0],
                    |row| row.get(0),
                )?;
                return Err(if exists {
                    StoreError::AlreadySplit(document)
                } else {
                    StoreError::DocumentNotFound(document)
                });
            }

            {
                let mut insert = tx.prepare(
                    "INSERT INTO units (document_id, page, source, created_at)
                     VALUES (?1, ?2, ?3, ?4)",
                )?;
                for (page, source) in (1u32..).zip(sources) {
                    insert.execute(params![document.0, page, source.as_str(), now])?;
                }
            }

            tx.commit()?;
        }

        self.units(document)
    }

    /// All units of a document ordered by page.
    pub fn units(&self, document: DocumentId) -> Result<Vec<Unit>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {UNIT_COLUMNS} FROM units WHERE document_id = ?1 ORDER BY page"
        ))?;
        let rows = stmt.query_map(params![document.0], unit_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn unit(&self, id: UnitId) -> Result<Unit, StoreError> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {UNIT_COLUMNS} FROM units WHERE id = ?1"),
            params![id.0],
            unit_from_row,
        )
        .optional()?
        .ok_or(StoreError::UnitNotFound(id))
    }

    /// Units of `document` without an artifact whose page lies in
    /// `first..=last`, ordered by page.
    pub fn pending_in_window(
        &self,
        document: DocumentId,
        first: u32,
        last: u32,
    ) -> Result<Vec<Unit>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {UNIT_COLUMNS} FROM units
             WHERE document_id = ?1 AND page BETWEEN ?2 AND ?3 AND artifact IS NULL
             ORDER BY page"
        ))?;
        let rows = stmt.query_map(params![document.0, first, last], unit_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// The oldest unit (lowest id, across all documents) that has no
    /// artifact and no live claim.
    pub fn oldest_claimable(&self) -> Result<Option<Unit>, StoreError> {
        let cutoff = self.stale_cutoff(now_millis());
        let conn = self.conn()?;
        let unit = conn
            .query_row(
                &format!(
                    "SELECT {UNIT_COLUMNS} FROM units
                     WHERE artifact IS NULL AND (claim_token IS NULL OR claimed_at <= ?1)
                     ORDER BY id LIMIT 1"
                ),
                params![cutoff],
                unit_from_row,
            )
            .optional()?;
        Ok(unit)
    }

    /// Count pages, ready pages and live claims for a document.
    pub fn counts(&self, document: DocumentId) -> Result<UnitCounts, StoreError> {
        let cutoff = self.stale_cutoff(now_millis());
        let conn = self.conn()?;
        let counts = conn.query_row(
            "SELECT
                 COUNT(u.id),
                 COALESCE(SUM(u.artifact IS NOT NULL), 0),
                 COALESCE(SUM(u.artifact IS NULL AND u.claim_token IS NOT NULL
                              AND u.claimed_at > ?2), 0)
             FROM documents d
             JOIN units u ON u.document_id = d.id
             WHERE d.id = ?1 AND u.page BETWEEN 1 AND d.total_units",
            params![document.0, cutoff],
            |row| {
                Ok(UnitCounts {
                    total: row.get(0)?,
                    ready: row.get(1)?,
                    live_claims: row.get(2)?,
                })
            },
        )?;
        Ok(counts)
    }

    // -----------------------------------------------------------------------
    // Claims
    // -----------------------------------------------------------------------

    /// Atomically take the generation claim on `unit`.
    ///
    /// Granted only if the unit has no artifact and its claim is free or
    /// stale.  Safe against concurrent callers in any process sharing the
    /// database file.
    pub fn try_claim(&self, unit: UnitId) -> Result<ClaimOutcome, StoreError> {
        let now = now_millis();
        let token = uuid::Uuid::new_v4().to_string();

        let changed = {
            let conn = self.conn()?;
            conn.execute(
                "UPDATE units SET claim_token = ?1, claimed_at = ?2
                 WHERE id = ?3 AND artifact IS NULL
                   AND (claim_token IS NULL OR claimed_at <= ?4)",
                params![token, now, unit.0, self.stale_cutoff(now)],
            )?
        };

        if changed == 1 {
            log::debug!("store: claim granted on unit {unit}");
            Ok(ClaimOutcome::Granted(Claim {
                unit_id: unit,
                token,
                claimed_at: now,
            }))
        } else {
            // Distinguish "lost the race" from "no such unit".
            self.unit(unit)?;
            Ok(ClaimOutcome::AlreadyClaimed)
        }
    }

    /// Write the artifact and release the claim in one statement.
    ///
    /// Returns `false` (and writes nothing) if the unit already has an
    /// artifact or the claim was taken over by someone else.
    pub fn complete(&self, claim: &Claim, artifact: &BlobRef) -> Result<bool, StoreError> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE units SET artifact = ?1, generated_at = ?2,
                              claim_token = NULL, claimed_at = NULL
             WHERE id = ?3 AND artifact IS NULL AND claim_token = ?4",
            params![artifact.as_str(), now_millis(), claim.unit_id.0, claim.token],
        )?;
        Ok(changed == 1)
    }

    /// Restart the staleness clock of a claim the caller still holds.
    ///
    /// Returns `false` if the unit is ready or the claim was taken over.
    pub fn touch(&self, claim: &Claim) -> Result<bool, StoreError> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE units SET claimed_at = ?1
             WHERE id = ?2 AND artifact IS NULL AND claim_token = ?3",
            params![now_millis(), claim.unit_id.0, claim.token],
        )?;
        Ok(changed == 1)
    }

    /// Give a claim back so the unit is immediately claimable again.
    ///
    /// Returns `false` if the caller no longer held the claim.
    pub fn abandon(&self, claim: &Claim) -> Result<bool, StoreError> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE units SET claim_token = NULL, claimed_at = NULL
             WHERE id = ?1 AND claim_token = ?2",
            params![claim.unit_id.0, claim.token],
        )?;
        Ok(changed == 1)
    }

    #[cfg(test)]
    pub(crate) fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> T) -> T {
        let conn = self.conn().expect("store lock");
        f(&conn)
    }
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

fn document_from_row(row: &Row<'_>) -> rusqlite::Result<Document> {
    Ok(Document {
        id: DocumentId(row.get(0)?),
        owner: row.get(1)?,
        name: row.get(2)?,
        language: row.get(3)?,
        source: BlobRef::new(row.get::<_, String>(4)?),
        total_units: row.get(5)?,
        current_page: row.get(6)?,
        split_error: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

fn unit_from_row(row: &Row<'_>) -> rusqlite::Result<Unit> {
    Ok(Unit {
        id: UnitId(row.get(0)?),
        document_id: DocumentId(row.get(1)?),
        page: row.get(2)?,
        source: BlobRef::new(row.get::<_, String>(3)?),
        artifact: row.get::<_, Option<String>>(4)?.map(BlobRef::new),
        claim_token: row.get(5)?,
        claimed_at: row.get(6)?,
        generated_at: row.get(7)?,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use std::sync::{Arc, Barrier};
    use tempfile::tempdir;

    const LONG: Duration = Duration::from_secs(600);

    fn new_doc(name: &str) -> NewDocument {
        NewDocument {
            owner: "reader@example.com".into(),
            name: name.into(),
            language: "en".into(),
            source: BlobRef::local(&format!("files/reader/{name}.pdf")),
        }
    }

    fn page_refs(n: u32) -> Vec<BlobRef> {
        (1..=n)
            .map(|p| BlobRef::local(&format!("pages/1/{p}.pdf")))
            .collect()
    }

    fn split_doc(store: &Store, pages: u32) -> (Document, Vec<Unit>) {
        let doc = store.insert_document(&new_doc("book")).unwrap();
        let units = store.insert_units(doc.id, &page_refs(pages)).unwrap();
        (store.document(doc.id).unwrap(), units)
    }

    #[test]
    fn new_document_starts_unsplit_at_page_one() {
        let store = Store::open_in_memory(LONG).unwrap();
        let doc = store.insert_document(&new_doc("book")).unwrap();
        assert_eq!(doc.total_units, 0);
        assert_eq!(doc.current_page, 1);
        assert!(doc.split_error.is_none());
        assert!(!doc.is_split());
    }

    #[test]
    fn insert_units_numbers_pages_contiguously() {
        let store = Store::open_in_memory(LONG).unwrap();
        let (doc, units) = split_doc(&store, 7);

        assert_eq!(doc.total_units, 7);
        let pages: Vec<u32> = units.iter().map(|u| u.page).collect();
        assert_eq!(pages, (1..=7).collect::<Vec<_>>());
        assert!(units.iter().all(|u| u.artifact.is_none()));
    }

    #[test]
    fn total_units_is_set_exactly_once() {
        let store = Store::open_in_memory(LONG).unwrap();
        let (doc, _) = split_doc(&store, 3);

        let err = store.insert_units(doc.id, &page_refs(5)).unwrap_err();
        assert!(matches!(err, StoreError::AlreadySplit(_)));
        assert_eq!(store.document(doc.id).unwrap().total_units, 3);
        assert_eq!(store.units(doc.id).unwrap().len(), 3);
    }

    #[test]
    fn empty_split_is_rejected() {
        let store = Store::open_in_memory(LONG).unwrap();
        let doc = store.insert_document(&new_doc("empty")).unwrap();
        assert!(matches!(
            store.insert_units(doc.id, &[]),
            Err(StoreError::EmptySplit)
        ));
        assert_eq!(store.document(doc.id).unwrap().total_units, 0);
    }

    #[test]
    fn failed_split_blocks_later_split() {
        let store = Store::open_in_memory(LONG).unwrap();
        let doc = store.insert_document(&new_doc("broken")).unwrap();
        store.record_split_failure(doc.id, "not a pdf").unwrap();

        assert_eq!(
            store.document(doc.id).unwrap().split_error.as_deref(),
            Some("not a pdf")
        );
        assert!(store.insert_units(doc.id, &page_refs(2)).is_err());
    }

    #[test]
    fn claim_is_exclusive_until_released() {
        let store = Store::open_in_memory(LONG).unwrap();
        let (_, units) = split_doc(&store, 1);
        let unit = units[0].id;

        let claim = store.try_claim(unit).unwrap().granted().expect("first claim");
        assert_eq!(store.try_claim(unit).unwrap(), ClaimOutcome::AlreadyClaimed);

        assert!(store.abandon(&claim).unwrap());
        assert!(store.try_claim(unit).unwrap().granted().is_some());
    }

    #[test]
    fn complete_sets_artifact_once() {
        let store = Store::open_in_memory(LONG).unwrap();
        let (_, units) = split_doc(&store, 1);
        let unit = units[0].id;

        let claim = store.try_claim(unit).unwrap().granted().unwrap();
        let first = BlobRef::local("tracks/1/1-a.mp3");
        assert!(store.complete(&claim, &first).unwrap());

        let second = BlobRef::local("tracks/1/1-b.mp3");
        assert!(!store.complete(&claim, &second).unwrap());
        assert_eq!(store.try_claim(unit).unwrap(), ClaimOutcome::AlreadyClaimed);

        let stored = store.unit(unit).unwrap();
        assert_eq!(stored.artifact, Some(first));
        assert!(stored.claim_token.is_none());
        assert!(stored.generated_at.is_some());
    }

    #[test]
    fn stale_claim_can_be_taken_over() {
        let store = Store::open_in_memory(Duration::ZERO).unwrap();
        let (_, units) = split_doc(&store, 1);
        let unit = units[0].id;

        let old = store.try_claim(unit).unwrap().granted().unwrap();
        let new = store.try_claim(unit).unwrap().granted().expect("stale reclaim");
        assert_ne!(old.token, new.token);

        // The superseded holder can no longer write or release.
        assert!(!store.complete(&old, &BlobRef::local("tracks/x.mp3")).unwrap());
        assert!(!store.abandon(&old).unwrap());
        assert!(store.complete(&new, &BlobRef::local("tracks/y.mp3")).unwrap());
    }

    #[test]
    fn touch_refreshes_only_the_current_holder() {
        let store = Store::open_in_memory(Duration::from_millis(200)).unwrap();
        let (_, units) = split_doc(&store, 1);
        let unit = units[0].id;

        let claim = store.try_claim(unit).unwrap().granted().unwrap();
        std::thread::sleep(Duration::from_millis(250));
        assert!(store.touch(&claim).unwrap());
        assert!(store.unit(unit).unwrap().claimed_at.unwrap() > claim.claimed_at);
        // Fresh again, so not reclaimable.
        assert_eq!(store.try_claim(unit).unwrap(), ClaimOutcome::AlreadyClaimed);
        assert!(store.oldest_claimable().unwrap().is_none());

        std::thread::sleep(Duration::from_millis(250));
        let winner = store.try_claim(unit).unwrap().granted().expect("stale reclaim");
        assert!(!store.touch(&claim).unwrap());
        assert!(store.complete(&winner, &BlobRef::local("tracks/t.mp3")).unwrap());
        assert!(!store.touch(&winner).unwrap());
    }

    #[tokio::test]
    async fn blocking_runs_store_calls_off_the_runtime() {
        let store = Arc::new(Store::open_in_memory(LONG).unwrap());
        let doc = store
            .blocking(|s| s.insert_document(&new_doc("book")))
            .await
            .unwrap();
        let units = store
            .blocking(move |s| s.insert_units(doc.id, &page_refs(2)))
            .await
            .unwrap();
        assert_eq!(units.len(), 2);

        let err = store
            .blocking(|s| s.document(DocumentId(99)))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::DocumentNotFound(DocumentId(99))));
    }

    #[test]
    fn claim_on_missing_unit_is_an_error() {
        let store = Store::open_in_memory(LONG).unwrap();
        assert!(matches!(
            store.try_claim(UnitId(42)),
            Err(StoreError::UnitNotFound(UnitId(42)))
        ));
    }

    #[test]
    fn oldest_claimable_skips_ready_and_claimed_units() {
        let store = Store::open_in_memory(LONG).unwrap();
        let (_, units) = split_doc(&store, 3);

        let c1 = store.try_claim(units[0].id).unwrap().granted().unwrap();
        store.complete(&c1, &BlobRef::local("tracks/1.mp3")).unwrap();
        store.try_claim(units[1].id).unwrap().granted().unwrap();

        let next = store.oldest_claimable().unwrap().expect("one left");
        assert_eq!(next.id, units[2].id);
    }

    #[test]
    fn counts_track_ready_and_live_claims() {
        let store = Store::open_in_memory(LONG).unwrap();
        let (doc, units) = split_doc(&store, 3);

        let c1 = store.try_claim(units[0].id).unwrap().granted().unwrap();
        store.complete(&c1, &BlobRef::local("tracks/1.mp3")).unwrap();
        store.try_claim(units[1].id).unwrap();

        let counts = store.counts(doc.id).unwrap();
        assert_eq!(
            counts,
            UnitCounts {
                total: 3,
                ready: 1,
                live_claims: 1
            }
        );
    }

    #[test]
    fn pending_in_window_is_clipped_to_range() {
        let store = Store::open_in_memory(LONG).unwrap();
        let (doc, units) = split_doc(&store, 10);
        let c = store.try_claim(units[3].id).unwrap().granted().unwrap();
        store.complete(&c, &BlobRef::local("tracks/4.mp3")).unwrap();

        let pending: Vec<u32> = store
            .pending_in_window(doc.id, 3, 6)
            .unwrap()
            .iter()
            .map(|u| u.page)
            .collect();
        assert_eq!(pending, vec![3, 5, 6]);
    }

    #[test]
    fn current_page_must_be_inside_document() {
        let store = Store::open_in_memory(LONG).unwrap();
        let (doc, _) = split_doc(&store, 4);

        assert_eq!(store.set_current_page(doc.id, 4).unwrap().current_page, 4);
        assert!(matches!(
            store.set_current_page(doc.id, 5),
            Err(StoreError::PageOutOfRange { .. })
        ));
        assert!(store.set_current_page(doc.id, 0).is_err());
    }

    #[test]
    fn delete_cascades_to_units_and_lists_blobs() {
        let store = Store::open_in_memory(LONG).unwrap();
        let (doc, units) = split_doc(&store, 2);
        let c = store.try_claim(units[0].id).unwrap().granted().unwrap();
        store.complete(&c, &BlobRef::local("tracks/1.mp3")).unwrap();

        let blobs = store.delete_document(doc.id).unwrap();
        // source + 2 pages + 1 artifact
        assert_eq!(blobs.len(), 4);
        assert!(store.units(doc.id).unwrap().is_empty());
        assert!(matches!(
            store.unit(units[1].id),
            Err(StoreError::UnitNotFound(_))
        ));
    }

    #[test]
    fn find_document_by_name_and_language() {
        let store = Store::open_in_memory(LONG).unwrap();
        store.insert_document(&new_doc("quijote")).unwrap();

        assert!(store.find_document("quijote", "en").unwrap().is_some());
        assert!(store.find_document("quijote", "es").unwrap().is_none());
    }

    /// Parallel callers, each on its own connection like separate worker
    /// processes, race for one unit: exactly one wins.
    #[test]
    fn concurrent_claims_across_connections_grant_exactly_one() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("units.db");

        let unit = {
            let store = Store::open(&path, LONG).unwrap();
            let (_, units) = split_doc(&store, 1);
            units[0].id
        };

        const CALLERS: usize = 8;
        let barrier = Arc::new(Barrier::new(CALLERS));
        let handles: Vec<_> = (0..CALLERS)
            .map(|_| {
                let path = path.clone();
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    let store = Store::open(&path, LONG).unwrap();
                    barrier.wait();
                    store.try_claim(unit).unwrap()
                })
            })
            .collect();

        let outcomes: Vec<ClaimOutcome> =
            handles.into_iter().map(|h| h.join().unwrap()).collect();
        let granted: BTreeSet<String> = outcomes
            .into_iter()
            .filter_map(ClaimOutcome::granted)
            .map(|c| c.token)
            .collect();
        assert_eq!(granted.len(), 1);
    }
}
