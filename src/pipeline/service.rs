//! Pipeline facade and event loop.
//!
//! [`Pipeline`] is what the binary talks to.  State changes that should set
//! work in motion are sent as [`PipelineEvent`]s over a `tokio::sync::mpsc`
//! channel to an event loop task:
//!
//! ```text
//! create_document ──▶ SplitRequested ──▶ spawn(Splitter::split)
//!                                              └─▶ Dispatcher::on_document_activity
//! advance_position ─▶ PositionAdvanced ─▶ Dispatcher::on_document_activity
//! ```
//!
//! Each event carries an [`ActivityGuard`], so [`Pipeline::wait_idle`]
//! covers events that are still queued.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;

use super::activity::{Activity, ActivityGuard};
use super::dispatcher::{DispatchError, Dispatcher};
use super::generator::Generator;
use super::splitter::{SplitError, Splitter};
use super::status::{self, DocumentProgress, DocumentStatus};
use super::sweep::SweepWorker;
use crate::blob::keys::{clean_file_name, source_key, unique_id};
use crate::blob::{BlobError, BlobRouter, BlobStore};
use crate::config::AppConfig;
use crate::source::{AutoFormat, DocumentFormat, TextExtractor};
use crate::speech::{self, SpeechSynthesizer};
use crate::store::{Document, DocumentId, NewDocument, Store, StoreError};

/// File extensions picked up by [`Pipeline::import_dir`].
const IMPORT_EXTENSIONS: [&str; 2] = ["pdf", "txt"];

const EVENT_CHANNEL_CAPACITY: usize = 256;

// ---------------------------------------------------------------------------
// PipelineError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Blob(#[from] BlobError),

    #[error(transparent)]
    Split(#[from] SplitError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid input: {0}")]
    Invalid(String),

    /// The event loop is gone; the runtime is shutting down.
    #[error("pipeline event loop has stopped")]
    Closed,
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum PipelineEvent {
    /// A document was created and should be split.
    SplitRequested(ActivityGuard),
    /// The reader moved; refill the lookahead window.
    PositionAdvanced(ActivityGuard),
}

// ---------------------------------------------------------------------------
// Components
// ---------------------------------------------------------------------------

/// Everything the pipeline is built from.  Swap any part for a test double.
pub struct Components {
    pub store: Arc<Store>,
    pub blobs: Arc<dyn BlobStore>,
    pub format: Arc<dyn DocumentFormat>,
    pub extractor: Arc<dyn TextExtractor>,
    pub synthesizer: Arc<dyn SpeechSynthesizer>,
}

impl Components {
    /// Production wiring: SQLite store, local/remote blob router, format
    /// sniffing and the configured speech backend.
    pub fn from_config(config: &AppConfig) -> Result<Self, PipelineError> {
        let store = Store::open(config.storage.database_path(), config.claims.stale_after())?;
        Ok(Self {
            store: Arc::new(store),
            blobs: Arc::new(BlobRouter::from_config(&config.storage)),
            format: Arc::new(AutoFormat),
            extractor: Arc::new(AutoFormat),
            synthesizer: speech::from_config(&config.synthesis),
        })
    }
}

// ---------------------------------------------------------------------------
// ImportReport
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportReport {
    pub imported: Vec<DocumentId>,
    /// Cleaned names already present for their language.
    pub skipped: Vec<String>,
    /// Files that could not be imported, with the reason.
    pub failed: Vec<(PathBuf, String)>,
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

pub struct Pipeline {
    store: Arc<Store>,
    blobs: Arc<dyn BlobStore>,
    format: Arc<dyn DocumentFormat>,
    splitter: Arc<Splitter>,
    generator: Arc<Generator>,
    dispatcher: Dispatcher,
    activity: Arc<Activity>,
    events: mpsc::Sender<PipelineEvent>,
}

impl Pipeline {
    /// Build the pipeline and spawn its event loop on the current runtime.
    pub fn start(components: Components, config: &AppConfig) -> Self {
        let Components {
            store,
            blobs,
            format,
            extractor,
            synthesizer,
        } = components;

        let activity = Activity::new();
        let splitter = Arc::new(Splitter::new(
            Arc::clone(&store),
            Arc::clone(&blobs),
            Arc::clone(&format),
        ));
        let generator = Arc::new(Generator::new(
            Arc::clone(&store),
            Arc::clone(&blobs),
            extractor,
            synthesizer,
            config.synthesis.audio_extension.clone(),
            config.generation.timeout(),
        ));
        let dispatcher = Dispatcher::new(
            Arc::clone(&store),
            Arc::clone(&generator),
            Arc::clone(&activity),
            &config.dispatcher,
        );

        let (events, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let event_loop = EventLoop {
            splitter: Arc::clone(&splitter),
            dispatcher: dispatcher.clone(),
        };
        tokio::spawn(event_loop.run(rx));

        Self {
            store,
            blobs,
            format,
            splitter,
            generator,
            dispatcher,
            activity,
            events,
        }
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// A sweep worker sharing this pipeline's store and generator.
    pub fn sweep_worker(&self) -> SweepWorker {
        SweepWorker::new(Arc::clone(&self.store), Arc::clone(&self.generator))
    }

    // -----------------------------------------------------------------------
    // Operations
    // -----------------------------------------------------------------------

    /// Store the uploaded bytes, record the document and request its split.
    ///
    /// Returns as soon as the document row exists; splitting and generation
    /// continue in the background.
    pub async fn create_document(
        &self,
        owner: &str,
        name: &str,
        bytes: Vec<u8>,
        language: &str,
    ) -> Result<DocumentId, PipelineError> {
        let doc = self.insert(owner, name, bytes, language).await?;
        let guard = self.activity.begin_split(doc.id);
        self.events
            .send(PipelineEvent::SplitRequested(guard))
            .await
            .map_err(|_| PipelineError::Closed)?;
        Ok(doc.id)
    }

    async fn insert(
        &self,
        owner: &str,
        name: &str,
        bytes: Vec<u8>,
        language: &str,
    ) -> Result<Document, PipelineError> {
        let language = language.trim();
        if language.is_empty() {
            return Err(PipelineError::Invalid("language code is empty".into()));
        }
        let cleaned = clean_file_name(name);
        if cleaned.is_empty() {
            return Err(PipelineError::Invalid(format!("unusable file name {name:?}")));
        }

        let extension = self.format.extension(&bytes);
        let source = self
            .blobs
            .store(bytes, &source_key(owner, &unique_id(), &cleaned, extension))
            .await?;
        let new = NewDocument {
            owner: owner.to_string(),
            name: cleaned,
            language: language.to_string(),
            source: source.clone(),
        };
        let doc = match self.store.blocking(move |store| store.insert_document(&new)).await {
            Ok(doc) => doc,
            Err(e) => {
                if let Err(remove) = self.blobs.remove(&source).await {
                    log::warn!("pipeline: could not remove orphaned {source}: {remove}");
                }
                return Err(e.into());
            }
        };
        log::info!(
            "pipeline: created document {} ({:?}, {}) for {owner}",
            doc.id,
            doc.name,
            doc.language
        );
        Ok(doc)
    }

    /// Move the reader to `page` and refill the lookahead window around it.
    pub async fn advance_position(
        &self,
        document: DocumentId,
        page: u32,
    ) -> Result<Document, PipelineError> {
        let doc = self
            .store
            .blocking(move |store| store.set_current_page(document, page))
            .await?;
        let guard = self.activity.begin_dispatch(document);
        self.events
            .send(PipelineEvent::PositionAdvanced(guard))
            .await
            .map_err(|_| PipelineError::Closed)?;
        Ok(doc)
    }

    pub async fn status(&self, document: DocumentId) -> Result<DocumentStatus, PipelineError> {
        Ok(self.progress(document).await?.status)
    }

    pub async fn progress(&self, document: DocumentId) -> Result<DocumentProgress, PipelineError> {
        let activity = Arc::clone(&self.activity);
        Ok(self
            .store
            .blocking(move |store| status::progress(store, &activity, document))
            .await?)
    }

    pub async fn documents(&self) -> Result<Vec<Document>, PipelineError> {
        Ok(self.store.blocking(|store| store.documents()).await?)
    }

    /// Delete a document, its units and every blob they reference.
    ///
    /// Blob removal is best-effort; returns how many blobs were removed.
    pub async fn delete_document(&self, document: DocumentId) -> Result<usize, PipelineError> {
        let blobs = self
            .store
            .blocking(move |store| store.delete_document(document))
            .await?;
        self.activity.forget(document);

        let mut removed = 0;
        for blob in &blobs {
            match self.blobs.remove(blob).await {
                Ok(()) => removed += 1,
                Err(e) => log::warn!("pipeline: could not remove {blob}: {e}"),
            }
        }
        log::info!("pipeline: deleted document {document} ({removed}/{} blobs)", blobs.len());
        Ok(removed)
    }

    /// Import every `<dir>/<lang>/*.pdf|*.txt` file for `owner`.
    ///
    /// Files whose cleaned name already exists for that language are
    /// skipped.  Each new document is split before the next one is read.
    pub async fn import_dir(&self, dir: &Path, owner: &str) -> Result<ImportReport, PipelineError> {
        let mut report = ImportReport::default();

        for (language, path) in import_candidates(dir)? {
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let cleaned = clean_file_name(file_name);
            let (name, lang) = (cleaned.clone(), language.clone());
            if self
                .store
                .blocking(move |store| store.find_document(&name, &lang))
                .await?
                .is_some()
            {
                log::debug!("pipeline: import skips existing {cleaned:?} ({language})");
                report.skipped.push(cleaned);
                continue;
            }

            let bytes = match tokio::fs::read(&path).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    log::warn!("pipeline: import could not read {}: {e}", path.display());
                    report.failed.push((path, e.to_string()));
                    continue;
                }
            };

            let doc = match self.insert(owner, file_name, bytes, &language).await {
                Ok(doc) => doc,
                Err(e) => {
                    log::warn!("pipeline: import could not add {}: {e}", path.display());
                    report.failed.push((path, e.to_string()));
                    continue;
                }
            };
            let _guard = self.activity.begin_split(doc.id);
            match self.splitter.split(doc.id).await {
                Ok(_) => {
                    self.dispatcher.on_document_activity(doc.id).await?;
                }
                Err(e) => report.failed.push((path, e.to_string())),
            }
            report.imported.push(doc.id);
        }

        log::info!(
            "pipeline: import from {} done ({} imported, {} skipped, {} failed)",
            dir.display(),
            report.imported.len(),
            report.skipped.len(),
            report.failed.len()
        );
        Ok(report)
    }

    /// Resolve once no split or generation started by this pipeline is
    /// outstanding.
    pub async fn wait_idle(&self) {
        self.activity.wait_idle().await;
    }
}

/// `(language, path)` for every importable file, sorted for a stable order.
fn import_candidates(dir: &Path) -> Result<Vec<(String, PathBuf)>, PipelineError> {
    let io_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source| PipelineError::Io { path, source }
    };

    let mut found = Vec::new();
    for lang_entry in std::fs::read_dir(dir).map_err(io_err(dir))? {
        let lang_dir = lang_entry.map_err(io_err(dir))?.path();
        if !lang_dir.is_dir() {
            continue;
        }
        let Some(language) = lang_dir.file_name().and_then(|n| n.to_str()).map(str::to_string)
        else {
            continue;
        };

        for file in std::fs::read_dir(&lang_dir).map_err(io_err(&lang_dir))? {
            let path = file.map_err(io_err(&lang_dir))?.path();
            let importable = path.is_file()
                && path
                    .extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| IMPORT_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()));
            if importable {
                found.push((language.clone(), path));
            }
        }
    }
    found.sort();
    Ok(found)
}

// ---------------------------------------------------------------------------
// EventLoop
// ---------------------------------------------------------------------------

struct EventLoop {
    splitter: Arc<Splitter>,
    dispatcher: Dispatcher,
}

impl EventLoop {
    async fn run(self, mut rx: mpsc::Receiver<PipelineEvent>) {
        while let Some(event) = rx.recv().await {
            match event {
                PipelineEvent::SplitRequested(guard) => self.handle_split(guard),
                PipelineEvent::PositionAdvanced(guard) => self.handle_activity(guard).await,
            }
        }
        log::info!("pipeline: event channel closed, event loop shutting down");
    }

    /// Splits run as their own tasks so a large document does not hold up
    /// position updates for other documents.
    fn handle_split(&self, guard: ActivityGuard) {
        let splitter = Arc::clone(&self.splitter);
        let dispatcher = self.dispatcher.clone();
        tokio::spawn(async move {
            let document = guard.document();
            if splitter.split(document).await.is_ok() {
                if let Err(e) = dispatcher.on_document_activity(document).await {
                    log::error!("pipeline: dispatch for document {document} failed: {e}");
                }
            }
            // The split guard outlives the dispatch so waiters never observe
            // a gap between the two.
            drop(guard);
        });
    }

    async fn handle_activity(&self, guard: ActivityGuard) {
        let document = guard.document();
        if let Err(e) = self.dispatcher.on_document_activity(document).await {
            log::error!("pipeline: dispatch for document {document} failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::LocalBlobStore;
    use crate::pipeline::generator::tests::EchoSynth;
    use std::time::Duration;

    struct Harness {
        dir: tempfile::TempDir,
        pipeline: Pipeline,
        synth: Arc<EchoSynth>,
        blobs: Arc<LocalBlobStore>,
    }

    fn harness(lookahead: u32) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.dispatcher.lookahead = lookahead;
        config.generation.timeout_secs = 10;

        let store = Store::open(dir.path().join("misojo.db"), Duration::from_secs(600)).unwrap();
        let blobs = Arc::new(LocalBlobStore::new(dir.path().join("blobs")));
        let synth = Arc::new(EchoSynth::default());
        let pipeline = Pipeline::start(
            Components {
                store: Arc::new(store),
                blobs: blobs.clone(),
                format: Arc::new(AutoFormat),
                extractor: Arc::new(AutoFormat),
                synthesizer: synth.clone(),
            },
            &config,
        );
        Harness {
            dir,
            pipeline,
            synth,
            blobs,
        }
    }

    fn paged(pages: usize) -> Vec<u8> {
        (1..=pages)
            .map(|i| format!("page {i}"))
            .collect::<Vec<_>>()
            .join("\x0c")
            .into_bytes()
    }

    fn sorted_texts(synth: &EchoSynth) -> Vec<String> {
        let mut texts = synth.texts();
        texts.sort();
        texts
    }

    #[tokio::test]
    async fn create_splits_and_fills_the_window() {
        let h = harness(2);
        let doc = h
            .pipeline
            .create_document("alice", "Big Book.txt", paged(6), "en")
            .await
            .unwrap();
        h.pipeline.wait_idle().await;

        let progress = h.pipeline.progress(doc).await.unwrap();
        assert_eq!(progress.total_units, 6);
        assert_eq!(progress.ready_units, 3);
        assert_eq!(progress.status, DocumentStatus::Queued);
        assert_eq!(sorted_texts(&h.synth), vec!["page 1", "page 2", "page 3"]);

        let doc = h.pipeline.store().document(doc).unwrap();
        assert_eq!(doc.name, "big_book");
        let key = doc.source.local_key().unwrap();
        assert!(key.starts_with("files/alice/") && key.ends_with("-big_book.txt"), "{key}");
    }

    #[tokio::test]
    async fn same_name_uploads_keep_separate_sources() {
        let h = harness(0);
        let first = h
            .pipeline
            .create_document("alice", "book.txt", b"A1\x0cA2".to_vec(), "en")
            .await
            .unwrap();
        let second = h
            .pipeline
            .create_document("alice", "book.txt", b"B1\x0cB2\x0cB3".to_vec(), "en")
            .await
            .unwrap();
        h.pipeline.wait_idle().await;

        let store = h.pipeline.store();
        let (a, b) = (store.document(first).unwrap(), store.document(second).unwrap());
        assert_ne!(a.source, b.source);
        assert_eq!(a.total_units, 2);
        assert_eq!(b.total_units, 3);

        h.pipeline.delete_document(second).await.unwrap();
        assert_eq!(h.blobs.fetch(&a.source).await.unwrap(), b"A1\x0cA2");
        assert!(matches!(h.blobs.fetch(&b.source).await, Err(BlobError::NotFound(_))));
    }

    #[tokio::test]
    async fn advancing_generates_ahead_of_the_reader() {
        let h = harness(1);
        let doc = h
            .pipeline
            .create_document("bob", "notes", paged(5), "en")
            .await
            .unwrap();
        h.pipeline.wait_idle().await;
        assert_eq!(h.synth.count(), 2);

        h.pipeline.advance_position(doc, 4).await.unwrap();
        h.pipeline.wait_idle().await;

        let ready: Vec<u32> = h
            .pipeline
            .store()
            .units(doc)
            .unwrap()
            .into_iter()
            .filter(|u| u.is_ready())
            .map(|u| u.page)
            .collect();
        assert_eq!(ready, vec![1, 2, 4, 5]);
        assert_eq!(h.pipeline.status(doc).await.unwrap(), DocumentStatus::Queued);

        h.pipeline.advance_position(doc, 3).await.unwrap();
        h.pipeline.wait_idle().await;
        assert_eq!(h.pipeline.status(doc).await.unwrap(), DocumentStatus::Complete);
    }

    #[tokio::test]
    async fn advancing_past_the_end_is_rejected() {
        let h = harness(1);
        let doc = h
            .pipeline
            .create_document("bob", "short", paged(2), "en")
            .await
            .unwrap();
        h.pipeline.wait_idle().await;

        let err = h.pipeline.advance_position(doc, 3).await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Store(StoreError::PageOutOfRange { .. })
        ));
    }

    #[tokio::test]
    async fn unreadable_upload_ends_failed() {
        let h = harness(5);
        let doc = h
            .pipeline
            .create_document("carol", "scan.pdf", vec![0xff, 0x00, 0x13], "en")
            .await
            .unwrap();
        h.pipeline.wait_idle().await;

        let progress = h.pipeline.progress(doc).await.unwrap();
        assert_eq!(progress.status, DocumentStatus::Failed);
        assert_eq!(progress.total_units, 0);
        assert!(progress.split_error.is_some());
        assert_eq!(h.synth.count(), 0);
    }

    #[tokio::test]
    async fn empty_language_is_invalid() {
        let h = harness(5);
        let err = h
            .pipeline
            .create_document("carol", "book", paged(1), " ")
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Invalid(_)));
        assert!(h.pipeline.documents().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_removes_rows_and_blobs() {
        let h = harness(5);
        let doc = h
            .pipeline
            .create_document("dave", "gone", paged(3), "en")
            .await
            .unwrap();
        h.pipeline.wait_idle().await;
        assert_eq!(h.pipeline.status(doc).await.unwrap(), DocumentStatus::Complete);

        // 1 source + 3 pages + 3 tracks.
        assert_eq!(h.pipeline.delete_document(doc).await.unwrap(), 7);
        assert!(matches!(
            h.pipeline.status(doc).await,
            Err(PipelineError::Store(StoreError::DocumentNotFound(_)))
        ));
        assert_eq!(std::fs::read_dir(h.blobs.root().join("files/dave")).unwrap().count(), 0);
        assert_eq!(
            std::fs::read_dir(h.blobs.root().join(format!("pages/{doc}"))).unwrap().count(),
            0
        );
    }

    #[tokio::test]
    async fn import_walks_language_dirs_and_skips_duplicates() {
        let h = harness(5);
        let inbox = h.dir.path().join("inbox");
        std::fs::create_dir_all(inbox.join("en")).unwrap();
        std::fs::create_dir_all(inbox.join("es")).unwrap();
        std::fs::write(inbox.join("en/First Book.txt"), "uno\x0cdos").unwrap();
        std::fs::write(inbox.join("en/ignored.epub"), "nope").unwrap();
        std::fs::write(inbox.join("es/Libro.txt"), "hola").unwrap();

        let report = h.pipeline.import_dir(&inbox, "importer").await.unwrap();
        assert_eq!(report.imported.len(), 2);
        assert!(report.skipped.is_empty());
        assert!(report.failed.is_empty());

        let docs = h.pipeline.documents().await.unwrap();
        let mut names: Vec<(String, String)> = docs
            .iter()
            .map(|d| (d.language.clone(), d.name.clone()))
            .collect();
        names.sort();
        assert_eq!(
            names,
            vec![
                ("en".to_string(), "first_book".to_string()),
                ("es".to_string(), "libro".to_string()),
            ]
        );
        for doc in &docs {
            assert!(doc.is_split());
        }

        let again = h.pipeline.import_dir(&inbox, "importer").await.unwrap();
        assert!(again.imported.is_empty());
        assert_eq!(again.skipped, vec!["first_book", "libro"]);
        h.pipeline.wait_idle().await;
    }

    #[tokio::test]
    async fn sweep_worker_shares_the_store() {
        let h = harness(0);
        let doc = h
            .pipeline
            .create_document("erin", "sweep", paged(3), "en")
            .await
            .unwrap();
        h.pipeline.wait_idle().await;
        assert_eq!(h.synth.count(), 1);

        let worker = h.pipeline.sweep_worker();
        while !matches!(
            worker.sweep_once().await.unwrap(),
            crate::pipeline::SweepOutcome::Idle
        ) {}
        assert_eq!(h.pipeline.status(doc).await.unwrap(), DocumentStatus::Complete);
    }
}
