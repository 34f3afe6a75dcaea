//! Page-by-page audio generation.
//!
//! This module wires document splitting, per-page synthesis and the two
//! workers that drive it.
//!
//! # Architecture
//!
//! ```text
//! Pipeline::create_document
//!        │  SplitRequested (mpsc)
//!        ▼
//! EventLoop ─▶ Splitter::split ─▶ Store::insert_units (one transaction)
//!        │
//!        ▼
//! Dispatcher::on_document_activity        ◀── Pipeline::advance_position
//!        │  window current..=current+lookahead, Store::try_claim each
//!        ▼
//! tokio::spawn ─▶ Semaphore(concurrency) ─▶ Generator::generate
//!                                              │
//!                                              ▼
//!                                     Store::complete (artifact + release)
//!
//! SweepWorker::sweep_once  (separate process, external timer)
//!        └─▶ Store::oldest_claimable ─▶ try_claim ─▶ Generator::generate
//!
//! status::progress ◀── Store::counts + Activity (never stored)
//! ```
//!
//! # Quick start
//!
//! ```rust,no_run
//! use misojo::config::AppConfig;
//! use misojo::pipeline::{Components, Pipeline};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = AppConfig::load()?;
//!     let pipeline = Pipeline::start(Components::from_config(&config)?, &config);
//!
//!     let bytes = std::fs::read("book.pdf")?;
//!     let doc = pipeline.create_document("alice", "book.pdf", bytes, "en").await?;
//!     pipeline.wait_idle().await;
//!     println!("{}", pipeline.status(doc).await?);
//!     Ok(())
//! }
//! ```

pub mod activity;
pub mod dispatcher;
pub mod generator;
pub mod service;
pub mod splitter;
pub mod status;
pub mod sweep;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use activity::{Activity, ActivityGuard};
pub use dispatcher::{DispatchError, Dispatcher};
pub use generator::{GenerateError, GenerateOutcome, Generator};
pub use service::{Components, ImportReport, Pipeline, PipelineError, PipelineEvent};
pub use splitter::{SplitError, Splitter};
pub use status::{DocumentProgress, DocumentStatus};
pub use sweep::{SweepError, SweepOutcome, SweepWorker};
