//! Source document formats.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │  DocumentFormat (trait)          TextExtractor (trait)   │
//! │   split(source) → [page]          extract(page) → text   │
//! │                                                          │
//! │   ┌───────────┐  ┌──────────────┐                        │
//! │   │ PdfFormat │  │ PagedText    │  (each implements both)│
//! │   └─────┬─────┘  └──────┬───────┘                        │
//! │         └───────┬───────┘                                │
//! │             AutoFormat — picks by content sniffing       │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! Both traits are synchronous and CPU-bound; the pipeline runs them on
//! `tokio::task::spawn_blocking`.

pub mod auto;
pub mod format;
pub mod paged_text;
pub mod pdf;

pub use auto::AutoFormat;
pub use format::{DocumentFormat, SourceError, TextExtractor};
pub use paged_text::PagedTextFormat;
pub use pdf::PdfFormat;
