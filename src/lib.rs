//! misojo: turns uploaded documents into per-page audio.
//!
//! Documents are split into pages, each page's text is extracted and
//! voiced, and the resulting tracks are tracked in a SQLite store that both
//! the serving process and an out-of-process sweep worker share.

pub mod blob;
pub mod config;
pub mod pipeline;
pub mod source;
pub mod speech;
pub mod store;
