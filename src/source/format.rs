//! Splitting and extraction contracts.

use thiserror::Error;

/// Errors raised while parsing a source document or one of its pages.
#[derive(Debug, Clone, Error)]
pub enum SourceError {
    /// The bytes are not in any format this build understands.
    #[error("unsupported source format")]
    Unsupported,

    /// The document could be identified but not parsed.
    #[error("malformed document: {0}")]
    Malformed(String),

    /// The document parsed but contains no pages.
    #[error("document has no pages")]
    NoPages,

    /// A single page could not be written out as its own sub-document.
    #[error("page {page} could not be extracted: {reason}")]
    Page { page: u32, reason: String },
}

/// Turns a whole source document into one standalone sub-document per page.
///
/// Implementors must be `Send + Sync` so they can be shared behind
/// `Arc<dyn DocumentFormat>`.
pub trait DocumentFormat: Send + Sync {
    /// Short format name used in logs.
    fn name(&self) -> &'static str;

    /// File extension used for blobs of this format.
    fn extension(&self, source: &[u8]) -> &'static str;

    /// Split `source` into pages, in order.  Page `i` of the result is page
    /// `i + 1` of the document.
    ///
    /// Fails as a whole if any single page cannot be materialised.
    fn split(&self, source: &[u8]) -> Result<Vec<Vec<u8>>, SourceError>;
}

/// Pulls the readable text out of one page sub-document.
///
/// # Contract
///
/// A page without extractable text (a scanned image, a blank page) is a
/// valid outcome and returns `Ok(String::new())`.  `Err` is reserved for
/// input that cannot be parsed at all.
pub trait TextExtractor: Send + Sync {
    fn extract(&self, page: &[u8]) -> Result<String, SourceError>;
}

// Compile-time assertion: both traits must be usable as trait objects.
const _: fn() = || {
    fn _assert_object_safe(_: Box<dyn DocumentFormat>, _: Box<dyn TextExtractor>) {}
};
