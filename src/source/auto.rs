//! Format detection by content sniffing.

use super::format::{DocumentFormat, SourceError, TextExtractor};
use super::paged_text::PagedTextFormat;
use super::pdf::{PdfFormat, PDF_MAGIC};

/// Dispatches to [`PdfFormat`] or [`PagedTextFormat`] depending on the
/// bytes it is given.  This is the default format for both the splitter and
/// the generator.
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoFormat;

impl AutoFormat {
    fn detect(bytes: &[u8]) -> Result<&'static dyn Kind, SourceError> {
        if bytes.starts_with(PDF_MAGIC) {
            Ok(&PdfFormat)
        } else if std::str::from_utf8(bytes).is_ok() {
            Ok(&PagedTextFormat)
        } else {
            Err(SourceError::Unsupported)
        }
    }
}

/// Both capabilities of one concrete format.
trait Kind: DocumentFormat + TextExtractor {}
impl<T: DocumentFormat + TextExtractor> Kind for T {}

impl DocumentFormat for AutoFormat {
    fn name(&self) -> &'static str {
        "auto"
    }

    fn extension(&self, source: &[u8]) -> &'static str {
        Self::detect(source)
            .map(|kind| kind.extension(source))
            .unwrap_or("bin")
    }

    fn split(&self, source: &[u8]) -> Result<Vec<Vec<u8>>, SourceError> {
        let kind = Self::detect(source)?;
        log::debug!("source: detected {} document", kind.name());
        kind.split(source)
    }
}

impl TextExtractor for AutoFormat {
    fn extract(&self, page: &[u8]) -> Result<String, SourceError> {
        Self::detect(page)?.extract(page)
    }
}
