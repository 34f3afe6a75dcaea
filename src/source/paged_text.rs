//! Plain UTF-8 text with pages separated by form feeds (`\x0C`), the layout
//! `pdftotext` and most line printers produce.

use super::format::{DocumentFormat, SourceError, TextExtractor};

const PAGE_BREAK: char = '\u{000C}';

#[derive(Debug, Clone, Copy, Default)]
pub struct PagedTextFormat;

impl PagedTextFormat {
    fn decode(bytes: &[u8]) -> Result<&str, SourceError> {
        std::str::from_utf8(bytes).map_err(|e| SourceError::Malformed(e.to_string()))
    }
}

impl DocumentFormat for PagedTextFormat {
    fn name(&self) -> &'static str {
        "paged-text"
    }

    fn extension(&self, _source: &[u8]) -> &'static str {
        "txt"
    }

    fn split(&self, source: &[u8]) -> Result<Vec<Vec<u8>>, SourceError> {
        let text = Self::decode(source)?;
        if text.is_empty() {
            return Err(SourceError::NoPages);
        }

        let mut pages: Vec<&str> = text.split(PAGE_BREAK).collect();
        // A break after the last page terminates it rather than opening a
        // new, empty one.
        if pages.len() > 1 && pages.last().is_some_and(|p| p.trim().is_empty()) {
            pages.pop();
        }

        Ok(pages.into_iter().map(|p| p.as_bytes().to_vec()).collect())
    }
}

impl TextExtractor for PagedTextFormat {
    fn extract(&self, page: &[u8]) -> Result<String, SourceError> {
        Ok(Self::decode(page)?.trim().to_string())
    }
}
