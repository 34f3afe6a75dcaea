//! Blob key layout.
//!
//! ```text
//! files/<owner>/<upload>-<name>.<ext>      uploaded source document
//! pages/<document>/<page>-<split>.<ext>    single-page sub-document
//! tracks/<document>/<page>-<claim>.<ext>   generated audio
//! ```
//!
//! Source keys carry a per-upload id so two uploads with the same owner and
//! name never share a blob.  Page keys carry a per-split id so a split that
//! loses a race only ever removes its own pages.  Track keys carry the claim token so a worker
//! whose claim was superseded can never overwrite the audio of the worker
//! that won.

use crate::store::{DocumentId, UnitId};

/// Characters replaced by `_` in user-supplied names.
const UNSAFE_CHARS: [char; 11] = ['-', ' ', '/', '\\', '?', '!', '\'', '"', '(', ')', ';'];

/// Normalise an uploaded file name for storage and de-duplication.
///
/// Drops a `.pdf` / `.txt` extension, trims, lower-cases and replaces
/// path separators, punctuation and spaces with `_`.
///
/// ```
/// use misojo::blob::keys::clean_file_name;
///
/// assert_eq!(clean_file_name("My Book (2nd ed).pdf"), "my_book_2nd_ed_");
/// ```
pub fn clean_file_name(name: &str) -> String {
    let trimmed = name.trim();
    let stem = trimmed
        .strip_suffix(".pdf")
        .or_else(|| trimmed.strip_suffix(".txt"))
        .unwrap_or(trimmed);

    let replaced: String = stem
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if UNSAFE_CHARS.contains(&c) { '_' } else { c })
        .collect();

    let mut cleaned = replaced;
    while cleaned.contains("__") {
        cleaned = cleaned.replace("__", "_");
    }
    cleaned
}

pub fn source_key(owner: &str, upload: &str, name: &str, extension: &str) -> String {
    format!(
        "files/{}/{}-{}.{extension}",
        clean_file_name(owner),
        clean_file_name(upload),
        clean_file_name(name)
    )
}

/// A fresh id for [`source_key`] and [`page_key`].
pub fn unique_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

pub fn page_key(document: DocumentId, page: u32, split: &str, extension: &str) -> String {
    format!("pages/{document}/{page}-{split}.{extension}")
}

pub fn track_key(document: DocumentId, page: u32, token: &str, extension: &str) -> String {
    format!("tracks/{document}/{page}-{token}.{extension}")
}

/// Debug label for a unit in log lines.
pub fn unit_label(document: DocumentId, page: u32, unit: UnitId) -> String {
    format!("doc {document} page {page} (unit {unit})")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_removes_extension_and_punctuation() {
        assert_eq!(clean_file_name("  Don Quijote.pdf "), "don_quijote");
        assert_eq!(clean_file_name("a-b c/d\\e?f!g'h\"i(j)k;l"), "a_b_c_d_e_f_g_h_i_j_k_l");
        assert_eq!(clean_file_name("notes.txt"), "notes");
    }

    #[test]
    fn clean_collapses_underscore_runs() {
        assert_eq!(clean_file_name("a - b"), "a_b");
        assert_eq!(clean_file_name("a -- (b)"), "a_b_");
    }

    #[test]
    fn layout() {
        assert_eq!(
            source_key("reader@example.com", "0a1b", "My Book.pdf", "pdf"),
            "files/reader@example.com/0a1b-my_book.pdf"
        );
        assert_eq!(page_key(DocumentId(7), 3, "s1", "pdf"), "pages/7/3-s1.pdf");
        assert_eq!(
            track_key(DocumentId(7), 3, "abc", "mp3"),
            "tracks/7/3-abc.mp3"
        );
    }

    #[test]
    fn owner_cannot_inject_path_segments() {
        let key = source_key("../../etc", "../up", "x", "pdf");
        assert_eq!(key.split('/').count(), 3, "{key}");
    }

    #[test]
    fn same_name_uploads_get_distinct_keys() {
        let first = source_key("alice", &unique_id(), "book.txt", "txt");
        let second = source_key("alice", &unique_id(), "book.txt", "txt");
        assert_ne!(first, second);
        assert!(first.starts_with("files/alice/") && first.ends_with("-book.txt"));
    }
}
