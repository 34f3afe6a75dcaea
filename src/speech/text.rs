//! Text preparation before synthesis.

/// Language used when a document's language has no placeholder of its own.
const FALLBACK_LANGUAGE: &str = "en";

/// Message voiced for a page without extractable text, per language.
const NO_TEXT_MESSAGES: &[(&str, &str)] = &[
    ("en", "No text found"),
    ("es", "No se ha encontrado texto"),
];

/// The placeholder spoken for an empty page in `language`.
///
/// Region subtags are ignored (`es-MX` uses the `es` message); unknown
/// languages fall back to English.
pub fn no_text_message(language: &str) -> &'static str {
    let primary = language
        .split(['-', '_'])
        .next()
        .unwrap_or(language)
        .to_ascii_lowercase();

    NO_TEXT_MESSAGES
        .iter()
        .find(|(lang, _)| *lang == primary)
        .or_else(|| NO_TEXT_MESSAGES.iter().find(|(lang, _)| *lang == FALLBACK_LANGUAGE))
        .map(|(_, msg)| *msg)
        .unwrap_or("No text found")
}

/// Produce the exact text handed to the synthesizer for one page.
///
/// Blank text becomes the language's placeholder; otherwise the text is
/// trimmed and line breaks are flattened to spaces.
pub fn prepare_text(extracted: &str, language: &str) -> String {
    let trimmed = extracted.trim();
    if trimmed.is_empty() {
        return no_text_message(language).to_string();
    }
    trimmed.replace(['\r', '\n'], " ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_per_language() {
        assert_eq!(no_text_message("en"), "No text found");
        assert_eq!(no_text_message("es"), "No se ha encontrado texto");
        assert_eq!(no_text_message("es-MX"), "No se ha encontrado texto");
        assert_eq!(no_text_message("EN_gb"), "No text found");
    }

    #[test]
    fn unknown_language_falls_back_to_english() {
        assert_eq!(no_text_message("th"), "No text found");
        assert_eq!(no_text_message(""), "No text found");
    }

    #[test]
    fn blank_text_becomes_placeholder() {
        assert_eq!(prepare_text("", "es"), "No se ha encontrado texto");
        assert_eq!(prepare_text(" \n\t ", "en"), "No text found");
    }

    #[test]
    fn newlines_are_flattened() {
        assert_eq!(
            prepare_text("  first line\nsecond line\r\nthird \n", "en"),
            "first line second line  third"
        );
    }
}
