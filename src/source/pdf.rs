//! PDF support via `lopdf`.
//!
//! Each page is written out as a standalone one-page PDF.  Only the objects
//! the page reaches (contents, resources, fonts, images) are copied, and
//! attributes the page inherits from the page tree are copied onto it, so
//! the cost of one page does not depend on the size of the document.

use std::collections::BTreeMap;

use lopdf::{dictionary, Dictionary, Document, Object, ObjectId};

use super::format::{DocumentFormat, SourceError, TextExtractor};

/// Magic bytes at the start of every PDF file.
pub(crate) const PDF_MAGIC: &[u8] = b"%PDF-";

/// Page attributes a page may take from its ancestors in the page tree.
const INHERITED: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

/// Guard against cyclic `Parent` chains.
const MAX_TREE_DEPTH: usize = 64;

#[derive(Debug, Clone, Copy, Default)]
pub struct PdfFormat;

impl PdfFormat {
    fn load(bytes: &[u8]) -> Result<Document, SourceError> {
        Document::load_mem(bytes).map_err(|e| SourceError::Malformed(e.to_string()))
    }

    fn page_numbers(doc: &Document) -> Vec<u32> {
        doc.get_pages().keys().copied().collect()
    }

    fn single_page(doc: &Document, number: u32, page_id: ObjectId) -> Result<Vec<u8>, SourceError> {
        let page_error = |reason: String| SourceError::Page {
            page: number,
            reason,
        };
        let original = doc
            .get_dictionary(page_id)
            .map_err(|e| page_error(e.to_string()))?;

        let mut page = original.clone();
        for key in INHERITED {
            if !page.has(key) {
                if let Some(value) = inherited(doc, original, key) {
                    page.set(key.to_vec(), value.clone());
                }
            }
        }
        page.remove(b"Parent");

        let mut out = Document::with_version(doc.version.clone());
        out.objects = reachable(doc, page.iter().map(|(_, value)| value));
        out.max_id = doc.max_id;

        let pages_id = out.new_object_id();
        page.set("Parent", pages_id);
        let page_id = out.add_object(page);
        out.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![Object::from(page_id)],
                "Count" => 1_i64,
            }),
        );
        let catalog_id = out.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        out.trailer.set("Root", catalog_id);
        out.compress();

        let mut bytes = Vec::new();
        out.save_to(&mut bytes)
            .map_err(|e| page_error(e.to_string()))?;
        Ok(bytes)
    }
}

/// The value of `key` on `page` or its nearest ancestor that has it.
fn inherited<'a>(doc: &'a Document, page: &'a Dictionary, key: &[u8]) -> Option<&'a Object> {
    let mut node = page;
    for _ in 0..MAX_TREE_DEPTH {
        if let Ok(value) = node.get(key) {
            return Some(value);
        }
        let parent = node.get(b"Parent").and_then(Object::as_reference).ok()?;
        node = doc.get_dictionary(parent).ok()?;
    }
    None
}

/// Every indirect object reachable from `roots`, except page tree nodes.
///
/// Links into the page tree (annotation `/P`, destinations) are left
/// dangling rather than dragging the other pages along.
fn reachable<'a>(
    doc: &'a Document,
    roots: impl IntoIterator<Item = &'a Object>,
) -> BTreeMap<ObjectId, Object> {
    let mut found = BTreeMap::new();
    let mut pending: Vec<&Object> = roots.into_iter().collect();

    while let Some(object) = pending.pop() {
        match object {
            Object::Reference(id) => {
                if found.contains_key(id) {
                    continue;
                }
                let Ok(target) = doc.get_object(*id) else {
                    continue;
                };
                if is_page_tree_node(target) {
                    continue;
                }
                found.insert(*id, target.clone());
                pending.push(target);
            }
            Object::Array(items) => pending.extend(items),
            Object::Dictionary(dict) => pending.extend(dict.iter().map(|(_, value)| value)),
            Object::Stream(stream) => pending.extend(stream.dict.iter().map(|(_, value)| value)),
            _ => {}
        }
    }
    found
}

fn is_page_tree_node(object: &Object) -> bool {
    let Object::Dictionary(dict) = object else {
        return false;
    };
    matches!(
        dict.get(b"Type").and_then(Object::as_name),
        Ok(b"Page" | b"Pages" | b"Catalog")
    )
}

impl DocumentFormat for PdfFormat {
    fn name(&self) -> &'static str {
        "pdf"
    }

    fn extension(&self, _source: &[u8]) -> &'static str {
        "pdf"
    }

    fn split(&self, source: &[u8]) -> Result<Vec<Vec<u8>>, SourceError> {
        let doc = Self::load(source)?;
        let pages = doc.get_pages();
        if pages.is_empty() {
            return Err(SourceError::NoPages);
        }

        pages
            .iter()
            .map(|(&number, &page_id)| Self::single_page(&doc, number, page_id))
            .collect()
    }
}

impl TextExtractor for PdfFormat {
    /// Extract the text of every page in `page` (normally exactly one).
    ///
    /// A page whose content stream cannot be decoded into text yields an
    /// empty string rather than an error.
    fn extract(&self, page: &[u8]) -> Result<String, SourceError> {
        let doc = Self::load(page)?;
        let pages = Self::page_numbers(&doc);
        match doc.extract_text(&pages) {
            Ok(text) => Ok(text),
            Err(e) => {
                log::debug!("pdf: no extractable text ({e})");
                Ok(String::new())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Object, Stream};

    /// Build an in-memory PDF with one page per entry; `None` pages have no
    /// text operators at all.
    fn build_pdf(pages: &[Option<&str>]) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! {
                "F1" => font_id,
            },
        });

        let mut kids: Vec<Object> = Vec::new();
        for text in pages {
            let operations = match text {
                Some(text) => vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec!["F1".into(), 24.into()]),
                    Operation::new("Td", vec![100.into(), 600.into()]),
                    Operation::new("Tj", vec![Object::string_literal(*text)]),
                    Operation::new("ET", vec![]),
                ],
                None => vec![],
            };
            let content = Content { operations };
            let content_id =
                doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            });
            kids.push(page_id.into());
        }

        let count = kids.len() as i64;
        let pages_dict = dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        };
        doc.objects.insert(pages_id, Object::Dictionary(pages_dict));
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut out = Vec::new();
        doc.save_to(&mut out).unwrap();
        out
    }

    #[test]
    fn splits_into_single_page_documents() {
        let source = build_pdf(&[Some("One"), Some("Two"), Some("Three")]);
        let pages = PdfFormat.split(&source).unwrap();

        assert_eq!(pages.len(), 3);
        for page in &pages {
            assert!(page.starts_with(PDF_MAGIC));
            let doc = Document::load_mem(page).unwrap();
            assert_eq!(doc.get_pages().len(), 1);
        }
    }

    #[test]
    fn extracts_text_of_a_split_page() {
        let source = build_pdf(&[Some("First"), Some("Hello World")]);
        let pages = PdfFormat.split(&source).unwrap();

        let text = PdfFormat.extract(&pages[1]).unwrap();
        assert!(text.contains("Hello World"), "got {text:?}");
        assert!(!text.contains("First"));
    }

    #[test]
    fn split_pages_copy_only_what_they_use() {
        let few = PdfFormat.split(&build_pdf(&[Some("A"), Some("B")])).unwrap();
        let texts: Vec<String> = (1..=40).map(|i| format!("Page {i}")).collect();
        let texts: Vec<Option<&str>> = texts.iter().map(|t| Some(t.as_str())).collect();
        let many = PdfFormat.split(&build_pdf(&texts)).unwrap();
        assert_eq!(many.len(), 40);

        let objects = |bytes: &[u8]| Document::load_mem(bytes).unwrap().objects.len();
        assert_eq!(objects(&few[0]), objects(&many[0]));
        assert_eq!(objects(&many[0]), objects(&many[39]));

        // Attributes inherited from the page tree travel with the page.
        let doc = Document::load_mem(&many[20]).unwrap();
        let (_, page_id) = doc.get_pages().into_iter().next().unwrap();
        let page = doc.get_dictionary(page_id).unwrap();
        assert!(page.has(b"MediaBox"));
        assert!(page.has(b"Resources"));
        let text = PdfFormat.extract(&many[20]).unwrap();
        assert!(text.contains("Page 21"), "got {text:?}");
    }

    #[test]
    fn page_without_text_extracts_to_blank() {
        let source = build_pdf(&[None]);
        let text = PdfFormat.extract(&source).unwrap();
        assert!(text.trim().is_empty(), "got {text:?}");
    }

    #[test]
    fn garbage_is_malformed() {
        let err = PdfFormat.split(b"%PDF-1.5 definitely not a pdf").unwrap_err();
        assert!(matches!(err, SourceError::Malformed(_)));
    }
}
