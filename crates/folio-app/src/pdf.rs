//! PDF helpers for page counting, page extraction, and multi-document merge.
//!
//! Everything operates on in-memory byte buffers because documents arrive
//! from and return to blob storage, never the local filesystem.

use std::collections::BTreeMap;

use lopdf::{dictionary, Document, Object, ObjectId};
use thiserror::Error;

const PDF_VERSION: &str = "1.5";

/// Errors emitted while reading or assembling PDF documents.
#[derive(Debug, Error)]
pub enum PdfError {
    #[error("failed to load PDF document: {0}")]
    Document(#[source] lopdf::Error),

    #[error("page index {page_index} out of range for a {pages}-page document")]
    PageOutOfRange { page_index: usize, pages: usize },

    #[error("malformed PDF structure: {0}")]
    Malformed(String),

    #[error("failed to serialize PDF document: {0}")]
    Save(#[source] std::io::Error),
}

/// Number of pages in the document.
pub fn page_count(bytes: &[u8]) -> Result<usize, PdfError> {
    let doc = Document::load_mem(bytes).map_err(PdfError::Document)?;
    Ok(doc.get_pages().len())
}

/// Extract a single page (0-based) as a standalone document.
pub fn single_page(bytes: &[u8], page_index: usize) -> Result<Vec<u8>, PdfError> {
    extract_pages(bytes, &[page_index])
}

/// Extract the given 0-based pages, in ascending order, as a new document.
///
/// Indices must be sorted and unique; out-of-range indices are an error
/// rather than being silently dropped.
pub fn extract_pages(bytes: &[u8], page_indices: &[usize]) -> Result<Vec<u8>, PdfError> {
    debug_assert!(page_indices.windows(2).all(|w| w[0] < w[1]));

    let mut doc = Document::load_mem(bytes).map_err(PdfError::Document)?;
    let total = doc.get_pages().len();
    if let Some(&bad) = page_indices.iter().find(|&&i| i >= total) {
        return Err(PdfError::PageOutOfRange {
            page_index: bad,
            pages: total,
        });
    }

    // lopdf numbers pages from 1; drop everything outside the requested set.
    let doomed: Vec<u32> = (0..total)
        .filter(|i| !page_indices.contains(i))
        .map(|i| (i + 1) as u32)
        .collect();
    if !doomed.is_empty() {
        doc.delete_pages(&doomed);
    }
    doc.prune_objects();

    save(doc)
}

/// A valid document with zero pages, returned when nothing was cited.
pub fn empty_document() -> Result<Vec<u8>, PdfError> {
    let mut doc = Document::with_version(PDF_VERSION);
    let pages_id = doc.add_object(dictionary! {
        "Type" => "Pages",
        "Kids" => Vec::<Object>::new(),
        "Count" => 0,
    });
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    save(doc)
}

/// Merge documents back to back, preserving input order.
///
/// An empty input yields an empty (page-less) document.
pub fn merge_documents(parts: Vec<Vec<u8>>) -> Result<Vec<u8>, PdfError> {
    if parts.is_empty() {
        return empty_document();
    }
    if parts.len() == 1 {
        let mut parts = parts;
        return Ok(parts.swap_remove(0));
    }

    let mut max_id = 1u32;
    // Page-tree order within each part, parts back to back. Keyed storage
    // would follow object ids instead, which arbitrary inputs do not sort by.
    let mut pages: Vec<(ObjectId, Object)> = Vec::new();
    let mut objects: BTreeMap<ObjectId, Object> = BTreeMap::new();

    for bytes in &parts {
        let mut doc = Document::load_mem(bytes).map_err(PdfError::Document)?;
        doc.renumber_objects_with(max_id);
        max_id = doc.max_id + 1;

        for (_, object_id) in doc.get_pages() {
            let object = doc
                .get_object(object_id)
                .map_err(|e| PdfError::Malformed(format!("missing page object: {e}")))?
                .to_owned();
            pages.push((object_id, object));
        }
        objects.extend(doc.objects);
    }

    let mut document = Document::with_version(PDF_VERSION);
    let mut catalog_id: Option<ObjectId> = None;
    let mut pages_id: Option<ObjectId> = None;
    let mut pages_dict = lopdf::Dictionary::new();

    for (object_id, object) in objects {
        let type_name = object
            .as_dict()
            .ok()
            .and_then(|d| d.get(b"Type").ok())
            .and_then(|t| t.as_name().ok());
        match type_name {
            Some(b"Catalog") => {
                catalog_id.get_or_insert(object_id);
            }
            Some(b"Pages") => {
                if let Ok(dict) = object.as_dict() {
                    pages_dict.extend(dict);
                }
                pages_id.get_or_insert(object_id);
            }
            // Pages are re-inserted below with a rewritten parent.
            Some(b"Page") => {}
            Some(b"Outlines") | Some(b"Outline") => {}
            _ => {
                document.objects.insert(object_id, object);
            }
        }
    }

    let pages_id = pages_id.ok_or_else(|| PdfError::Malformed("no page tree found".into()))?;
    let catalog_id = catalog_id.ok_or_else(|| PdfError::Malformed("no catalog found".into()))?;

    for (object_id, object) in &pages {
        let dict = object
            .as_dict()
            .map_err(|e| PdfError::Malformed(format!("page is not a dictionary: {e}")))?;
        let mut dict = dict.clone();
        dict.set("Parent", pages_id);
        document
            .objects
            .insert(*object_id, Object::Dictionary(dict));
    }

    pages_dict.set("Count", pages.len() as u32);
    pages_dict.set(
        "Kids",
        pages
            .iter()
            .map(|(id, _)| Object::Reference(*id))
            .collect::<Vec<_>>(),
    );
    document
        .objects
        .insert(pages_id, Object::Dictionary(pages_dict));

    let catalog = dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    };
    document
        .objects
        .insert(catalog_id, Object::Dictionary(catalog));

    document.trailer.set("Root", catalog_id);
    document.max_id = max_id;
    document.renumber_objects();
    document.compress();

    save(document)
}

fn save(mut doc: Document) -> Result<Vec<u8>, PdfError> {
    let mut out = Vec::new();
    doc.save_to(&mut out).map_err(PdfError::Save)?;
    Ok(out)
}
