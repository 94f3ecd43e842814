//! Page tree editing
//!
//! Edits flatten the tree: inheritable attributes are copied onto each
//! page, then the root `Pages` node receives the new `Kids` list directly.
//! Intermediate nodes and dropped pages become unreachable and disappear
//! on a garbage-collecting save.

use lopdf::{Dictionary, Document, Object, ObjectId, Stream};

use super::keys::{catalog_id, deref, object_dict, object_dict_mut};
use super::syntax::name;
use crate::document::{InsertPdfOptions, Rect};
use crate::engine::EngineError;

const INHERITABLE: [&str; 4] = ["MediaBox", "CropBox", "Resources", "Rotate"];

pub(super) fn page_ids(doc: &Document) -> Vec<ObjectId> {
    doc.get_pages().into_values().collect()
}

pub(super) fn page_id(doc: &Document, index: usize) -> Result<ObjectId, EngineError> {
    let ids = page_ids(doc);
    ids.get(index).copied().ok_or_else(|| out_of_range(index, ids.len()))
}

fn out_of_range(index: usize, count: usize) -> EngineError {
    EngineError::new(format!("page {index} not in document (0..{count})"))
}

fn pages_root(doc: &Document) -> Result<ObjectId, EngineError> {
    object_dict(doc, catalog_id(doc)?)?
        .get(b"Pages")
        .and_then(Object::as_reference)
        .map_err(|_| EngineError::new("catalog has no page tree"))
}

/// Value of `key` on the page or the nearest ancestor
fn inherited(doc: &Document, page: ObjectId, key: &[u8]) -> Option<Object> {
    let mut current = page;
    for _ in 0..64 {
        let dict = object_dict(doc, current).ok()?;
        if let Ok(value) = dict.get(key) {
            return Some(value.clone());
        }
        current = dict.get(b"Parent").and_then(Object::as_reference).ok()?;
    }
    None
}

fn materialize(doc: &mut Document, page: ObjectId) -> Result<(), EngineError> {
    let missing: Vec<(&str, Object)> = INHERITABLE
        .iter()
        .filter_map(|key| inherited(doc, page, key.as_bytes()).map(|value| (*key, value)))
        .collect();
    let dict = object_dict_mut(doc, page)?;
    for (key, value) in missing {
        if !dict.has(key.as_bytes()) {
            dict.set(key, value);
        }
    }
    Ok(())
}

/// Replace the page sequence
fn set_page_order(doc: &mut Document, ids: &[ObjectId]) -> Result<(), EngineError> {
    let root = pages_root(doc)?;
    for id in ids {
        materialize(doc, *id)?;
    }
    for id in ids {
        object_dict_mut(doc, *id)?.set("Parent", Object::Reference(root));
    }
    let pages = object_dict_mut(doc, root)?;
    pages.set(
        "Kids",
        Object::Array(ids.iter().map(|id| Object::Reference(*id)).collect()),
    );
    pages.set("Count", Object::Integer(ids.len() as i64));
    Ok(())
}

/// Empty document: catalog plus an empty page tree
pub(super) fn empty_document() -> Document {
    let mut doc = Document::with_version("1.7");
    let mut pages = Dictionary::new();
    pages.set("Type", name("Pages"));
    pages.set("Kids", Object::Array(Vec::new()));
    pages.set("Count", Object::Integer(0));
    let pages_id = doc.add_object(Object::Dictionary(pages));

    let mut catalog = Dictionary::new();
    catalog.set("Type", name("Catalog"));
    catalog.set("Pages", Object::Reference(pages_id));
    let catalog_id = doc.add_object(Object::Dictionary(catalog));
    doc.trailer.set("Root", Object::Reference(catalog_id));
    doc
}

pub(super) fn delete_pages(doc: &mut Document, from: usize, to: usize) -> Result<(), EngineError> {
    let mut ids = page_ids(doc);
    if from > to || to >= ids.len() {
        return Err(EngineError::new(format!(
            "bad page range {from}..={to} (document has {} pages)",
            ids.len()
        )));
    }
    ids.drain(from..=to);
    set_page_order(doc, &ids)
}

pub(super) fn new_page(
    doc: &mut Document,
    index: Option<usize>,
    width: f64,
    height: f64,
) -> Result<(), EngineError> {
    let mut ids = page_ids(doc);
    let at = index.unwrap_or(ids.len());
    if at > ids.len() {
        return Err(out_of_range(at, ids.len()));
    }

    let content = doc.add_object(Object::Stream(Stream::new(Dictionary::new(), Vec::new())));
    let mut page = Dictionary::new();
    page.set("Type", name("Page"));
    page.set(
        "MediaBox",
        Object::Array(vec![
            Object::Integer(0),
            Object::Integer(0),
            Object::Real(width as f32),
            Object::Real(height as f32),
        ]),
    );
    page.set("Resources", Object::Dictionary(Dictionary::new()));
    page.set("Contents", Object::Reference(content));
    let page_id = doc.add_object(Object::Dictionary(page));

    ids.insert(at, page_id);
    set_page_order(doc, &ids)
}

/// Move page `from` in front of page `to`; `to == page_count` moves it last
pub(super) fn move_page(doc: &mut Document, from: usize, to: usize) -> Result<(), EngineError> {
    let mut ids = page_ids(doc);
    let count = ids.len();
    if from >= count {
        return Err(out_of_range(from, count));
    }
    if to > count {
        return Err(out_of_range(to, count));
    }
    let page = ids.remove(from);
    let target = if to > from { to - 1 } else { to };
    ids.insert(target, page);
    set_page_order(doc, &ids)
}

/// Copy page `from` in front of page `to`
pub(super) fn copy_page(doc: &mut Document, from: usize, to: usize) -> Result<(), EngineError> {
    let mut ids = page_ids(doc);
    let count = ids.len();
    if from >= count {
        return Err(out_of_range(from, count));
    }
    if to > count {
        return Err(out_of_range(to, count));
    }
    let copy = duplicate(doc, ids[from])?;
    ids.insert(to, copy);
    set_page_order(doc, &ids)
}

/// Shallow page copy; content and resources stay shared
fn duplicate(doc: &mut Document, page: ObjectId) -> Result<ObjectId, EngineError> {
    materialize(doc, page)?;
    let mut dict = object_dict(doc, page)?.clone();
    // Annotations point back at their page and cannot be shared
    dict.remove(b"Annots");
    Ok(doc.add_object(Object::Dictionary(dict)))
}

/// Keep only `indices`, in that order; repeated indices become copies
pub(super) fn select(doc: &mut Document, indices: &[usize]) -> Result<(), EngineError> {
    let ids = page_ids(doc);
    let mut selected = Vec::with_capacity(indices.len());
    for &index in indices {
        let id = *ids.get(index).ok_or_else(|| out_of_range(index, ids.len()))?;
        if selected.contains(&id) {
            selected.push(duplicate(doc, id)?);
        } else {
            selected.push(id);
        }
    }
    set_page_order(doc, &selected)
}

/// Copy pages of `source` into `doc`
pub(super) fn insert_pdf(
    doc: &mut Document,
    source: &Document,
    options: &InsertPdfOptions,
) -> Result<(), EngineError> {
    let mut incoming = source.clone();
    let source_pages = page_ids(&incoming);
    if source_pages.is_empty() {
        return Ok(());
    }
    let last = source_pages.len() - 1;
    let from = options.from_page.unwrap_or(0).min(last);
    let to = options.to_page.unwrap_or(last).min(last);

    let mut ids = page_ids(doc);
    let start_at = options.start_at.unwrap_or(ids.len());
    if start_at > ids.len() {
        return Err(out_of_range(start_at, ids.len()));
    }

    // Reversed ranges copy backwards
    let wanted: Vec<usize> = if from <= to {
        (from..=to).collect()
    } else {
        (to..=from).rev().collect()
    };

    for &index in &wanted {
        materialize(&mut incoming, source_pages[index])?;
    }
    incoming.renumber_objects_with(doc.max_id + 1);
    let renumbered = page_ids(&incoming);
    doc.max_id = incoming.max_id.max(doc.max_id);

    let mut copied = Vec::with_capacity(wanted.len());
    for &index in &wanted {
        copied.push(renumbered[index]);
    }
    for (id, object) in incoming.objects {
        doc.objects.insert(id, object);
    }

    ids.splice(start_at..start_at, copied);
    set_page_order(doc, &ids)
}

/// Visible rectangle, with width and height swapped for 90/270 rotation
pub(super) fn page_rect(doc: &Document, page: ObjectId) -> Result<Rect, EngineError> {
    let boxed = inherited(doc, page, b"CropBox")
        .or_else(|| inherited(doc, page, b"MediaBox"))
        .ok_or_else(|| EngineError::new("page has no MediaBox"))?;
    let values = number_array(doc, &boxed)?;
    let [x0, y0, x1, y1] = values.as_slice() else {
        return Err(EngineError::new("page box must have four numbers"));
    };
    let (width, height) = ((*x1 - *x0).abs(), (*y1 - *y0).abs());
    let rect = if rotation(doc, page) % 180 == 90 {
        Rect::new(0.0, 0.0, height, width)
    } else {
        Rect::new(0.0, 0.0, width, height)
    };
    Ok(rect)
}

pub(super) fn number_array(doc: &Document, object: &Object) -> Result<Vec<f64>, EngineError> {
    let items = deref(doc, object)?
        .as_array()
        .map_err(|_| EngineError::new("expected an array of numbers"))?;
    items
        .iter()
        .map(|item| match deref(doc, item)? {
            Object::Integer(i) => Ok(*i as f64),
            Object::Real(r) => Ok(f64::from(*r)),
            _ => Err(EngineError::new("expected a number")),
        })
        .collect()
}

/// Rotation normalized to 0, 90, 180 or 270
pub(super) fn rotation(doc: &Document, page: ObjectId) -> i64 {
    match inherited(doc, page, b"Rotate") {
        Some(Object::Integer(value)) => value.rem_euclid(360),
        _ => 0,
    }
}

pub(super) fn set_rotation(doc: &mut Document, page: ObjectId, rotation: i64) -> Result<(), EngineError> {
    if rotation % 90 != 0 {
        return Err(EngineError::new(format!("rotation {rotation} is not a multiple of 90")));
    }
    object_dict_mut(doc, page)?.set("Rotate", Object::Integer(rotation.rem_euclid(360)));
    Ok(())
}

pub(super) fn text(doc: &Document, index: usize) -> Result<String, EngineError> {
    Ok(doc.extract_text(&[index as u32 + 1])?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc_with_pages(count: usize) -> Document {
        let mut doc = empty_document();
        for _ in 0..count {
            new_page(&mut doc, None, 595.0, 842.0).unwrap();
        }
        doc
    }

    #[test]
    fn test_new_and_delete_pages() {
        let mut doc = doc_with_pages(3);
        assert_eq!(page_ids(&doc).len(), 3);
        delete_pages(&mut doc, 0, 1).unwrap();
        assert_eq!(page_ids(&doc).len(), 1);
        assert!(delete_pages(&mut doc, 0, 5).is_err());
    }

    #[test]
    fn test_move_page() {
        let mut doc = doc_with_pages(3);
        let before = page_ids(&doc);
        move_page(&mut doc, 0, 3).unwrap();
        assert_eq!(page_ids(&doc), vec![before[1], before[2], before[0]]);
        move_page(&mut doc, 2, 0).unwrap();
        assert_eq!(page_ids(&doc), before);
    }

    #[test]
    fn test_select_duplicates_pages() {
        let mut doc = doc_with_pages(2);
        select(&mut doc, &[1, 1, 0]).unwrap();
        let ids = page_ids(&doc);
        assert_eq!(ids.len(), 3);
        assert_ne!(ids[0], ids[1]);
    }

    #[test]
    fn test_rotation_swaps_rect() {
        let mut doc = doc_with_pages(1);
        let page = page_id(&doc, 0).unwrap();
        assert_eq!(page_rect(&doc, page).unwrap(), Rect::new(0.0, 0.0, 595.0, 842.0));
        set_rotation(&mut doc, page, -90).unwrap();
        assert_eq!(rotation(&doc, page), 270);
        assert_eq!(page_rect(&doc, page).unwrap(), Rect::new(0.0, 0.0, 842.0, 595.0));
        assert!(set_rotation(&mut doc, page, 45).is_err());
    }

    #[test]
    fn test_insert_pdf_appends_range() {
        let mut target = doc_with_pages(1);
        let source = doc_with_pages(3);
        insert_pdf(&mut target, &source, &InsertPdfOptions::pages(1, 2)).unwrap();
        assert_eq!(page_ids(&target).len(), 3);

        let options = InsertPdfOptions {
            start_at: Some(0),
            ..Default::default()
        };
        insert_pdf(&mut target, &source, &options).unwrap();
        assert_eq!(page_ids(&target).len(), 6);
    }

    #[test]
    fn test_page_index_out_of_range() {
        let doc = doc_with_pages(1);
        assert!(page_id(&doc, 1).is_err());
    }
}
