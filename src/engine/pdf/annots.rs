//! Page annotations and links

use lopdf::{Dictionary, Document, Object, ObjectId};

use super::keys::{deref, object_dict, object_dict_mut};
use super::pages::number_array;
use super::syntax::{name, object_text, text_string};
use crate::document::{Annotation, Link, NewAnnotation, Rect, Rgb};
use crate::engine::EngineError;

/// Entries of the page's `/Annots`, which may be inline or indirect
fn annot_entries(doc: &Document, page: ObjectId) -> Result<Vec<Object>, EngineError> {
    match object_dict(doc, page)?.get(b"Annots") {
        Ok(value) => match deref(doc, value)? {
            Object::Array(items) => Ok(items.clone()),
            _ => Ok(Vec::new()),
        },
        Err(_) => Ok(Vec::new()),
    }
}

fn rect_of(doc: &Document, dict: &Dictionary) -> Rect {
    dict.get(b"Rect")
        .ok()
        .and_then(|value| number_array(doc, value).ok())
        .and_then(|values| match values.as_slice() {
            [x0, y0, x1, y1] => Some(Rect::new(*x0, *y0, *x1, *y1)),
            _ => None,
        })
        .unwrap_or(Rect::new(0.0, 0.0, 0.0, 0.0))
}

fn xref_of(entry: &Object) -> u32 {
    match entry {
        Object::Reference((id, _)) => *id,
        _ => 0,
    }
}

fn subtype(dict: &Dictionary) -> String {
    match dict.get(b"Subtype") {
        Ok(Object::Name(value)) => String::from_utf8_lossy(value).into_owned(),
        _ => String::new(),
    }
}

pub(super) fn list(doc: &Document, page: ObjectId) -> Result<Vec<Annotation>, EngineError> {
    let mut annotations = Vec::new();
    for entry in annot_entries(doc, page)? {
        let Ok(Object::Dictionary(dict)) = deref(doc, &entry) else {
            continue;
        };
        annotations.push(Annotation {
            xref: xref_of(&entry),
            kind: subtype(dict),
            rect: rect_of(doc, dict),
            contents: dict.get(b"Contents").ok().and_then(object_text),
            oc: dict.get(b"OC").ok().map(xref_of).unwrap_or(0),
        });
    }
    Ok(annotations)
}

pub(super) fn links(doc: &Document, page: ObjectId) -> Result<Vec<Link>, EngineError> {
    let mut links = Vec::new();
    for entry in annot_entries(doc, page)? {
        let Ok(Object::Dictionary(dict)) = deref(doc, &entry) else {
            continue;
        };
        if subtype(dict) != "Link" {
            continue;
        }
        let uri = dict
            .get(b"A")
            .ok()
            .and_then(|action| deref(doc, action).ok())
            .and_then(|action| action.as_dict().ok())
            .and_then(|action| action.get(b"URI").ok())
            .and_then(object_text);
        links.push(Link {
            xref: xref_of(&entry),
            rect: rect_of(doc, dict),
            uri,
        });
    }
    Ok(links)
}

fn rect_array(rect: &Rect) -> Object {
    Object::Array(
        [rect.x0, rect.y0, rect.x1, rect.y1]
            .iter()
            .map(|v| Object::Real(*v as f32))
            .collect(),
    )
}

fn color_array(color: &Rgb) -> Object {
    Object::Array(vec![
        Object::Real(color.0),
        Object::Real(color.1),
        Object::Real(color.2),
    ])
}

/// Append an annotation object to the page, returning its xref
fn attach(doc: &mut Document, page: ObjectId, mut dict: Dictionary) -> Result<u32, EngineError> {
    dict.set("Type", name("Annot"));
    dict.set("P", Object::Reference(page));
    let id = doc.add_object(Object::Dictionary(dict));

    let indirect = match object_dict(doc, page)?.get(b"Annots") {
        Ok(Object::Reference(array_id)) => Some(*array_id),
        _ => None,
    };
    match indirect {
        Some(array_id) => match doc.get_object_mut(array_id)? {
            Object::Array(items) => items.push(Object::Reference(id)),
            _ => return Err(EngineError::new("page /Annots is not an array")),
        },
        None => {
            let page_dict = object_dict_mut(doc, page)?;
            if !matches!(page_dict.get(b"Annots"), Ok(Object::Array(_))) {
                page_dict.set("Annots", Object::Array(Vec::new()));
            }
            if let Ok(Object::Array(items)) = page_dict.get_mut(b"Annots") {
                items.push(Object::Reference(id));
            }
        }
    }
    Ok(id.0)
}

pub(super) fn add(doc: &mut Document, page: ObjectId, annotation: &NewAnnotation) -> Result<u32, EngineError> {
    let mut dict = Dictionary::new();
    dict.set("Subtype", name(annotation.subtype()));
    // Print flag
    dict.set("F", Object::Integer(4));

    match annotation {
        NewAnnotation::Highlight { rect, color } => {
            dict.set("Rect", rect_array(rect));
            dict.set("C", color_array(color));
            dict.set(
                "QuadPoints",
                Object::Array(
                    [rect.x0, rect.y1, rect.x1, rect.y1, rect.x0, rect.y0, rect.x1, rect.y0]
                        .iter()
                        .map(|v| Object::Real(*v as f32))
                        .collect(),
                ),
            );
        }
        NewAnnotation::Text { point, contents } => {
            let rect = Rect::new(point.x, point.y, point.x + 20.0, point.y + 20.0);
            dict.set("Rect", rect_array(&rect));
            dict.set("Contents", text_string(contents));
            dict.set("Name", name("Note"));
        }
        NewAnnotation::Rect { rect, color } => {
            dict.set("Rect", rect_array(rect));
            dict.set("C", color_array(color));
        }
    }
    attach(doc, page, dict)
}

pub(super) fn insert_link(doc: &mut Document, page: ObjectId, rect: &Rect, uri: &str) -> Result<u32, EngineError> {
    let mut action = Dictionary::new();
    action.set("S", name("URI"));
    action.set("URI", text_string(uri));

    let mut dict = Dictionary::new();
    dict.set("Subtype", name("Link"));
    dict.set("Rect", rect_array(rect));
    dict.set("Border", Object::Array(vec![Object::Integer(0); 3]));
    dict.set("A", Object::Dictionary(action));
    attach(doc, page, dict)
}

/// Drop every annotation from the page, returning how many there were
pub(super) fn delete_all(doc: &mut Document, page: ObjectId) -> Result<usize, EngineError> {
    let count = annot_entries(doc, page)?.len();
    object_dict_mut(doc, page)?.remove(b"Annots");
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::super::pages::{empty_document, new_page, page_id};
    use super::*;
    use crate::document::Point;

    fn one_page() -> (Document, ObjectId) {
        let mut doc = empty_document();
        new_page(&mut doc, None, 595.0, 842.0).unwrap();
        let page = page_id(&doc, 0).unwrap();
        (doc, page)
    }

    #[test]
    fn test_add_and_list_annotations() {
        let (mut doc, page) = one_page();
        let rect = Rect::new(10.0, 10.0, 100.0, 30.0);
        let xref = add(
            &mut doc,
            page,
            &NewAnnotation::Highlight {
                rect,
                color: Rgb::default(),
            },
        )
        .unwrap();
        add(
            &mut doc,
            page,
            &NewAnnotation::Text {
                point: Point { x: 50.0, y: 50.0 },
                contents: "note".into(),
            },
        )
        .unwrap();

        let annotations = list(&doc, page).unwrap();
        assert_eq!(annotations.len(), 2);
        assert_eq!(annotations[0].xref, xref);
        assert_eq!(annotations[0].kind, "Highlight");
        assert_eq!(annotations[0].rect, rect);
        assert_eq!(annotations[1].contents.as_deref(), Some("note"));

        assert_eq!(delete_all(&mut doc, page).unwrap(), 2);
        assert!(list(&doc, page).unwrap().is_empty());
    }

    #[test]
    fn test_links() {
        let (mut doc, page) = one_page();
        insert_link(&mut doc, page, &Rect::new(0.0, 0.0, 50.0, 10.0), "https://example.org").unwrap();
        let links = links(&doc, page).unwrap();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].uri.as_deref(), Some("https://example.org"));
    }
}
