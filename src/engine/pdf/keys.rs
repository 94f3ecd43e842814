//! Key paths inside objects
//!
//! A path such as `OCProperties/D/Order` is walked from an object's
//! dictionary, following indirect references between components.

use lopdf::{Dictionary, Document, Object, ObjectId};

use super::syntax;
use crate::engine::EngineError;

pub(super) fn split_path(path: &str) -> Result<Vec<&str>, EngineError> {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    if segments.is_empty() {
        return Err(EngineError::new(format!("bad key path '{path}'")));
    }
    Ok(segments)
}

/// Full object id for an object number
pub(super) fn object_id(doc: &Document, xref: u32) -> Result<ObjectId, EngineError> {
    doc.objects
        .keys()
        .find(|(id, _)| *id == xref)
        .copied()
        .ok_or_else(|| EngineError::new(format!("bad xref {xref}")))
}

pub(super) fn catalog_id(doc: &Document) -> Result<ObjectId, EngineError> {
    doc.trailer
        .get(b"Root")
        .and_then(Object::as_reference)
        .map_err(|_| EngineError::new("document has no catalog"))
}

/// Follow references until a direct object
pub(super) fn deref<'a>(doc: &'a Document, object: &'a Object) -> Result<&'a Object, EngineError> {
    let mut current = object;
    // Bounded to guard against reference cycles
    for _ in 0..32 {
        match current {
            Object::Reference(id) => current = doc.get_object(*id)?,
            other => return Ok(other),
        }
    }
    Err(EngineError::new("reference chain too deep"))
}

fn as_dict(object: &Object) -> Option<&Dictionary> {
    match object {
        Object::Dictionary(dict) => Some(dict),
        Object::Stream(stream) => Some(&stream.dict),
        _ => None,
    }
}

fn as_dict_mut(object: &mut Object) -> Option<&mut Dictionary> {
    match object {
        Object::Dictionary(dict) => Some(dict),
        Object::Stream(stream) => Some(&mut stream.dict),
        _ => None,
    }
}

pub(super) fn object_dict(doc: &Document, id: ObjectId) -> Result<&Dictionary, EngineError> {
    as_dict(doc.get_object(id)?)
        .ok_or_else(|| EngineError::new(format!("xref {} is not a dictionary", id.0)))
}

pub(super) fn object_dict_mut(doc: &mut Document, id: ObjectId) -> Result<&mut Dictionary, EngineError> {
    as_dict_mut(doc.get_object_mut(id)?)
        .ok_or_else(|| EngineError::new(format!("xref {} is not a dictionary", id.0)))
}

fn is_whole_object(path: &str) -> bool {
    path.split('/').all(str::is_empty)
}

/// Read `path` below object `xref` as `(kind, raw)`; absent keys are `("null", "null")`.
///
/// An empty path reads the object itself.
pub(super) fn read_key(doc: &Document, xref: u32, path: &str) -> Result<(String, String), EngineError> {
    let id = object_id(doc, xref)?;
    if is_whole_object(path) {
        let object = doc.get_object(id)?;
        return Ok((syntax::kind_of(object).to_string(), syntax::format_object(object)));
    }
    let segments = split_path(path)?;
    let mut dict = object_dict(doc, id)?;

    for (idx, segment) in segments.iter().enumerate() {
        let Ok(value) = dict.get(segment.as_bytes()) else {
            return Ok(null_key());
        };
        if idx + 1 == segments.len() {
            return Ok((syntax::kind_of(value).to_string(), syntax::format_object(value)));
        }
        match as_dict(deref(doc, value)?) {
            Some(next) => dict = next,
            None => return Ok(null_key()),
        }
    }
    Ok(null_key())
}

fn null_key() -> (String, String) {
    ("null".to_string(), "null".to_string())
}

/// Object and inline sub-path that own the parent dictionary of `segments`' last key
fn resolve_owner<'p>(
    doc: &Document,
    xref: u32,
    parents: &[&'p str],
) -> Result<(ObjectId, Vec<&'p str>), EngineError> {
    let mut owner = object_id(doc, xref)?;
    let mut inner: Vec<&str> = Vec::new();

    for segment in parents {
        let value = inline_dict(doc, owner, &inner)?.and_then(|d| d.get(segment.as_bytes()).ok());
        match value {
            Some(Object::Reference(id)) => {
                owner = *id;
                inner.clear();
            }
            Some(Object::Dictionary(_)) | None => inner.push(*segment),
            Some(_) => {
                return Err(EngineError::new(format!(
                    "path component '{segment}' of xref {xref} is not a dictionary"
                )))
            }
        }
    }
    Ok((owner, inner))
}

/// Dictionary at an inline sub-path, `None` when a component is missing
fn inline_dict<'a>(
    doc: &'a Document,
    owner: ObjectId,
    inner: &[&str],
) -> Result<Option<&'a Dictionary>, EngineError> {
    let mut dict = object_dict(doc, owner)?;
    for segment in inner {
        match dict.get(segment.as_bytes()) {
            Ok(Object::Dictionary(next)) => dict = next,
            _ => return Ok(None),
        }
    }
    Ok(Some(dict))
}

/// Dictionary at an inline sub-path, creating missing components
fn inline_dict_mut<'a>(
    doc: &'a mut Document,
    owner: ObjectId,
    inner: &[&str],
) -> Result<&'a mut Dictionary, EngineError> {
    let mut dict = object_dict_mut(doc, owner)?;
    for segment in inner {
        if !dict.has(segment.as_bytes()) {
            dict.set(*segment, Object::Dictionary(Dictionary::new()));
        }
        dict = match dict.get_mut(segment.as_bytes()) {
            Ok(Object::Dictionary(next)) => next,
            _ => {
                return Err(EngineError::new(format!(
                    "path component '{segment}' is not a dictionary"
                )))
            }
        };
    }
    Ok(dict)
}

/// Mutable parent dictionary of the last component of `path`, plus that key
pub(super) fn parent_dict_mut<'a, 'p>(
    doc: &'a mut Document,
    xref: u32,
    path: &'p str,
) -> Result<(&'a mut Dictionary, &'p str), EngineError> {
    let segments = split_path(path)?;
    let (key, parents) = segments
        .split_last()
        .ok_or_else(|| EngineError::new(format!("bad key path '{path}'")))?;
    let (owner, inner) = resolve_owner(doc, xref, parents)?;
    Ok((inline_dict_mut(doc, owner, &inner)?, *key))
}

/// Store raw object text at `path`; `null` removes the key.
///
/// An empty path replaces the object itself (streams excepted).
pub(super) fn write_key(doc: &mut Document, xref: u32, path: &str, raw: &str) -> Result<(), EngineError> {
    let value = syntax::parse_object(raw)
        .map_err(|e| EngineError::new(format!("bad value for '{path}': {e}")))?;
    if is_whole_object(path) {
        let id = object_id(doc, xref)?;
        let object = doc.get_object_mut(id)?;
        if matches!(object, Object::Stream(_)) {
            return Err(EngineError::new(format!("xref {xref} is a stream")));
        }
        *object = value;
        return Ok(());
    }
    let (dict, key) = parent_dict_mut(doc, xref, path)?;
    if matches!(value, Object::Null) {
        dict.remove(key.as_bytes());
    } else {
        dict.set(key, value);
    }
    Ok(())
}

/// Mutable array at `path`, following a reference and creating it when absent
pub(super) fn array_mut<'a>(
    doc: &'a mut Document,
    xref: u32,
    path: &str,
) -> Result<&'a mut Vec<Object>, EngineError> {
    let segments = split_path(path)?;
    let (key, parents) = segments
        .split_last()
        .ok_or_else(|| EngineError::new(format!("bad key path '{path}'")))?;
    let (owner, inner) = resolve_owner(doc, xref, parents)?;

    let indirect = match inline_dict(doc, owner, &inner)?.and_then(|d| d.get(key.as_bytes()).ok()) {
        Some(Object::Reference(id)) => Some(*id),
        _ => None,
    };

    let array = match indirect {
        Some(id) => doc.get_object_mut(id)?,
        None => {
            let dict = inline_dict_mut(doc, owner, &inner)?;
            if !matches!(dict.get(key.as_bytes()), Ok(Object::Array(_))) {
                dict.set(*key, Object::Array(Vec::new()));
            }
            dict.get_mut(key.as_bytes())?
        }
    };
    match array {
        Object::Array(items) => Ok(items),
        _ => Err(EngineError::new(format!("'{path}' is not an array"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc_with_catalog() -> (Document, u32) {
        let mut doc = Document::with_version("1.7");
        let props_id = doc.add_object(Object::Dictionary(Dictionary::new()));
        let mut catalog = Dictionary::new();
        catalog.set("Type", Object::Name(b"Catalog".to_vec()));
        catalog.set("OCProperties", Object::Reference(props_id));
        let catalog_id = doc.add_object(Object::Dictionary(catalog));
        doc.trailer.set("Root", Object::Reference(catalog_id));
        (doc, catalog_id.0)
    }

    #[test]
    fn test_read_missing_key_is_null() {
        let (doc, catalog) = doc_with_catalog();
        let (kind, raw) = read_key(&doc, catalog, "Missing/Deeper").unwrap();
        assert_eq!((kind.as_str(), raw.as_str()), ("null", "null"));
    }

    #[test]
    fn test_read_reports_reference_kind() {
        let (doc, catalog) = doc_with_catalog();
        let (kind, raw) = read_key(&doc, catalog, "OCProperties").unwrap();
        assert_eq!(kind, "xref");
        assert!(raw.ends_with(" 0 R"));
    }

    #[test]
    fn test_write_follows_references_and_creates_dicts() {
        let (mut doc, catalog) = doc_with_catalog();
        write_key(&mut doc, catalog, "OCProperties/D/Order", "[1 0 R [2 0 R]]").unwrap();

        let (kind, raw) = read_key(&doc, catalog, "OCProperties/D/Order").unwrap();
        assert_eq!(kind, "array");
        assert_eq!(raw, "[1 0 R [2 0 R]]");

        // Stored in the referenced object, not inline in the catalog
        let catalog_dict = object_dict(&doc, object_id(&doc, catalog).unwrap()).unwrap();
        assert!(matches!(catalog_dict.get(b"OCProperties"), Ok(Object::Reference(_))));

        let (kind, _) = read_key(&doc, catalog, "OCProperties/D").unwrap();
        assert_eq!(kind, "dict");
    }

    #[test]
    fn test_write_null_removes_key() {
        let (mut doc, catalog) = doc_with_catalog();
        write_key(&mut doc, catalog, "PageMode", "/UseOC").unwrap();
        write_key(&mut doc, catalog, "PageMode", "null").unwrap();
        assert_eq!(read_key(&doc, catalog, "PageMode").unwrap().0, "null");
    }

    #[test]
    fn test_write_rejects_bad_syntax() {
        let (mut doc, catalog) = doc_with_catalog();
        assert!(write_key(&mut doc, catalog, "Order", "[1 0 R").is_err());
        assert!(read_key(&doc, 9999, "Order").is_err());
    }

    #[test]
    fn test_empty_path_addresses_whole_object() {
        let (mut doc, catalog) = doc_with_catalog();
        let array_id = doc.add_object(Object::Array(vec![Object::Reference((3, 0))])).0;
        let (kind, raw) = read_key(&doc, array_id, "").unwrap();
        assert_eq!((kind.as_str(), raw.as_str()), ("array", "[3 0 R]"));

        write_key(&mut doc, array_id, "", "[3 0 R 4 0 R]").unwrap();
        assert_eq!(read_key(&doc, array_id, "").unwrap().1, "[3 0 R 4 0 R]");
        assert_eq!(read_key(&doc, catalog, "Type").unwrap().1, "/Catalog");
    }

    #[test]
    fn test_array_mut_creates_and_follows() {
        let (mut doc, catalog) = doc_with_catalog();
        array_mut(&mut doc, catalog, "OCProperties/OCGs")
            .unwrap()
            .push(Object::Reference((7, 0)));
        let (_, raw) = read_key(&doc, catalog, "OCProperties/OCGs").unwrap();
        assert_eq!(raw, "[7 0 R]");
    }
}
