//! Structural key access
//!
//! Typed wrappers over the engine's `read_key` / `write_key` primitives.
//! A value found at a path is either inline (`dict`), indirect (a
//! reference to another object), or absent (`null`); [`locate`] turns any
//! of these into the place where the value's own keys live.

use std::fmt;

use serde::Deserialize;
use tracing::debug;

use super::reference::{find_reference, RefList};
use crate::document::Document;
use crate::error::{Result, SandboxError};

/// Raw value returned by `read_key`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct KeyValue {
    /// `null`, `bool`, `int`, `float`, `name`, `string`, `array`, `dict` or `xref`
    pub kind: String,
    pub raw: String,
}

impl KeyValue {
    pub fn is_null(&self) -> bool {
        self.kind == "null"
    }

    pub fn is_dict(&self) -> bool {
        self.kind == "dict"
    }

    pub fn is_array(&self) -> bool {
        self.kind == "array"
    }

    /// Reference embedded in the raw text, if any
    pub fn reference(&self) -> Option<super::Reference> {
        find_reference(&self.raw)
    }

    /// Decoded text of a string value
    pub fn text(&self) -> Option<String> {
        (self.kind == "string").then(|| unquote(&self.raw))
    }
}

/// Location of a value: object number plus a `/`-separated key path.
///
/// An empty path addresses the whole object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPath {
    pub xref: u32,
    pub path: String,
}

impl KeyPath {
    pub fn new(xref: u32, path: impl Into<String>) -> Self {
        Self {
            xref,
            path: path.into(),
        }
    }

    /// The object itself
    pub fn object(xref: u32) -> Self {
        Self::new(xref, "")
    }

    pub fn child(&self, key: &str) -> Self {
        if self.path.is_empty() {
            Self::new(self.xref, key)
        } else {
            Self::new(self.xref, format!("{}/{key}", self.path))
        }
    }
}

impl fmt::Display for KeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "{} 0 R", self.xref)
        } else {
            write!(f, "{} 0 R /{}", self.xref, self.path)
        }
    }
}

pub async fn read(document: &Document, at: &KeyPath) -> Result<KeyValue> {
    document.xref_get_key(at.xref, &at.path).await
}

pub async fn write(document: &Document, at: &KeyPath, raw: &str) -> Result<()> {
    document.xref_set_key(at.xref, &at.path, raw).await
}

fn unresolved(operation: &'static str, at: &KeyPath) -> SandboxError {
    SandboxError::Unresolved {
        operation,
        xref: at.xref,
        path: at.path.clone(),
    }
}

/// Where the keys of the dictionary at `at` live.
///
/// `Ok(None)` when the value is absent. An inline dictionary stays at `at`;
/// a reference moves to the referenced object.
pub async fn locate(document: &Document, at: &KeyPath, operation: &'static str) -> Result<Option<KeyPath>> {
    let value = read(document, at).await?;
    if value.is_null() {
        return Ok(None);
    }
    if value.is_dict() {
        return Ok(Some(at.clone()));
    }
    match value.reference() {
        Some(reference) => {
            debug!(from = %at, to = reference.id, "Following indirect reference");
            Ok(Some(KeyPath::object(reference.id)))
        }
        None => Err(unresolved(operation, at)),
    }
}

/// `OCProperties` of the catalog
pub async fn locate_oc_properties(document: &Document, operation: &'static str) -> Result<Option<KeyPath>> {
    let catalog = document.pdf_catalog().await?;
    locate(document, &KeyPath::new(catalog, "OCProperties"), operation).await
}

/// Default configuration (`OCProperties/D`), following up to two indirections
pub async fn locate_default_config(document: &Document, operation: &'static str) -> Result<Option<KeyPath>> {
    match locate_oc_properties(document, operation).await? {
        Some(props) => locate(document, &props.child("D"), operation).await,
        None => Ok(None),
    }
}

/// Reference array at `at`, with the location it must be written back to.
///
/// An indirect array is read from (and written to) its own object.
/// `Ok(None)` when absent.
pub async fn read_array(
    document: &Document,
    at: &KeyPath,
    operation: &'static str,
) -> Result<Option<(KeyPath, RefList)>> {
    let mut location = at.clone();
    let mut value = read(document, &location).await?;

    if value.kind == "xref" {
        let reference = value.reference().ok_or_else(|| unresolved(operation, at))?;
        location = KeyPath::object(reference.id);
        value = read(document, &location).await?;
    }

    if value.is_null() {
        return Ok(None);
    }
    if !value.is_array() {
        return Err(unresolved(operation, &location));
    }
    Ok(Some((location, RefList::parse(&value.raw))))
}

/// Decode a raw PDF string (`(literal)` or `<hex>`) to text
pub fn unquote(raw: &str) -> String {
    let raw = raw.trim();
    let bytes = if let Some(inner) = raw.strip_prefix('(').and_then(|r| r.strip_suffix(')')) {
        unescape_literal(inner)
    } else if let Some(inner) = raw.strip_prefix('<').and_then(|r| r.strip_suffix('>')) {
        decode_hex(inner)
    } else {
        return raw.to_string();
    };
    decode_text(&bytes)
}

fn unescape_literal(inner: &str) -> Vec<u8> {
    let bytes = inner.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut pos = 0;

    while pos < bytes.len() {
        let byte = bytes[pos];
        pos += 1;
        if byte != b'\\' {
            out.push(byte);
            continue;
        }
        let Some(&next) = bytes.get(pos) else {
            break;
        };
        pos += 1;
        match next {
            b'n' => out.push(b'\n'),
            b'r' => out.push(b'\r'),
            b't' => out.push(b'\t'),
            b'b' => out.push(0x08),
            b'f' => out.push(0x0c),
            b'0'..=b'7' => {
                let mut value = u32::from(next - b'0');
                for _ in 0..2 {
                    match bytes.get(pos) {
                        Some(digit @ b'0'..=b'7') => {
                            value = value * 8 + u32::from(digit - b'0');
                            pos += 1;
                        }
                        _ => break,
                    }
                }
                out.push((value & 0xff) as u8);
            }
            // Line continuation
            b'\n' => {}
            b'\r' => {
                if bytes.get(pos) == Some(&b'\n') {
                    pos += 1;
                }
            }
            other => out.push(other),
        }
    }
    out
}

fn decode_hex(inner: &str) -> Vec<u8> {
    let digits: Vec<u8> = inner
        .bytes()
        .filter_map(|b| (b as char).to_digit(16).map(|d| d as u8))
        .collect();
    digits
        .chunks(2)
        .map(|pair| (pair[0] << 4) | pair.get(1).copied().unwrap_or(0))
        .collect()
}

fn decode_text(bytes: &[u8]) -> String {
    match bytes {
        [0xfe, 0xff, rest @ ..] => {
            let units: Vec<u16> = rest
                .chunks_exact(2)
                .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                .collect();
            String::from_utf16_lossy(&units)
        }
        _ => match std::str::from_utf8(bytes) {
            Ok(text) => text.to_string(),
            Err(_) => bytes.iter().map(|&b| b as char).collect(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unquote_literal() {
        assert_eq!(unquote("(Layer 1)"), "Layer 1");
        assert_eq!(unquote(r"(a \(b\) c\\)"), r"a (b) c\");
        assert_eq!(unquote(r"(tab\there)"), "tab\there");
        assert_eq!(unquote(r"(\101\102C)"), "ABC");
    }

    #[test]
    fn test_unquote_hex_and_utf16() {
        assert_eq!(unquote("<48 69>"), "Hi");
        // "Ébauche" as UTF-16BE with BOM
        assert_eq!(unquote("<feff00c9006200610075006300680065>"), "Ébauche");
        assert_eq!(unquote("<4>"), "@");
    }

    #[test]
    fn test_unquote_passes_through_other_text() {
        assert_eq!(unquote("/Name"), "/Name");
    }

    #[test]
    fn test_key_path_child() {
        let props = KeyPath::new(7, "OCProperties");
        assert_eq!(props.child("D").path, "OCProperties/D");
        assert_eq!(KeyPath::object(12).child("ON").path, "ON");
        assert_eq!(props.child("D").to_string(), "7 0 R /OCProperties/D");
    }

    #[test]
    fn test_key_value_helpers() {
        let value = KeyValue {
            kind: "xref".into(),
            raw: "12 0 R".into(),
        };
        assert_eq!(value.reference().map(|r| r.id), Some(12));
        assert!(!value.is_dict());

        let name = KeyValue {
            kind: "string".into(),
            raw: "(Base)".into(),
        };
        assert_eq!(name.text().as_deref(), Some("Base"));
    }
}
