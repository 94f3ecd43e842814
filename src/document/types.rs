//! Document and page value types
//!
//! These cross the engine boundary as JSON and are decoded by the session.

use serde::{Deserialize, Serialize};

/// Default page size for inserted blank pages (A4 in points)
pub const DEFAULT_PAGE_WIDTH: f64 = 595.0;
pub const DEFAULT_PAGE_HEIGHT: f64 = 842.0;

/// Document information dictionary
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub keywords: Option<String>,
    #[serde(default)]
    pub creator: Option<String>,
    #[serde(default)]
    pub producer: Option<String>,
    #[serde(default)]
    pub creation_date: Option<String>,
    #[serde(default)]
    pub mod_date: Option<String>,
    #[serde(default)]
    pub trapped: Option<String>,
    #[serde(default)]
    pub encryption: Option<String>,
}

/// Rectangle in PDF user space
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
}

impl Rect {
    pub fn new(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        Self { x0, y0, x1, y1 }
    }

    pub fn width(&self) -> f64 {
        (self.x1 - self.x0).abs()
    }

    pub fn height(&self) -> f64 {
        (self.y1 - self.y0).abs()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

/// RGB color, components in 0..=1
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rgb(pub f32, pub f32, pub f32);

impl Default for Rgb {
    fn default() -> Self {
        Rgb(1.0, 1.0, 0.0)
    }
}

/// Existing annotation on a page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Annotation {
    /// Object number, 0 when the annotation is inline
    pub xref: u32,
    /// Subtype without the leading slash (`Highlight`, `Text`, ...)
    pub kind: String,
    pub rect: Rect,
    #[serde(default)]
    pub contents: Option<String>,
    /// Optional content group controlling visibility, 0 when none
    #[serde(default)]
    pub oc: u32,
}

/// Annotation to create
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum NewAnnotation {
    Highlight { rect: Rect, color: Rgb },
    Text { point: Point, contents: String },
    Rect { rect: Rect, color: Rgb },
}

impl NewAnnotation {
    pub fn subtype(&self) -> &'static str {
        match self {
            NewAnnotation::Highlight { .. } => "Highlight",
            NewAnnotation::Text { .. } => "Text",
            NewAnnotation::Rect { .. } => "Square",
        }
    }
}

/// Link annotation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Link {
    pub xref: u32,
    pub rect: Rect,
    #[serde(default)]
    pub uri: Option<String>,
}

/// Options for saving a document to bytes
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SaveOptions {
    /// Drop unreachable objects before writing
    #[serde(default)]
    pub garbage: bool,
    /// Compress streams
    #[serde(default)]
    pub compress: bool,
}

/// Page range copied by `insert_pdf`
///
/// `None` bounds mean first/last page; `start_at = None` appends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsertPdfOptions {
    #[serde(default)]
    pub from_page: Option<usize>,
    #[serde(default)]
    pub to_page: Option<usize>,
    #[serde(default)]
    pub start_at: Option<usize>,
}

impl InsertPdfOptions {
    pub fn pages(from_page: usize, to_page: usize) -> Self {
        Self {
            from_page: Some(from_page),
            to_page: Some(to_page),
            start_at: None,
        }
    }
}
