//! Operations accepted by an engine
//!
//! Every operation is a variant with typed fields. Caller strings (names,
//! passwords, link targets) travel as data and are never spliced into code.

use crate::document::{InsertPdfOptions, Metadata, NewAnnotation, SaveOptions};
use crate::ocg::LayerOptions;

/// Request sent to the sandboxed engine
#[derive(Debug, Clone)]
pub enum Request {
    // Virtual filesystem
    WriteFile { path: String, data: Vec<u8> },
    RemoveFile { path: String },

    // Lifecycle
    OpenDocument { name: String, path: String },
    CreateDocument { name: String },
    CloseDocument { name: String },

    // Document queries
    PageCount { name: String },
    IsPdf { name: String },
    IsEncrypted { name: String },
    NeedsPass { name: String },
    Metadata { name: String },
    SetMetadata { name: String, metadata: Metadata },
    Save { name: String, options: SaveOptions },

    // Page tree
    DeletePage { name: String, index: usize },
    DeletePages { name: String, from: usize, to: usize },
    NewPage {
        name: String,
        /// `None` appends
        index: Option<usize>,
        width: f64,
        height: f64,
    },
    MovePage { name: String, from: usize, to: usize },
    CopyPage { name: String, from: usize, to: usize },
    SelectPages { name: String, indices: Vec<usize> },
    InsertPdf {
        name: String,
        source: String,
        options: InsertPdfOptions,
    },

    /// Operation on a single page
    Page {
        name: String,
        index: usize,
        op: PageOp,
    },

    // Structural access
    CatalogXref { name: String },
    ReadKey { name: String, xref: u32, path: String },
    WriteKey {
        name: String,
        xref: u32,
        path: String,
        raw: String,
    },

    // Optional content
    LayerUiConfigs { name: String },
    AddOcg {
        name: String,
        layer: String,
        options: LayerOptions,
    },
    SetOc { name: String, xref: u32, ocg: u32 },
    GetOc { name: String, xref: u32 },
}

/// Per-page operation
#[derive(Debug, Clone)]
pub enum PageOp {
    Rect,
    Rotation,
    SetRotation(i64),
    Text,
    Annotations,
    AddAnnotation(NewAnnotation),
    DeleteAnnotations,
    Links,
    InsertLink { rect: crate::document::Rect, uri: String },
}

impl PageOp {
    pub fn name(&self) -> &'static str {
        match self {
            PageOp::Rect => "page_rect",
            PageOp::Rotation => "page_rotation",
            PageOp::SetRotation(_) => "set_rotation",
            PageOp::Text => "get_text",
            PageOp::Annotations => "annotations",
            PageOp::AddAnnotation(_) => "add_annotation",
            PageOp::DeleteAnnotations => "delete_annotations",
            PageOp::Links => "links",
            PageOp::InsertLink { .. } => "insert_link",
        }
    }
}

impl Request {
    /// Stable operation name used in errors and logs
    pub fn name(&self) -> &'static str {
        match self {
            Request::WriteFile { .. } => "write_file",
            Request::RemoveFile { .. } => "remove_file",
            Request::OpenDocument { .. } => "open_document",
            Request::CreateDocument { .. } => "create_document",
            Request::CloseDocument { .. } => "close_document",
            Request::PageCount { .. } => "page_count",
            Request::IsPdf { .. } => "is_pdf",
            Request::IsEncrypted { .. } => "is_encrypted",
            Request::NeedsPass { .. } => "needs_pass",
            Request::Metadata { .. } => "metadata",
            Request::SetMetadata { .. } => "set_metadata",
            Request::Save { .. } => "save",
            Request::DeletePage { .. } => "delete_page",
            Request::DeletePages { .. } => "delete_pages",
            Request::NewPage { .. } => "new_page",
            Request::MovePage { .. } => "move_page",
            Request::CopyPage { .. } => "copy_page",
            Request::SelectPages { .. } => "select_pages",
            Request::InsertPdf { .. } => "insert_pdf",
            Request::Page { op, .. } => op.name(),
            Request::CatalogXref { .. } => "catalog_xref",
            Request::ReadKey { .. } => "read_key",
            Request::WriteKey { .. } => "write_key",
            Request::LayerUiConfigs { .. } => "layer_ui_configs",
            Request::AddOcg { .. } => "add_ocg",
            Request::SetOc { .. } => "set_oc",
            Request::GetOc { .. } => "get_oc",
        }
    }
}
