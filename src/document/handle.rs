//! Document handle

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use super::page::Page;
use super::types::{InsertPdfOptions, Metadata, SaveOptions, DEFAULT_PAGE_HEIGHT, DEFAULT_PAGE_WIDTH};
use crate::engine::Request;
use crate::error::{Result, SandboxError};
use crate::ocg::{KeyValue, LayerManager, LayerOptions, LayerUiConfig};
use crate::session::Session;

struct DocumentInner {
    session: Session,
    name: String,
    /// Backing file in the virtual filesystem, `None` for created documents
    path: Option<String>,
    closed: AtomicBool,
}

/// One open document inside a session
///
/// Clones share state: closing any clone closes them all.
#[derive(Clone)]
pub struct Document {
    inner: Arc<DocumentInner>,
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document")
            .field("name", &self.inner.name)
            .field("path", &self.inner.path)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Document {
    pub(crate) fn new(session: Session, name: String, path: Option<String>) -> Self {
        Self {
            inner: Arc::new(DocumentInner {
                session,
                name,
                path,
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Internal name inside the sandbox
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Virtual filesystem path backing this document
    pub fn path(&self) -> Option<&str> {
        self.inner.path.as_deref()
    }

    pub fn session(&self) -> &Session {
        &self.inner.session
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    pub(crate) fn ensure_open(&self, operation: &'static str) -> Result<()> {
        if self.is_closed() {
            return Err(SandboxError::DocumentClosed { operation });
        }
        Ok(())
    }

    pub(crate) async fn request_json<T: DeserializeOwned>(&self, request: Request) -> Result<T> {
        self.ensure_open(request.name())?;
        self.inner.session.execute_json(request).await
    }

    pub(crate) async fn request_unit(&self, request: Request) -> Result<()> {
        self.ensure_open(request.name())?;
        self.inner.session.execute_unit(request).await
    }

    pub(crate) async fn request_bytes(&self, request: Request) -> Result<Vec<u8>> {
        self.ensure_open(request.name())?;
        self.inner.session.execute_bytes(request).await
    }

    fn name_owned(&self) -> String {
        self.inner.name.clone()
    }

    /// Close the document and release its backing file.
    ///
    /// Idempotent. Failures while releasing are logged and swallowed; the
    /// document is closed regardless.
    pub async fn close(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            debug!(document = %self.inner.name, "Document already closed");
            return;
        }

        let session = &self.inner.session;
        if let Err(e) = session
            .execute_unit(Request::CloseDocument {
                name: self.name_owned(),
            })
            .await
        {
            warn!(document = %self.inner.name, error = %e, "Failed to close document in sandbox");
        }

        if let Some(path) = &self.inner.path {
            if let Err(e) = session
                .execute_unit(Request::RemoveFile { path: path.clone() })
                .await
            {
                warn!(document = %self.inner.name, path = %path, error = %e, "Failed to remove backing file");
            }
        }

        info!(document = %self.inner.name, "Closed document");
    }

    pub async fn page_count(&self) -> Result<usize> {
        self.request_json(Request::PageCount {
            name: self.name_owned(),
        })
        .await
    }

    pub async fn is_pdf(&self) -> Result<bool> {
        self.request_json(Request::IsPdf {
            name: self.name_owned(),
        })
        .await
    }

    pub async fn is_encrypted(&self) -> Result<bool> {
        self.request_json(Request::IsEncrypted {
            name: self.name_owned(),
        })
        .await
    }

    pub async fn needs_pass(&self) -> Result<bool> {
        self.request_json(Request::NeedsPass {
            name: self.name_owned(),
        })
        .await
    }

    pub async fn metadata(&self) -> Result<Metadata> {
        self.request_json(Request::Metadata {
            name: self.name_owned(),
        })
        .await
    }

    /// Update the Info dictionary. `None` fields are left as they are and
    /// empty strings remove the entry.
    pub async fn set_metadata(&self, metadata: Metadata) -> Result<()> {
        self.request_unit(Request::SetMetadata {
            name: self.name_owned(),
            metadata,
        })
        .await
    }

    /// Serialize the document to PDF bytes
    pub async fn save(&self, options: SaveOptions) -> Result<Vec<u8>> {
        self.request_bytes(Request::Save {
            name: self.name_owned(),
            options,
        })
        .await
    }

    /// Handle to page `index`, checked against the current page count
    pub async fn page(&self, index: usize) -> Result<Page> {
        self.ensure_open("get_page")?;
        let page_count = self.page_count().await?;
        if index >= page_count {
            return Err(SandboxError::PageIndexOutOfRange { index, page_count });
        }
        Ok(Page::new(self.clone(), index))
    }

    /// Iterator over the pages present now.
    ///
    /// The count is read once; deleting pages while iterating leaves the
    /// remaining handles stale, and their operations will fail the bounds
    /// check.
    pub async fn pages(&self) -> Result<Pages> {
        let count = self.page_count().await?;
        Ok(Pages {
            document: self.clone(),
            next: 0,
            count,
        })
    }

    pub async fn delete_page(&self, index: usize) -> Result<()> {
        self.request_unit(Request::DeletePage {
            name: self.name_owned(),
            index,
        })
        .await
    }

    /// Delete pages `from..=to`
    pub async fn delete_pages(&self, from: usize, to: usize) -> Result<()> {
        self.request_unit(Request::DeletePages {
            name: self.name_owned(),
            from,
            to,
        })
        .await
    }

    /// Insert a blank page before `index`, or append when `None`
    pub async fn new_page(&self, index: Option<usize>, width: f64, height: f64) -> Result<()> {
        self.request_unit(Request::NewPage {
            name: self.name_owned(),
            index,
            width,
            height,
        })
        .await
    }

    /// Append a blank page of the default size
    pub async fn append_page(&self) -> Result<()> {
        self.new_page(None, DEFAULT_PAGE_WIDTH, DEFAULT_PAGE_HEIGHT)
            .await
    }

    pub async fn move_page(&self, from: usize, to: usize) -> Result<()> {
        self.request_unit(Request::MovePage {
            name: self.name_owned(),
            from,
            to,
        })
        .await
    }

    pub async fn copy_page(&self, from: usize, to: usize) -> Result<()> {
        self.request_unit(Request::CopyPage {
            name: self.name_owned(),
            from,
            to,
        })
        .await
    }

    /// Keep only `indices`, in that order
    pub async fn select(&self, indices: Vec<usize>) -> Result<()> {
        self.request_unit(Request::SelectPages {
            name: self.name_owned(),
            indices,
        })
        .await
    }

    /// Copy pages from `source` into this document
    pub async fn insert_pdf(&self, source: &Document, options: InsertPdfOptions) -> Result<()> {
        source.ensure_open("insert_pdf")?;
        self.request_unit(Request::InsertPdf {
            name: self.name_owned(),
            source: source.name_owned(),
            options,
        })
        .await
    }

    /// Object number of the document catalog
    pub async fn pdf_catalog(&self) -> Result<u32> {
        self.request_json(Request::CatalogXref {
            name: self.name_owned(),
        })
        .await
    }

    /// Read the value at `path` inside object `xref`
    pub async fn xref_get_key(&self, xref: u32, path: &str) -> Result<KeyValue> {
        self.request_json(Request::ReadKey {
            name: self.name_owned(),
            xref,
            path: path.to_string(),
        })
        .await
    }

    /// Replace the value at `path` inside object `xref` with raw PDF syntax
    pub async fn xref_set_key(&self, xref: u32, path: &str, raw: &str) -> Result<()> {
        self.request_unit(Request::WriteKey {
            name: self.name_owned(),
            xref,
            path: path.to_string(),
            raw: raw.to_string(),
        })
        .await
    }

    /// Flat layer enumeration as the engine reports it
    pub async fn layer_ui_configs(&self) -> Result<Vec<LayerUiConfig>> {
        self.request_json(Request::LayerUiConfigs {
            name: self.name_owned(),
        })
        .await
    }

    /// Create an optional content group, returning its object number
    pub async fn add_ocg(&self, layer: &str, options: LayerOptions) -> Result<u32> {
        self.request_json(Request::AddOcg {
            name: self.name_owned(),
            layer: layer.to_string(),
            options,
        })
        .await
    }

    pub fn layers(&self) -> LayerManager {
        LayerManager::new(self.clone())
    }
}

/// Snapshot iterator over a document's pages
#[derive(Debug)]
pub struct Pages {
    document: Document,
    next: usize,
    count: usize,
}

impl Iterator for Pages {
    type Item = Page;

    fn next(&mut self) -> Option<Page> {
        if self.next >= self.count {
            return None;
        }
        let page = Page::new(self.document.clone(), self.next);
        self.next += 1;
        Some(page)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.count - self.next;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Pages {}
