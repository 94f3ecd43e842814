//! Page handle

use serde::de::DeserializeOwned;

use super::handle::Document;
use super::types::{Annotation, Link, NewAnnotation, Point, Rect, Rgb};
use crate::engine::{PageOp, Request};
use crate::error::{Result, SandboxError};

/// View onto one page of a document
///
/// Holds no state of its own besides the index. The index is checked
/// against the live page count on every call.
#[derive(Debug, Clone)]
pub struct Page {
    document: Document,
    index: usize,
}

impl Page {
    pub(crate) fn new(document: Document, index: usize) -> Self {
        Self { document, index }
    }

    /// 0-based page index
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    async fn check(&self, operation: &'static str) -> Result<()> {
        self.document.ensure_open(operation)?;
        let page_count = self.document.page_count().await?;
        if self.index >= page_count {
            return Err(SandboxError::PageIndexOutOfRange {
                index: self.index,
                page_count,
            });
        }
        Ok(())
    }

    fn request(&self, op: PageOp) -> Request {
        Request::Page {
            name: self.document.name().to_string(),
            index: self.index,
            op,
        }
    }

    async fn json<T: DeserializeOwned>(&self, op: PageOp) -> Result<T> {
        self.check(op.name()).await?;
        self.document.request_json(self.request(op)).await
    }

    async fn unit(&self, op: PageOp) -> Result<()> {
        self.check(op.name()).await?;
        self.document.request_unit(self.request(op)).await
    }

    /// Visible page rectangle, with rotation applied
    pub async fn rect(&self) -> Result<Rect> {
        self.json(PageOp::Rect).await
    }

    pub async fn rotation(&self) -> Result<i64> {
        self.json(PageOp::Rotation).await
    }

    /// Set `/Rotate`; must be a multiple of 90
    pub async fn set_rotation(&self, rotation: i64) -> Result<()> {
        self.unit(PageOp::SetRotation(rotation)).await
    }

    pub async fn get_text(&self) -> Result<String> {
        self.json(PageOp::Text).await
    }

    pub async fn annotations(&self) -> Result<Vec<Annotation>> {
        self.json(PageOp::Annotations).await
    }

    /// Add an annotation, returning its object number
    pub async fn add_annotation(&self, annotation: NewAnnotation) -> Result<u32> {
        self.json(PageOp::AddAnnotation(annotation)).await
    }

    pub async fn add_highlight(&self, rect: Rect, color: Option<Rgb>) -> Result<u32> {
        self.add_annotation(NewAnnotation::Highlight {
            rect,
            color: color.unwrap_or_default(),
        })
        .await
    }

    pub async fn add_text_annotation(&self, point: Point, contents: &str) -> Result<u32> {
        self.add_annotation(NewAnnotation::Text {
            point,
            contents: contents.to_string(),
        })
        .await
    }

    pub async fn add_rect_annotation(&self, rect: Rect, color: Option<Rgb>) -> Result<u32> {
        self.add_annotation(NewAnnotation::Rect {
            rect,
            color: color.unwrap_or(Rgb(1.0, 0.0, 0.0)),
        })
        .await
    }

    /// Remove every annotation, returning how many were removed
    pub async fn delete_annotations(&self) -> Result<usize> {
        self.json(PageOp::DeleteAnnotations).await
    }

    pub async fn links(&self) -> Result<Vec<Link>> {
        self.json(PageOp::Links).await
    }

    /// Add a URI link, returning its object number
    pub async fn insert_link(&self, rect: Rect, uri: &str) -> Result<u32> {
        self.json(PageOp::InsertLink {
            rect,
            uri: uri.to_string(),
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use crate::config::SessionConfig;
    use crate::document::{Point, Rect};
    use crate::error::SandboxError;
    use crate::session::Session;

    #[tokio::test]
    async fn test_page_operations() {
        let session = Session::start(SessionConfig::default()).unwrap();
        let doc = session.create_empty_document().await.unwrap();
        doc.append_page().await.unwrap();
        let page = doc.page(0).await.unwrap();

        let rect = page.rect().await.unwrap();
        assert_eq!((rect.width(), rect.height()), (595.0, 842.0));

        page.set_rotation(90).await.unwrap();
        assert_eq!(page.rotation().await.unwrap(), 90);
        let rotated = page.rect().await.unwrap();
        assert_eq!((rotated.width(), rotated.height()), (842.0, 595.0));
        assert!(page.set_rotation(45).await.is_err());

        let highlight = page
            .add_highlight(Rect::new(10.0, 10.0, 60.0, 20.0), None)
            .await
            .unwrap();
        page.add_text_annotation(Point { x: 5.0, y: 5.0 }, "see (here)")
            .await
            .unwrap();
        page.insert_link(Rect::new(0.0, 0.0, 20.0, 20.0), "https://example.org")
            .await
            .unwrap();

        let annotations = page.annotations().await.unwrap();
        assert_eq!(annotations.len(), 3);
        assert_eq!(annotations[0].xref, highlight);
        assert_eq!(annotations[1].contents.as_deref(), Some("see (here)"));
        assert_eq!(page.links().await.unwrap().len(), 1);

        assert_eq!(page.delete_annotations().await.unwrap(), 3);
        assert!(page.annotations().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_page_detects_deleted_page() {
        let session = Session::start(SessionConfig::default()).unwrap();
        let doc = session.create_empty_document().await.unwrap();
        doc.append_page().await.unwrap();
        doc.append_page().await.unwrap();
        let last = doc.page(1).await.unwrap();

        doc.delete_page(0).await.unwrap();
        assert!(matches!(
            last.rotation().await,
            Err(SandboxError::PageIndexOutOfRange {
                index: 1,
                page_count: 1
            })
        ));
    }
}
