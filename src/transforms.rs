//! Named document transforms
//!
//! A small dispatch table of whole-document operations over byte inputs,
//! built on session documents.

use std::fmt;
use std::str::FromStr;

use tracing::{info, warn};

use crate::convert::ColorConverter;
use crate::document::{Document, InsertPdfOptions, SaveOptions};
use crate::error::{Result, SandboxError};
use crate::session::Session;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transform {
    /// Concatenate all inputs into one document
    Merge,
    /// One document per page of the first input
    Split,
    /// Plain text of every page
    ExtractText,
    /// Convert CMYK content to sRGB
    NormalizeColors,
}

impl Transform {
    pub fn name(&self) -> &'static str {
        match self {
            Transform::Merge => "merge",
            Transform::Split => "split",
            Transform::ExtractText => "extract-text",
            Transform::NormalizeColors => "normalize-colors",
        }
    }
}

impl fmt::Display for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Transform {
    type Err = SandboxError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "merge" => Ok(Transform::Merge),
            "split" => Ok(Transform::Split),
            "extract-text" => Ok(Transform::ExtractText),
            "normalize-colors" => Ok(Transform::NormalizeColors),
            other => Err(SandboxError::UnknownOperation(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransformOutput {
    Documents(Vec<Vec<u8>>),
    Text(String),
}

/// Open `bytes`, converting colors first when a converter is given.
///
/// A failed conversion falls back to the original bytes.
pub async fn open_normalized(
    session: &Session,
    bytes: Vec<u8>,
    converter: Option<&dyn ColorConverter>,
) -> Result<Document> {
    let Some(converter) = converter else {
        return session.open_document_from_bytes(bytes).await;
    };
    match converter.convert(&bytes, None).await {
        Ok(converted) => session.open_document_from_bytes(converted).await,
        Err(e) => {
            warn!(error = %e, "Color normalization failed, opening original");
            session.open_document_from_bytes(bytes).await
        }
    }
}

pub async fn run_transform(
    session: &Session,
    transform: Transform,
    inputs: Vec<Vec<u8>>,
    converter: Option<&dyn ColorConverter>,
) -> Result<TransformOutput> {
    if inputs.is_empty() {
        return Err(SandboxError::InvalidInput(format!("{transform} needs at least one input")));
    }
    info!(%transform, inputs = inputs.len(), "Running transform");

    match transform {
        Transform::Merge => merge(session, inputs).await.map(|merged| TransformOutput::Documents(vec![merged])),
        Transform::Split => {
            let first = inputs.into_iter().next().unwrap_or_default();
            split(session, first).await.map(TransformOutput::Documents)
        }
        Transform::ExtractText => {
            let mut text = String::new();
            for input in inputs {
                let doc = session.open_document_from_bytes(input).await?;
                let result = extract_text(&doc, &mut text).await;
                doc.close().await;
                result?;
            }
            Ok(TransformOutput::Text(text))
        }
        Transform::NormalizeColors => {
            let converter = converter.ok_or_else(|| {
                SandboxError::ConversionEngine("no color converter configured".to_string())
            })?;
            let mut outputs = Vec::with_capacity(inputs.len());
            for input in inputs {
                outputs.push(converter.convert(&input, None).await?);
            }
            Ok(TransformOutput::Documents(outputs))
        }
    }
}

async fn merge(session: &Session, inputs: Vec<Vec<u8>>) -> Result<Vec<u8>> {
    let target = session.create_empty_document().await?;
    let result = merge_into(session, &target, inputs).await;
    let merged = match result {
        Ok(()) => target.save(SaveOptions { garbage: true, compress: false }).await,
        Err(e) => Err(e),
    };
    target.close().await;
    merged
}

async fn merge_into(session: &Session, target: &Document, inputs: Vec<Vec<u8>>) -> Result<()> {
    for input in inputs {
        let source = session.open_document_from_bytes(input).await?;
        let result = target.insert_pdf(&source, InsertPdfOptions::default()).await;
        source.close().await;
        result?;
    }
    Ok(())
}

async fn split(session: &Session, input: Vec<u8>) -> Result<Vec<Vec<u8>>> {
    let source = session.open_document_from_bytes(input).await?;
    let result = split_pages(session, &source).await;
    source.close().await;
    result
}

async fn split_pages(session: &Session, source: &Document) -> Result<Vec<Vec<u8>>> {
    let mut outputs = Vec::new();
    for page in source.pages().await? {
        let single = session.create_empty_document().await?;
        let saved = match single
            .insert_pdf(source, InsertPdfOptions::pages(page.index(), page.index()))
            .await
        {
            Ok(()) => single.save(SaveOptions { garbage: true, compress: false }).await,
            Err(e) => Err(e),
        };
        single.close().await;
        outputs.push(saved?);
    }
    Ok(outputs)
}

async fn extract_text(doc: &Document, out: &mut String) -> Result<()> {
    for page in doc.pages().await? {
        out.push_str(&page.get_text().await?);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionConfig;
    use async_trait::async_trait;

    async fn pdf(session: &Session, pages: usize) -> Vec<u8> {
        let doc = session.create_empty_document().await.unwrap();
        for _ in 0..pages {
            doc.append_page().await.unwrap();
        }
        let bytes = doc.save(SaveOptions::default()).await.unwrap();
        doc.close().await;
        bytes
    }

    async fn page_count(session: &Session, bytes: Vec<u8>) -> usize {
        let doc = session.open_document_from_bytes(bytes).await.unwrap();
        doc.page_count().await.unwrap()
    }

    struct FailingConverter;

    #[async_trait]
    impl ColorConverter for FailingConverter {
        async fn is_available(&self) -> bool {
            false
        }

        async fn convert(&self, _pdf: &[u8], _source_profile: Option<&str>) -> Result<Vec<u8>> {
            Err(SandboxError::ConversionEngine("exit code 1".to_string()))
        }
    }

    #[test]
    fn test_parse_transform_names() {
        assert_eq!("merge".parse::<Transform>().unwrap(), Transform::Merge);
        assert_eq!("extract-text".parse::<Transform>().unwrap(), Transform::ExtractText);
        assert!(matches!(
            "watermark".parse::<Transform>(),
            Err(SandboxError::UnknownOperation(name)) if name == "watermark"
        ));
    }

    #[tokio::test]
    async fn test_merge_and_split() {
        let session = Session::start(SessionConfig::default()).unwrap();
        let a = pdf(&session, 2).await;
        let b = pdf(&session, 3).await;

        let TransformOutput::Documents(merged) =
            run_transform(&session, Transform::Merge, vec![a, b], None).await.unwrap()
        else {
            panic!("merge returns documents");
        };
        assert_eq!(merged.len(), 1);
        assert_eq!(page_count(&session, merged[0].clone()).await, 5);

        let TransformOutput::Documents(pages) =
            run_transform(&session, Transform::Split, merged, None).await.unwrap()
        else {
            panic!("split returns documents");
        };
        assert_eq!(pages.len(), 5);
        for page in pages {
            assert_eq!(page_count(&session, page).await, 1);
        }
    }

    #[tokio::test]
    async fn test_empty_inputs_rejected() {
        let session = Session::start(SessionConfig::default()).unwrap();
        let result = run_transform(&session, Transform::Merge, Vec::new(), None).await;
        assert!(matches!(result, Err(SandboxError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_normalize_requires_converter() {
        let session = Session::start(SessionConfig::default()).unwrap();
        let input = pdf(&session, 1).await;
        let result = run_transform(&session, Transform::NormalizeColors, vec![input.clone()], None).await;
        assert!(matches!(result, Err(SandboxError::ConversionEngine(_))));

        let failing = run_transform(
            &session,
            Transform::NormalizeColors,
            vec![input],
            Some(&FailingConverter as &dyn ColorConverter),
        )
        .await;
        assert!(matches!(failing, Err(SandboxError::ConversionEngine(_))));
    }

    #[tokio::test]
    async fn test_open_normalized_falls_back() {
        let session = Session::start(SessionConfig::default()).unwrap();
        let input = pdf(&session, 2).await;
        let doc = open_normalized(&session, input, Some(&FailingConverter as &dyn ColorConverter))
            .await
            .unwrap();
        assert_eq!(doc.page_count().await.unwrap(), 2);
    }
}
