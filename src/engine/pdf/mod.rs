//! `lopdf`-backed engine
//!
//! Holds an in-memory virtual filesystem and the documents opened from it.
//! Documents are addressed by the internal names the session allocates.

mod annots;
mod keys;
mod layers;
mod pages;
mod syntax;

use std::collections::HashMap;

use lopdf::{Document, Object};
use serde_json::json;

use super::{Engine, EngineError, PageOp, Payload, Request};
use crate::document::Metadata;

/// Info dictionary keys, paired with their metadata field names
const INFO_KEYS: [(&str, &str); 9] = [
    ("title", "Title"),
    ("author", "Author"),
    ("subject", "Subject"),
    ("keywords", "Keywords"),
    ("creator", "Creator"),
    ("producer", "Producer"),
    ("creationDate", "CreationDate"),
    ("modDate", "ModDate"),
    ("trapped", "Trapped"),
];

/// Sandboxed PDF runtime
#[derive(Default)]
pub struct PdfEngine {
    files: HashMap<String, Vec<u8>>,
    documents: HashMap<String, Document>,
}

impl PdfEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn doc(&self, name: &str) -> Result<&Document, EngineError> {
        self.documents
            .get(name)
            .ok_or_else(|| EngineError::new(format!("no open document named '{name}'")))
    }

    fn doc_mut(&mut self, name: &str) -> Result<&mut Document, EngineError> {
        self.documents
            .get_mut(name)
            .ok_or_else(|| EngineError::new(format!("no open document named '{name}'")))
    }

    fn metadata(doc: &Document) -> Metadata {
        let info = doc
            .trailer
            .get(b"Info")
            .ok()
            .and_then(|value| keys::deref(doc, value).ok())
            .and_then(|value| value.as_dict().ok());

        let field = |key: &[u8]| -> Option<String> {
            let value = info?.get(key).ok()?;
            match value {
                Object::Name(name) => Some(String::from_utf8_lossy(name).into_owned()),
                other => syntax::object_text(other),
            }
        };

        Metadata {
            format: Some(format!("PDF {}", doc.version)),
            title: field(b"Title"),
            author: field(b"Author"),
            subject: field(b"Subject"),
            keywords: field(b"Keywords"),
            creator: field(b"Creator"),
            producer: field(b"Producer"),
            creation_date: field(b"CreationDate"),
            mod_date: field(b"ModDate"),
            trapped: field(b"Trapped"),
            encryption: doc.trailer.has(b"Encrypt").then(|| "Standard".to_string()),
        }
    }

    fn set_metadata(doc: &mut Document, metadata: &Metadata) -> Result<(), EngineError> {
        let values = serde_json::to_value(metadata)
            .map_err(|e| EngineError::new(format!("cannot encode metadata: {e}")))?;

        let info_id = match doc.trailer.get(b"Info") {
            Ok(Object::Reference(id)) => *id,
            _ => {
                let id = doc.add_object(Object::Dictionary(lopdf::Dictionary::new()));
                doc.trailer.set("Info", Object::Reference(id));
                id
            }
        };
        let info = keys::object_dict_mut(doc, info_id)?;
        for (field, key) in INFO_KEYS {
            match values.get(field).and_then(|v| v.as_str()) {
                Some("") => {
                    info.remove(key.as_bytes());
                }
                Some(text) if key == "Trapped" => info.set(key, syntax::name(text)),
                Some(text) => info.set(key, syntax::text_string(text)),
                None => {}
            }
        }
        Ok(())
    }

    fn handle_page(&mut self, name: &str, index: usize, op: PageOp) -> Result<Payload, EngineError> {
        let doc = self.doc(name)?;
        let page = pages::page_id(doc, index)?;
        match op {
            PageOp::Rect => Payload::json(pages::page_rect(doc, page)?),
            PageOp::Rotation => Payload::json(pages::rotation(doc, page)),
            PageOp::Text => Payload::json(pages::text(doc, index)?),
            PageOp::Annotations => Payload::json(annots::list(doc, page)?),
            PageOp::Links => Payload::json(annots::links(doc, page)?),
            PageOp::SetRotation(rotation) => {
                pages::set_rotation(self.doc_mut(name)?, page, rotation)?;
                Ok(Payload::Unit)
            }
            PageOp::AddAnnotation(annotation) => {
                Payload::json(annots::add(self.doc_mut(name)?, page, &annotation)?)
            }
            PageOp::DeleteAnnotations => Payload::json(annots::delete_all(self.doc_mut(name)?, page)?),
            PageOp::InsertLink { rect, uri } => {
                Payload::json(annots::insert_link(self.doc_mut(name)?, page, &rect, &uri)?)
            }
        }
    }
}

impl Engine for PdfEngine {
    fn handle(&mut self, request: Request) -> Result<Payload, EngineError> {
        match request {
            Request::WriteFile { path, data } => {
                self.files.insert(path, data);
                Ok(Payload::Unit)
            }
            Request::RemoveFile { path } => match self.files.remove(&path) {
                Some(_) => Ok(Payload::Unit),
                None => Err(EngineError::new(format!("no such file: '{path}'"))),
            },

            Request::OpenDocument { name, path } => {
                let bytes = self
                    .files
                    .get(&path)
                    .ok_or_else(|| EngineError::new(format!("no such file: '{path}'")))?;
                let doc = Document::load_mem(bytes)?;
                self.documents.insert(name, doc);
                Ok(Payload::Unit)
            }
            Request::CreateDocument { name } => {
                self.documents.insert(name, pages::empty_document());
                Ok(Payload::Unit)
            }
            Request::CloseDocument { name } => match self.documents.remove(&name) {
                Some(_) => Ok(Payload::Unit),
                None => Err(EngineError::new(format!("no open document named '{name}'"))),
            },

            Request::PageCount { name } => Payload::json(pages::page_ids(self.doc(&name)?).len()),
            Request::IsPdf { name } => {
                self.doc(&name)?;
                Payload::json(true)
            }
            Request::IsEncrypted { name } | Request::NeedsPass { name } => {
                Payload::json(self.doc(&name)?.trailer.has(b"Encrypt"))
            }
            Request::Metadata { name } => Payload::json(Self::metadata(self.doc(&name)?)),
            Request::SetMetadata { name, metadata } => {
                Self::set_metadata(self.doc_mut(&name)?, &metadata)?;
                Ok(Payload::Unit)
            }
            Request::Save { name, options } => {
                let mut doc = self.doc(&name)?.clone();
                if options.garbage {
                    doc.prune_objects();
                }
                if options.compress {
                    doc.compress();
                }
                let mut bytes = Vec::new();
                doc.save_to(&mut bytes)
                    .map_err(|e| EngineError::new(format!("cannot write document: {e}")))?;
                Ok(Payload::Bytes(bytes))
            }

            Request::DeletePage { name, index } => {
                pages::delete_pages(self.doc_mut(&name)?, index, index)?;
                Ok(Payload::Unit)
            }
            Request::DeletePages { name, from, to } => {
                pages::delete_pages(self.doc_mut(&name)?, from, to)?;
                Ok(Payload::Unit)
            }
            Request::NewPage {
                name,
                index,
                width,
                height,
            } => {
                pages::new_page(self.doc_mut(&name)?, index, width, height)?;
                Ok(Payload::Unit)
            }
            Request::MovePage { name, from, to } => {
                pages::move_page(self.doc_mut(&name)?, from, to)?;
                Ok(Payload::Unit)
            }
            Request::CopyPage { name, from, to } => {
                pages::copy_page(self.doc_mut(&name)?, from, to)?;
                Ok(Payload::Unit)
            }
            Request::SelectPages { name, indices } => {
                pages::select(self.doc_mut(&name)?, &indices)?;
                Ok(Payload::Unit)
            }
            Request::InsertPdf {
                name,
                source,
                options,
            } => {
                let source = self.doc(&source)?.clone();
                pages::insert_pdf(self.doc_mut(&name)?, &source, &options)?;
                Ok(Payload::Unit)
            }

            Request::Page { name, index, op } => self.handle_page(&name, index, op),

            Request::CatalogXref { name } => Payload::json(keys::catalog_id(self.doc(&name)?)?.0),
            Request::ReadKey { name, xref, path } => {
                let (kind, raw) = keys::read_key(self.doc(&name)?, xref, &path)?;
                Ok(Payload::Json(json!({ "kind": kind, "raw": raw })))
            }
            Request::WriteKey {
                name,
                xref,
                path,
                raw,
            } => {
                keys::write_key(self.doc_mut(&name)?, xref, &path, &raw)?;
                Ok(Payload::Unit)
            }

            Request::LayerUiConfigs { name } => Payload::json(layers::ui_configs(self.doc(&name)?)?),
            Request::AddOcg {
                name,
                layer,
                options,
            } => Payload::json(layers::add_ocg(self.doc_mut(&name)?, &layer, &options)?),
            Request::SetOc { name, xref, ocg } => {
                layers::set_oc(self.doc_mut(&name)?, xref, ocg)?;
                Ok(Payload::Unit)
            }
            Request::GetOc { name, xref } => Payload::json(layers::get_oc(self.doc(&name)?, xref)?),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::SaveOptions;
    use crate::ocg::{LayerOptions, LayerUiConfig};

    fn engine_with_doc(pages: usize) -> PdfEngine {
        let mut engine = PdfEngine::new();
        engine
            .handle(Request::CreateDocument { name: "d".into() })
            .unwrap();
        for _ in 0..pages {
            engine
                .handle(Request::NewPage {
                    name: "d".into(),
                    index: None,
                    width: 595.0,
                    height: 842.0,
                })
                .unwrap();
        }
        engine
    }

    fn json(engine: &mut PdfEngine, request: Request) -> serde_json::Value {
        match engine.handle(request).unwrap() {
            Payload::Json(value) => value,
            other => panic!("expected json, got {}", other.kind()),
        }
    }

    #[test]
    fn test_save_and_reopen() {
        let mut engine = engine_with_doc(2);
        let bytes = match engine
            .handle(Request::Save {
                name: "d".into(),
                options: SaveOptions {
                    garbage: true,
                    compress: false,
                },
            })
            .unwrap()
        {
            Payload::Bytes(bytes) => bytes,
            other => panic!("expected bytes, got {}", other.kind()),
        };
        assert!(bytes.starts_with(b"%PDF"));

        engine
            .handle(Request::WriteFile {
                path: "/input_9".into(),
                data: bytes,
            })
            .unwrap();
        engine
            .handle(Request::OpenDocument {
                name: "copy".into(),
                path: "/input_9".into(),
            })
            .unwrap();
        assert_eq!(json(&mut engine, Request::PageCount { name: "copy".into() }), 2);
    }

    #[test]
    fn test_missing_file_and_document() {
        let mut engine = PdfEngine::new();
        assert!(engine
            .handle(Request::RemoveFile { path: "/nope".into() })
            .is_err());
        assert!(engine
            .handle(Request::PageCount { name: "nope".into() })
            .is_err());
        assert!(engine
            .handle(Request::OpenDocument {
                name: "d".into(),
                path: "/nope".into()
            })
            .is_err());
    }

    #[test]
    fn test_metadata_round_trip() {
        let mut engine = engine_with_doc(1);
        engine
            .handle(Request::SetMetadata {
                name: "d".into(),
                metadata: Metadata {
                    title: Some("Report".into()),
                    author: Some("Ana".into()),
                    ..Default::default()
                },
            })
            .unwrap();
        let meta: Metadata =
            serde_json::from_value(json(&mut engine, Request::Metadata { name: "d".into() })).unwrap();
        assert_eq!(meta.title.as_deref(), Some("Report"));
        assert_eq!(meta.author.as_deref(), Some("Ana"));
        assert_eq!(meta.format.as_deref(), Some("PDF 1.7"));
        assert!(meta.encryption.is_none());
    }

    #[test]
    fn test_add_ocg_registers_in_default_config() {
        let mut engine = engine_with_doc(1);
        let first = json(
            &mut engine,
            Request::AddOcg {
                name: "d".into(),
                layer: "Base".into(),
                options: LayerOptions::default(),
            },
        );
        json(
            &mut engine,
            Request::AddOcg {
                name: "d".into(),
                layer: "Notes".into(),
                options: LayerOptions::hidden(),
            },
        );

        let layers: Vec<LayerUiConfig> =
            serde_json::from_value(json(&mut engine, Request::LayerUiConfigs { name: "d".into() }))
                .unwrap();
        assert_eq!(layers.len(), 2);
        assert_eq!((layers[0].text.as_str(), layers[0].on), ("Base", true));
        assert_eq!((layers[1].text.as_str(), layers[1].on), ("Notes", false));

        let catalog = json(&mut engine, Request::CatalogXref { name: "d".into() });
        let order = json(
            &mut engine,
            Request::ReadKey {
                name: "d".into(),
                xref: catalog.as_u64().unwrap() as u32,
                path: "OCProperties/D/Order".into(),
            },
        );
        assert_eq!(order["kind"], "array");
        assert!(order["raw"]
            .as_str()
            .unwrap()
            .starts_with(&format!("[{first} 0 R")));
    }

    #[test]
    fn test_add_ocg_rejects_missing_config() {
        let mut engine = engine_with_doc(0);
        let result = engine.handle(Request::AddOcg {
            name: "d".into(),
            layer: "X".into(),
            options: LayerOptions {
                config: 2,
                ..Default::default()
            },
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_set_and_get_oc() {
        let mut engine = engine_with_doc(1);
        let ocg = json(
            &mut engine,
            Request::AddOcg {
                name: "d".into(),
                layer: "L".into(),
                options: LayerOptions::default(),
            },
        )
        .as_u64()
        .unwrap() as u32;
        let annot = json(
            &mut engine,
            Request::Page {
                name: "d".into(),
                index: 0,
                op: PageOp::InsertLink {
                    rect: crate::document::Rect::new(0.0, 0.0, 10.0, 10.0),
                    uri: "https://example.org".into(),
                },
            },
        )
        .as_u64()
        .unwrap() as u32;

        engine
            .handle(Request::SetOc {
                name: "d".into(),
                xref: annot,
                ocg,
            })
            .unwrap();
        assert_eq!(
            json(&mut engine, Request::GetOc { name: "d".into(), xref: annot }),
            ocg
        );
        // Link annotations cannot act as optional content
        assert!(engine
            .handle(Request::SetOc {
                name: "d".into(),
                xref: ocg,
                ocg: annot,
            })
            .is_err());
    }
}
