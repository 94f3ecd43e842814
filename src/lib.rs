//! PDF Sandbox
//!
//! Runs PDF documents inside an isolated engine owned by a session and
//! exposes typed handles for documents, pages and optional content layers.
//!
//! ```rust,ignore
//! use pdf_sandbox::{config::SessionConfig, ocg::LayerOptions, Session};
//!
//! let session = Session::start(SessionConfig::default())?;
//! let doc = session.open_document_from_bytes(bytes).await?;
//!
//! let layers = doc.layers();
//! let notes = layers.add("Notes", LayerOptions::default()).await?;
//! layers.add_with_parent("Margin", notes, LayerOptions::hidden()).await?;
//!
//! for layer in layers.config().await? {
//!     println!("{}{}", "  ".repeat(layer.depth), layer.text);
//! }
//! doc.close().await;
//! ```

pub mod config;
pub mod convert;
pub mod document;
pub mod engine;
pub mod error;
pub mod ocg;
pub mod session;
pub mod transforms;

pub use document::{Document, Page};
pub use error::{Result, SandboxError};
pub use ocg::LayerManager;
pub use session::Session;
