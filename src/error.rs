//! Sandbox error types
//!
//! Unified error handling for sessions, documents, pages and layers.

use thiserror::Error;

/// Unified sandbox error type
#[derive(Debug, Error)]
pub enum SandboxError {
    /// Operation attempted on a document (or one of its pages) after `close()`
    #[error("{operation}: document has been closed")]
    DocumentClosed { operation: &'static str },

    /// Page index outside `0..page_count` at call time
    #[error("Page index {index} out of range (document has {page_count} pages)")]
    PageIndexOutOfRange { index: usize, page_count: usize },

    /// The engine failed while executing a request
    #[error("{operation} failed inside the sandbox: {message}")]
    Execution {
        operation: &'static str,
        message: String,
    },

    /// Structural lookup could not be followed while listing layers.
    ///
    /// Never surfaced by the layer listing, which degrades to the flat list.
    #[error("Cannot resolve structure at object {xref} path '{path}'")]
    StructuralResolution { xref: u32, path: String },

    /// A mutation met a value that is neither a dictionary, null, nor a reference
    #[error("{operation}: object {xref} path '{path}' does not resolve to an object")]
    Unresolved {
        operation: &'static str,
        xref: u32,
        path: String,
    },

    /// Secondary conversion engine failed or produced no output
    #[error("Conversion engine failure: {0}")]
    ConversionEngine(String),

    /// Session worker is gone
    #[error("Sandbox session has terminated")]
    SessionTerminated,

    /// Structured result could not be decoded
    #[error("Failed to decode result of {operation}: {source}")]
    Decode {
        operation: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// Unknown transform name
    #[error("Unknown operation: {0}")]
    UnknownOperation(String),

    /// Invalid caller input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// IO error (std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for sandbox operations
pub type Result<T> = std::result::Result<T, SandboxError>;

impl SandboxError {
    /// Whether this error came from a closed document guard
    pub fn is_closed(&self) -> bool {
        matches!(self, SandboxError::DocumentClosed { .. })
    }
}
