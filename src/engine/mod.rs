//! Sandboxed engine boundary
//!
//! An [`Engine`] owns a native document object model and a virtual
//! filesystem. It is driven by exactly one session worker thread, which
//! hands it one [`Request`] at a time and ships the [`Payload`] back.
//!
//! ```text
//!   Document / Page / LayerManager
//!              │  Request
//!              ▼
//!   ┌──────────────────────┐   mpsc    ┌────────────────────────┐
//!   │       Session        │ ────────▶ │  worker thread         │
//!   │ (counter, queue)     │ ◀──────── │  Engine::handle()      │
//!   └──────────────────────┘  oneshot  └────────────────────────┘
//! ```

mod pdf;
mod request;

pub use pdf::PdfEngine;
pub use request::{PageOp, Request};

use serde::Serialize;
use thiserror::Error;

/// Result crossing back from the engine
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Unit,
    /// Structured value, decoded by the session
    Json(serde_json::Value),
    /// Binary output (saved documents)
    Bytes(Vec<u8>),
}

impl Payload {
    /// Serialize a value into a JSON payload
    pub fn json<T: Serialize>(value: T) -> Result<Self, EngineError> {
        serde_json::to_value(value)
            .map(Payload::Json)
            .map_err(|e| EngineError::new(format!("cannot encode result: {e}")))
    }

    /// Short description for logs
    pub fn kind(&self) -> &'static str {
        match self {
            Payload::Unit => "unit",
            Payload::Json(_) => "json",
            Payload::Bytes(_) => "bytes",
        }
    }
}

/// Failure raised inside the engine
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct EngineError {
    pub message: String,
}

impl EngineError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<lopdf::Error> for EngineError {
    fn from(err: lopdf::Error) -> Self {
        EngineError::new(err.to_string())
    }
}

/// Single-threaded, stateful document runtime
pub trait Engine: Send + 'static {
    /// Execute one request to completion
    fn handle(&mut self, request: Request) -> Result<Payload, EngineError>;
}
