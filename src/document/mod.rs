//! Document and page handles
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                           Session                            │
//! │      (worker thread + engine, atomic document counter)       │
//! └──────────────────────────────┬───────────────────────────────┘
//!                                │ execute(Request)
//!               ┌────────────────┼─────────────────┐
//!               ▼                ▼                 ▼
//!        ┌────────────┐   ┌────────────┐   ┌──────────────┐
//!        │  Document  │──▶│    Page    │   │ LayerManager │
//!        │ name, path │   │  doc,index │   │   (ocg/)     │
//!        │   closed   │   └────────────┘   └──────────────┘
//!        └────────────┘
//! ```
//!
//! A document is `Open` until `close()`, then `Closed` for good. Pages and
//! the layer manager share the document's state, so every operation on any
//! of them fails with [`SandboxError::DocumentClosed`] once it is closed.
//!
//! [`SandboxError::DocumentClosed`]: crate::error::SandboxError::DocumentClosed

mod handle;
mod page;
mod types;

pub use handle::{Document, Pages};
pub use page::Page;
pub use types::*;
