//! Optional content (layers)
//!
//! - [`reference`]: parser and editor for nested reference arrays
//! - [`access`]: typed reads and writes of structural keys
//! - [`LayerManager`]: layer listing with hierarchy, creation, nesting,
//!   visibility and deletion

pub mod access;
mod manager;
pub mod reference;
mod types;

pub use access::{KeyPath, KeyValue};
pub use manager::LayerManager;
pub use reference::{scan_order, OrderNode, RefList, Reference};
pub use types::*;
