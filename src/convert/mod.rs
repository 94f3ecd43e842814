//! Colorspace conversion
//!
//! Converters turn a PDF with CMYK content into an sRGB one. They run
//! outside the document sandbox and only ever see and return bytes.

mod ghostscript;

use async_trait::async_trait;

use crate::error::Result;

pub use ghostscript::GhostscriptBridge;

/// Converter trait
#[async_trait]
pub trait ColorConverter: Send + Sync {
    /// Check if the converter can run
    async fn is_available(&self) -> bool;

    /// Convert `pdf` to sRGB.
    ///
    /// `source_profile` is an ICC profile for untagged CMYK content; the
    /// converter's default is used when `None`.
    async fn convert(&self, pdf: &[u8], source_profile: Option<&str>) -> Result<Vec<u8>>;
}
