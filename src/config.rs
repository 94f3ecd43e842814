//! Configuration management for the PDF sandbox

use serde::Deserialize;
use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    pub session: SessionConfig,
    pub conversion: ConversionConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Requests that may wait for the worker before callers block
    pub queue_depth: usize,
    /// Virtual filesystem prefix for document backing files
    pub vfs_prefix: String,
    /// Prefix for internal document names
    pub doc_prefix: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConversionConfig {
    /// Ghostscript executable
    pub ghostscript: PathBuf,
    /// Directory holding the staged input/output files
    pub staging_dir: PathBuf,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            queue_depth: 64,
            vfs_prefix: "/input_".to_string(),
            doc_prefix: "_doc".to_string(),
        }
    }
}

impl Default for ConversionConfig {
    fn default() -> Self {
        ConversionConfig {
            ghostscript: PathBuf::from("gs"),
            staging_dir: env::temp_dir().join("pdf-sandbox"),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, env::VarError> {
        let defaults = Config::default();
        Ok(Config {
            session: SessionConfig {
                queue_depth: env::var("SANDBOX_QUEUE_DEPTH")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .filter(|depth| *depth > 0)
                    .unwrap_or(defaults.session.queue_depth),
                vfs_prefix: env::var("SANDBOX_VFS_PREFIX")
                    .unwrap_or(defaults.session.vfs_prefix),
                doc_prefix: env::var("SANDBOX_DOC_PREFIX")
                    .unwrap_or(defaults.session.doc_prefix),
            },
            conversion: ConversionConfig {
                ghostscript: env::var("GHOSTSCRIPT_PATH")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.conversion.ghostscript),
                staging_dir: env::var("CONVERSION_STAGING_DIR")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.conversion.staging_dir),
            },
        })
    }
}
