use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Bad input: non-positive dimension, empty interval list, duplicate
    /// frame name, unknown format
    #[error("Validation error: {0}")]
    Validation(String),

    /// The operation needs the gadget in a state it is not in
    #[error("Precondition failed: {0}")]
    Precondition(String),

    /// A ConfigFS mutation or read failed
    #[error("ConfigFS error at {}: {source}", .path.display())]
    Resource {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// No USB Device Controller to bind to
    #[error("Device error: {0}")]
    Device(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl AppError {
    /// Wrap a failed tree operation together with the path it touched
    pub fn resource(path: &Path, source: io::Error) -> Self {
        AppError::Resource {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Whether the error is a local input problem (never worth retrying)
    pub fn is_validation(&self) -> bool {
        matches!(self, AppError::Validation(_))
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, AppError>;
