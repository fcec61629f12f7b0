//! Error types for snapwalk-walk
//!
//! Per-node and per-path failures are attached to the job that reports
//! them, and the first one seen is copied into the filesystem walk result,
//! so every variant is cheap to clone.

use snapwalk_core::LoadError;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Failure attached to an emitted job
#[derive(Error, Debug, Clone)]
pub enum WalkError {
    /// A stored tree could not be loaded (NotFound, TransientIo, Corrupt)
    #[error("failed to load tree for '{path}': {source}")]
    Load {
        path: PathBuf,
        #[source]
        source: LoadError,
    },

    /// Filesystem stat or listing failure
    #[error("failed to read metadata for '{path}': {source}")]
    LocalMetadata {
        path: PathBuf,
        #[source]
        source: Arc<io::Error>,
    },

    /// Walk aborted by the caller
    #[error("walk cancelled")]
    Cancelled,
}

impl WalkError {
    pub(crate) fn metadata(path: impl Into<PathBuf>, source: io::Error) -> Self {
        WalkError::LocalMetadata {
            path: path.into(),
            source: Arc::new(source),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, WalkError::Cancelled)
    }

    /// True when a referenced tree is missing from the store
    pub fn is_not_found(&self) -> bool {
        match self {
            WalkError::Load { source, .. } => source.is_not_found(),
            WalkError::LocalMetadata { source, .. } => source.kind() == io::ErrorKind::NotFound,
            WalkError::Cancelled => false,
        }
    }
}

/// Invalid walk configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid {field} {value}: must be at least {min}")]
    TooSmall {
        field: &'static str,
        value: usize,
        min: usize,
    },

    #[error("failed to read config '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}
