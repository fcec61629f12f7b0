//! Error types for tree storage
//!
//! Load failures are cloned into every job that reports them, so
//! `LoadError` carries rendered reasons rather than boxed sources.

use crate::hash::Id;
use thiserror::Error;

/// Failure to load a tree by id
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    /// Referenced tree is absent from the store
    #[error("tree {id} not found in store")]
    NotFound { id: Id },

    /// Backend, network or disk failure
    #[error("transient I/O error loading tree {id}: {reason}")]
    TransientIo { id: Id, reason: String },

    /// Stored bytes do not decode or do not hash to the requested id
    #[error("tree {id} is corrupt: {reason}")]
    Corrupt { id: Id, reason: String },
}

impl LoadError {
    /// Id of the tree that failed to load
    pub fn id(&self) -> Id {
        match self {
            LoadError::NotFound { id }
            | LoadError::TransientIo { id, .. }
            | LoadError::Corrupt { id, .. } => *id,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, LoadError::NotFound { .. })
    }
}

/// Failure to persist a tree
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error writing '{path}': {source}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode tree: {0}")]
    Encode(#[from] bincode::Error),
}

/// Violation of the tree object invariants
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TreeError {
    #[error("tree already contains a node named '{0}'")]
    DuplicateName(String),

    #[error("directory node '{0}' has no subtree id")]
    MissingSubtree(String),

    #[error("non-directory node '{0}' must not carry a subtree id")]
    UnexpectedSubtree(String),
}
