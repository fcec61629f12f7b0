//! Snapwalk core - content-addressed tree primitives
//!
//! This crate provides the object layer the walkers are built on:
//! - BLAKE3 content ids
//! - Tree and node representation
//! - Tree loading and storing collaborators (memory and on-disk)

pub mod error;
pub mod hash;
pub mod store;
pub mod tree;

// Re-export main types for convenience
pub use error::{LoadError, StoreError, TreeError};
pub use hash::{hash_bytes, Id, ParseIdError};
pub use store::{DiskStore, MemoryStore, TreeLoader, TreeWriter};
pub use tree::{Node, NodeKind, Tree};
