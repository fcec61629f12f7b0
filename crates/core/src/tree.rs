//! Tree objects: the stored form of one directory's contents

use crate::error::TreeError;
use crate::hash::{hash_bytes, Id};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::{FileType, Metadata};
use std::time::SystemTime;

/// Type of tree entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    /// Regular file
    File,
    /// Directory, backed by a subtree
    Dir,
    /// Symbolic link (never followed)
    Symlink,
    /// Devices, sockets, fifos
    Other,
}

impl NodeKind {
    /// Classify an lstat file type
    pub fn from_file_type(file_type: FileType) -> Self {
        if file_type.is_dir() {
            NodeKind::Dir
        } else if file_type.is_symlink() {
            NodeKind::Symlink
        } else if file_type.is_file() {
            NodeKind::File
        } else {
            NodeKind::Other
        }
    }
}

/// One named entry in a tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub name: String,
    pub kind: NodeKind,
    pub size: u64,
    /// Unix permission bits (mode), zero where unavailable
    pub mode: u32,
    pub mtime: Option<SystemTime>,
    /// Id of the child tree, set only for directories
    pub subtree: Option<Id>,
}

impl Node {
    /// Create a file node with no metadata
    pub fn file(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            kind: NodeKind::File,
            size,
            mode: 0o644,
            mtime: None,
            subtree: None,
        }
    }

    /// Create a directory node pointing at a stored subtree
    pub fn dir(name: impl Into<String>, subtree: Id) -> Self {
        Self {
            name: name.into(),
            kind: NodeKind::Dir,
            size: 0,
            mode: 0o755,
            mtime: None,
            subtree: Some(subtree),
        }
    }

    /// Build a node from lstat metadata
    ///
    /// `subtree` must be given for directories and omitted otherwise; this
    /// is checked when the node is added to a [`Tree`].
    pub fn from_metadata(name: impl Into<String>, metadata: &Metadata, subtree: Option<Id>) -> Self {
        let kind = NodeKind::from_file_type(metadata.file_type());
        Self {
            name: name.into(),
            kind,
            size: if kind == NodeKind::File { metadata.len() } else { 0 },
            mode: mode_bits(metadata),
            mtime: metadata.modified().ok(),
            subtree,
        }
    }

    pub fn is_dir(&self) -> bool {
        self.kind == NodeKind::Dir
    }

    fn check(&self) -> Result<(), TreeError> {
        match (self.kind, self.subtree) {
            (NodeKind::Dir, None) => Err(TreeError::MissingSubtree(self.name.clone())),
            (NodeKind::Dir, Some(_)) => Ok(()),
            (_, Some(_)) => Err(TreeError::UnexpectedSubtree(self.name.clone())),
            (_, None) => Ok(()),
        }
    }
}

#[cfg(unix)]
fn mode_bits(metadata: &Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode()
}

#[cfg(not(unix))]
fn mode_bits(metadata: &Metadata) -> u32 {
    if metadata.permissions().readonly() {
        0o444
    } else {
        0o644
    }
}

/// Ordered sequence of nodes, addressed by the hash of its serialized form
///
/// Nodes are kept in byte-wise lexicographic order of their names, which is
/// the same order the filesystem walker uses when it lists a directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    pub fn new() -> Self {
        Self { nodes: Vec::new() }
    }

    /// Insert a node at its sorted position
    pub fn insert(&mut self, node: Node) -> Result<(), TreeError> {
        node.check()?;
        match self
            .nodes
            .binary_search_by(|existing| existing.name.as_str().cmp(node.name.as_str()))
        {
            Ok(_) => Err(TreeError::DuplicateName(node.name)),
            Err(pos) => {
                self.nodes.insert(pos, node);
                Ok(())
            }
        }
    }

    /// Append a node without sorting
    ///
    /// Only the synthetic snapshot root uses this, so that its order follows
    /// the order in which the walk roots were given.
    pub fn push(&mut self, node: Node) -> Result<(), TreeError> {
        node.check()?;
        if self.find(&node.name).is_some() {
            return Err(TreeError::DuplicateName(node.name));
        }
        self.nodes.push(node);
        Ok(())
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn into_nodes(self) -> Vec<Node> {
        self.nodes
    }

    /// Look up a node by name
    pub fn find(&self, name: &str) -> Option<&Node> {
        self.nodes.iter().find(|node| node.name == name)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Serialize the tree to bytes
    ///
    /// The encoding is deterministic: equal trees always produce equal bytes.
    pub fn serialize(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    /// Deserialize a tree from bytes
    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        let tree: Tree = bincode::deserialize(bytes).context("Failed to decode tree")?;
        for node in &tree.nodes {
            node.check()?;
        }
        Ok(tree)
    }

    /// Compute the id of this tree
    pub fn id(&self) -> Result<Id, bincode::Error> {
        Ok(hash_bytes(&self.serialize()?))
    }
}
