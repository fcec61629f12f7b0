//! Build and store the tree structure of a set of filesystem roots
//!
//! Produces the snapshot a later tree walk re-emits: one tree per
//! directory, saved bottom-up, and a root tree whose nodes are the given
//! roots in the given order. Only metadata is recorded; file contents are
//! left to the archiver.

use crate::filter::Filter;
use crate::fs_walker::root_name;
use crate::job::Metadata;
use anyhow::{Context, Result};
use snapwalk_core::{Id, Node, Tree, TreeWriter};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::{DirEntry, WalkDir};

/// Snapshot `roots` into `writer`, returning the id of the root tree
///
/// Uses the same name order, symlink handling and filter semantics as the
/// filesystem walker, so walking the result lines up with walking `roots`.
/// Entries that cannot be read are logged and left out.
pub fn snapshot_paths<W>(writer: &W, roots: &[PathBuf], filter: &dyn Filter) -> Result<Id>
where
    W: TreeWriter + ?Sized,
{
    let mut root_tree = Tree::new();
    let mut trees = 0usize;

    for root in roots {
        let Some(mut node) = snapshot_root(writer, root, filter, &mut trees)? else {
            continue;
        };
        node.name = root_name(root).to_string_lossy().into_owned();
        root_tree
            .push(node)
            .with_context(|| format!("Duplicate root name for {}", root.display()))?;
    }

    let id = writer.save_tree(&root_tree)?;
    info!(roots = roots.len(), trees = trees + 1, root = %id.short(), "Snapshot complete");
    Ok(id)
}

/// Store every directory below `root`; returns the node for `root` itself
fn snapshot_root<W>(writer: &W, root: &Path, filter: &dyn Filter, trees: &mut usize) -> Result<Option<Node>>
where
    W: TreeWriter + ?Sized,
{
    // levels[d] collects the children of the directory currently open at depth d - 1
    let mut levels: Vec<Tree> = Vec::new();
    let mut root_node = None;

    let walker = WalkDir::new(root)
        .follow_links(false)
        .follow_root_links(false)
        .contents_first(true)
        .sort_by(|a, b| a.file_name().cmp(b.file_name()))
        .into_iter()
        .filter_entry(|entry| included(entry, filter));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "Skipping unreadable entry");
                continue;
            }
        };
        let depth = entry.depth();

        // Contents come first, so a directory's children are complete by now
        let children = if entry.file_type().is_dir() {
            Some(levels.get_mut(depth + 1).map(std::mem::take).unwrap_or_default())
        } else {
            None
        };

        let metadata = match entry.metadata() {
            Ok(metadata) => metadata,
            Err(e) => {
                warn!(path = %entry.path().display(), error = %e, "Skipping entry without metadata");
                continue;
            }
        };

        let subtree = match children {
            Some(children) => {
                *trees += 1;
                Some(writer.save_tree(&children)?)
            }
            None => None,
        };

        let name = entry.file_name().to_string_lossy().into_owned();
        let node = Node::from_metadata(name, &metadata, subtree);
        debug!(path = %entry.path().display(), kind = ?node.kind, "Recorded entry");

        if depth == 0 {
            root_node = Some(node);
        } else {
            if levels.len() <= depth {
                levels.resize_with(depth + 1, Tree::new);
            }
            levels[depth]
                .insert(node)
                .with_context(|| format!("Failed to record {}", entry.path().display()))?;
        }
    }

    Ok(root_node)
}

fn included(entry: &DirEntry, filter: &dyn Filter) -> bool {
    match entry.metadata() {
        Ok(metadata) => filter.include(entry.path(), &Metadata::from(&metadata)),
        // Unreadable entries are not filtered; the loop above reports them
        Err(_) => true,
    }
}
