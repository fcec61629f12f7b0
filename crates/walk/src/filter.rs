//! Inclusion predicates for the filesystem walker and snapshot builder
//!
//! A filter sees the on-disk path and lstat metadata of each candidate.
//! Rejecting a directory prunes its whole subtree.

use crate::job::Metadata;
use anyhow::{Context, Result};
use ignore::gitignore::{Gitignore, GitignoreBuilder};
use std::path::Path;

/// Decides whether an entry is included in the walk
pub trait Filter: Send + Sync {
    fn include(&self, path: &Path, metadata: &Metadata) -> bool;
}

impl<F> Filter for F
where
    F: Fn(&Path, &Metadata) -> bool + Send + Sync,
{
    fn include(&self, path: &Path, metadata: &Metadata) -> bool {
        self(path, metadata)
    }
}

/// Includes every entry
#[derive(Debug, Clone, Copy, Default)]
pub struct IncludeAll;

impl Filter for IncludeAll {
    fn include(&self, _path: &Path, _metadata: &Metadata) -> bool {
        true
    }
}

/// Names excluded by every [`IgnoreFilter`], regardless of its patterns
pub const BUILTIN_IGNORED: &[&str] = &[".git"];

/// Excludes entries matching gitignore-style patterns
///
/// Patterns are anchored at `root`, the same way a `.gitignore` placed in
/// `root` would be. Entries named in [`BUILTIN_IGNORED`] are always excluded.
pub struct IgnoreFilter {
    matcher: Gitignore,
}

impl IgnoreFilter {
    /// Build from individual pattern lines
    pub fn from_patterns(root: &Path, patterns: &[&str]) -> Result<Self> {
        let mut builder = GitignoreBuilder::new(root);
        for pattern in patterns {
            builder
                .add_line(None, pattern)
                .with_context(|| format!("Invalid ignore pattern '{}'", pattern))?;
        }
        Ok(Self {
            matcher: builder.build()?,
        })
    }

    /// Build from an ignore file
    pub fn from_file(root: &Path, file: &Path) -> Result<Self> {
        let mut builder = GitignoreBuilder::new(root);
        if let Some(err) = builder.add(file) {
            return Err(err).with_context(|| format!("Failed to read ignore file {}", file.display()));
        }
        Ok(Self {
            matcher: builder.build()?,
        })
    }

    /// Number of patterns loaded, not counting the built-in names
    pub fn len(&self) -> usize {
        self.matcher.num_ignores() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Filter for IgnoreFilter {
    fn include(&self, path: &Path, metadata: &Metadata) -> bool {
        if is_builtin_ignored(path) {
            return false;
        }
        !self.matcher.matched(path, metadata.is_dir()).is_ignore()
    }
}

fn is_builtin_ignored(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| BUILTIN_IGNORED.contains(&name))
}
