//! Tree storage collaborators
//!
//! The walkers only ever see [`TreeLoader`]; the writer side exists so that
//! snapshots can be built and persisted for later walks.

use crate::error::{LoadError, StoreError};
use crate::hash::{hash_bytes, Id};
use crate::tree::Tree;
use async_trait::async_trait;
use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Loads trees by content id
///
/// Implementations must be safe for concurrent invocation: the snapshot
/// walker issues many loads at once against the same loader.
#[async_trait]
pub trait TreeLoader: Send + Sync {
    async fn load_tree(&self, id: Id) -> Result<Tree, LoadError>;
}

#[async_trait]
impl<T: TreeLoader + ?Sized> TreeLoader for Arc<T> {
    async fn load_tree(&self, id: Id) -> Result<Tree, LoadError> {
        (**self).load_tree(id).await
    }
}

/// Persists trees, returning their content id
pub trait TreeWriter {
    fn save_tree(&self, tree: &Tree) -> Result<Id, StoreError>;
}

fn decode(id: Id, bytes: &[u8]) -> Result<Tree, LoadError> {
    if hash_bytes(bytes) != id {
        return Err(LoadError::Corrupt {
            id,
            reason: "content does not match id".to_string(),
        });
    }
    Tree::deserialize(bytes).map_err(|e| LoadError::Corrupt {
        id,
        reason: format!("{:#}", e),
    })
}

/// In-memory tree store
///
/// Holds serialized trees so every load exercises the decode path.
#[derive(Default)]
pub struct MemoryStore {
    trees: DashMap<Id, Vec<u8>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop a stored tree, making later loads fail with `NotFound`
    pub fn remove(&self, id: &Id) -> bool {
        self.trees.remove(id).is_some()
    }

    pub fn contains(&self, id: &Id) -> bool {
        self.trees.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.trees.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trees.is_empty()
    }
}

impl TreeWriter for MemoryStore {
    fn save_tree(&self, tree: &Tree) -> Result<Id, StoreError> {
        let bytes = tree.serialize()?;
        let id = hash_bytes(&bytes);
        self.trees.entry(id).or_insert(bytes);
        Ok(id)
    }
}

#[async_trait]
impl TreeLoader for MemoryStore {
    async fn load_tree(&self, id: Id) -> Result<Tree, LoadError> {
        // Clone out of the map so no shard lock is held while decoding
        let bytes = match self.trees.get(&id) {
            Some(entry) => entry.value().clone(),
            None => return Err(LoadError::NotFound { id }),
        };
        decode(id, &bytes)
    }
}

/// Decoded trees kept by a [`DiskStore`] unless configured otherwise
pub const DEFAULT_CACHE_CAPACITY: usize = 4096;

/// On-disk tree store
///
/// Layout under the store root:
/// ```text
/// objects/
///   trees/<hh>/<rest>
/// tmp/
/// ```
///
/// Decoded trees are cached up to a fixed count. When full, an arbitrary
/// entry is evicted to make room.
pub struct DiskStore {
    root: PathBuf,
    tmp_dir: PathBuf,
    /// Decoded tree cache (id -> tree)
    tree_cache: DashMap<Id, Arc<Tree>>,
    cache_capacity: usize,
}

impl DiskStore {
    /// Open a store, creating its directories if needed
    pub fn open(root: &Path) -> Result<Self, StoreError> {
        let tmp_dir = root.join("tmp");
        for dir in [root.join("objects").join("trees"), tmp_dir.clone()] {
            std::fs::create_dir_all(&dir).map_err(|source| StoreError::Io {
                path: dir.clone(),
                source,
            })?;
        }

        Ok(Self {
            root: root.to_path_buf(),
            tmp_dir,
            tree_cache: DashMap::new(),
            cache_capacity: DEFAULT_CACHE_CAPACITY,
        })
    }

    /// Cache at most `capacity` decoded trees; 0 disables the cache
    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    /// Number of decoded trees currently cached
    pub fn cached_trees(&self) -> usize {
        self.tree_cache.len()
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Get the filesystem path for a tree
    fn tree_path(&self, id: Id) -> PathBuf {
        let hex = id.to_hex();
        let (prefix, rest) = hex.split_at(2);
        self.root.join("objects").join("trees").join(prefix).join(rest)
    }

    pub fn has_tree(&self, id: Id) -> bool {
        self.tree_cache.contains_key(&id) || self.tree_path(id).exists()
    }

    fn cache_insert(&self, id: Id, tree: &Tree) {
        if self.cache_capacity == 0 {
            return;
        }
        // Concurrent loads may overshoot by a few entries
        while self.tree_cache.len() >= self.cache_capacity {
            // The iterator's shard guard must be gone before removing
            let victim = self.tree_cache.iter().next().map(|entry| *entry.key());
            match victim {
                Some(victim) => {
                    self.tree_cache.remove(&victim);
                }
                None => break,
            }
        }
        self.tree_cache.insert(id, Arc::new(tree.clone()));
    }
}

impl TreeWriter for DiskStore {
    fn save_tree(&self, tree: &Tree) -> Result<Id, StoreError> {
        let bytes = tree.serialize()?;
        let id = hash_bytes(&bytes);
        let target = self.tree_path(id);

        if !target.exists() {
            atomic_write(&self.tmp_dir, &target, &bytes)?;
            debug!(tree = %id.short(), bytes = bytes.len(), "Stored tree");
        }
        Ok(id)
    }
}

#[async_trait]
impl TreeLoader for DiskStore {
    async fn load_tree(&self, id: Id) -> Result<Tree, LoadError> {
        if let Some(tree) = self.tree_cache.get(&id) {
            return Ok(Tree::clone(&tree));
        }

        let path = self.tree_path(id);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(LoadError::NotFound { id });
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read tree");
                return Err(LoadError::TransientIo {
                    id,
                    reason: e.to_string(),
                });
            }
        };

        let tree = decode(id, &bytes)?;
        self.cache_insert(id, &tree);
        Ok(tree)
    }
}

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Atomic write helper
///
/// Writes data to a temporary file in `tmp_dir`, fsyncs it, then renames it
/// over `target`. Readers never observe a partially written object.
pub fn atomic_write(tmp_dir: &Path, target: &Path, data: &[u8]) -> Result<(), StoreError> {
    use std::io::Write;

    let io_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source| StoreError::Io { path, source }
    };

    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent).map_err(io_err(parent))?;
    }

    let tmp_path = tmp_dir.join(format!(
        "{}.{}.tmp",
        std::process::id(),
        TMP_COUNTER.fetch_add(1, Ordering::Relaxed)
    ));

    let mut file = std::fs::File::create(&tmp_path).map_err(io_err(&tmp_path))?;
    file.write_all(data).map_err(io_err(&tmp_path))?;
    file.sync_all().map_err(io_err(&tmp_path))?;
    drop(file);

    if let Err(source) = std::fs::rename(&tmp_path, target) {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(StoreError::Io {
            path: target.to_path_buf(),
            source,
        });
    }
    Ok(())
}
