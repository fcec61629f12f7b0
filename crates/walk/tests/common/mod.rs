//! Common utilities for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use snapwalk_core::{Id, LoadError, MemoryStore, Node, Tree, TreeLoader, TreeWriter};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Route walker logs to the test harness; safe to call from every test
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

/// Memory store that sleeps before every load and records concurrency
pub struct DelayLoader {
    pub store: MemoryStore,
    delay: Duration,
    per_tree: HashMap<Id, Duration>,
    loads: AtomicUsize,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl DelayLoader {
    pub fn new(store: MemoryStore, delay: Duration) -> Self {
        Self {
            store,
            delay,
            per_tree: HashMap::new(),
            loads: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        }
    }

    /// Override the delay for one tree
    pub fn with_delay(mut self, id: Id, delay: Duration) -> Self {
        self.per_tree.insert(id, delay);
        self
    }

    /// Loads started so far
    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    /// Highest number of loads observed in flight at once
    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TreeLoader for DelayLoader {
    async fn load_tree(&self, id: Id) -> Result<Tree, LoadError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(active, Ordering::SeqCst);

        let delay = self.per_tree.get(&id).copied().unwrap_or(self.delay);
        tokio::time::sleep(delay).await;

        self.active.fetch_sub(1, Ordering::SeqCst);
        self.store.load_tree(id).await
    }
}

/// Store a tree built from `nodes` and return its id
pub fn store_tree(store: &impl TreeWriter, nodes: Vec<Node>) -> Id {
    let mut tree = Tree::new();
    for node in nodes {
        tree.insert(node).unwrap();
    }
    store.save_tree(&tree).unwrap()
}

/// Ids of the stored `r/b` example tree
pub struct Example {
    pub root: Id,
    pub r: Id,
    pub b: Id,
}

/// Root tree `{r}` with `r = {a, b = {c, d}, e}`
pub fn example_tree(store: &impl TreeWriter) -> Example {
    let b = store_tree(store, vec![Node::file("c", 3), Node::file("d", 4)]);
    let r = store_tree(
        store,
        vec![Node::file("a", 1), Node::dir("b", b), Node::file("e", 5)],
    );
    let mut top = Tree::new();
    top.push(Node::dir("r", r)).unwrap();
    let root = store.save_tree(&top).unwrap();
    Example { root, r, b }
}

/// Balanced tree: `depth` levels of `breadth` directories, then `breadth` files
///
/// Names include the level so identical subtrees at different depths do not
/// collapse to one id.
pub fn balanced_tree(store: &impl TreeWriter, depth: usize, breadth: usize) -> Id {
    let nodes = if depth == 0 {
        (0..breadth).map(|i| Node::file(format!("f{}", i), i as u64)).collect()
    } else {
        (0..breadth)
            .map(|i| Node::dir(format!("d{}_{}", depth, i), balanced_tree(store, depth - 1, breadth)))
            .collect()
    };
    store_tree(store, nodes)
}

/// Pre-order paths of [`balanced_tree`], including the empty root path
pub fn balanced_paths(depth: usize, breadth: usize) -> Vec<String> {
    fn visit(prefix: &str, depth: usize, breadth: usize, out: &mut Vec<String>) {
        for i in 0..breadth {
            let name = if depth == 0 {
                format!("f{}", i)
            } else {
                format!("d{}_{}", depth, i)
            };
            let path = if prefix.is_empty() {
                name
            } else {
                format!("{}/{}", prefix, name)
            };
            out.push(path.clone());
            if depth > 0 {
                visit(&path, depth - 1, breadth, out);
            }
        }
    }

    let mut out = vec![String::new()];
    visit("", depth, breadth, &mut out);
    out
}

/// Number of trees in [`balanced_tree`]
pub fn balanced_tree_count(depth: usize, breadth: usize) -> usize {
    (0..=depth).map(|level| breadth.pow(level as u32)).sum()
}

/// Create `r/{a, b/{c, d}, e}` on disk below `parent`
pub fn example_dir(parent: &Path) -> std::io::Result<std::path::PathBuf> {
    let root = parent.join("r");
    fs::create_dir_all(root.join("b"))?;
    fs::write(root.join("a"), b"a")?;
    fs::write(root.join("b/c"), b"ccc")?;
    fs::write(root.join("b/d"), b"dddd")?;
    fs::write(root.join("e"), b"eeeee")?;
    Ok(root)
}
