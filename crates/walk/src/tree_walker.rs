//! Snapshot tree walker
//!
//! Re-emits a stored tree in depth-first pre-order while loading sibling
//! subtrees concurrently.
//!
//! # Architecture
//!
//! ```text
//!                 ┌──────────────────────────────┐
//!                 │  dir task: load tree, emit   │──► out (parent or consumer)
//!                 └──────────────┬───────────────┘
//!                                │ prefetch up to K subtrees
//!        ┌───────────────────────┼───────────────────────┐
//!  ┌─────▼─────┐           ┌─────▼─────┐           ┌─────▼─────┐
//!  │ subtree 1 │           │ subtree 2 │    ...    │ subtree K │
//!  │ own chan  │           │ own chan  │           │ own chan  │
//!  └───────────┘           └───────────┘           └───────────┘
//!        drained in node order; later channels fill up meanwhile
//! ```
//!
//! Every prefetched subtree runs in its own task and writes into its own
//! bounded channel. The parent forwards those channels strictly in node
//! order, so a slow early sibling delays emission of later siblings but not
//! their loads. Loads across the whole walk share one semaphore.
//!
//! Run-ahead is bounded for the whole walk, not per directory: a subtree
//! task holds a prefetch permit from the moment it is spawned until its
//! parent starts forwarding it. When no permit is free the child is left
//! unscheduled and walked inline once the drain reaches it, so the drain
//! never waits for a permit. With a stalled consumer, at most
//! `max_prefetched_subtrees` trees are loaded beyond those already on the
//! path to the emission point and in the channel buffers.

use crate::cancel::CancelToken;
use crate::config::TreeWalkOptions;
use crate::error::{ConfigError, WalkError};
use crate::job::{JobStream, TreeJob, TreeJobs};
use futures::future::{BoxFuture, FutureExt};
use snapwalk_core::{Id, Node, Tree, TreeLoader};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// The walk stopped before finishing: cancelled, or the receiver went away
#[derive(Debug)]
struct Stop;

/// Walk the tree stored under `root`
///
/// Returns immediately; jobs are produced by background tasks and must be
/// pulled from the returned stream. Must be called within a Tokio runtime.
/// Fails only if `options` does not validate.
///
/// A failure to load `root` is reported as the only job. Dropping the
/// stream or firing `cancel` stops the walk and releases every task.
pub fn walk_tree<L>(
    loader: Arc<L>,
    root: Id,
    options: TreeWalkOptions,
    cancel: CancelToken,
) -> Result<TreeJobs, ConfigError>
where
    L: TreeLoader + ?Sized + 'static,
{
    options.validate()?;
    let (tx, rx) = mpsc::channel(options.channel_capacity);
    let walk = Arc::new(TreeWalk {
        loader,
        loads: Semaphore::new(options.max_concurrent_loads),
        prefetched: Arc::new(Semaphore::new(options.max_prefetched_subtrees)),
        options,
        cancel,
    });

    tokio::spawn(async move {
        let prefix = walk.options.prefix.clone();
        info!(
            root = %root.short(),
            prefetch_window = walk.options.prefetch_window,
            max_concurrent_loads = walk.options.max_concurrent_loads,
            max_prefetched_subtrees = walk.options.max_prefetched_subtrees,
            "Starting tree walk"
        );
        match walk.walk_dir(prefix, None, root, tx).await {
            Ok(()) => info!(root = %root.short(), "Tree walk complete"),
            Err(Stop) => debug!(root = %root.short(), "Tree walk stopped early"),
        }
    });

    Ok(JobStream::new(rx))
}

struct TreeWalk<L: ?Sized> {
    loader: Arc<L>,
    loads: Semaphore,
    /// Live subtree tasks that nothing is forwarding yet
    prefetched: Arc<Semaphore>,
    options: TreeWalkOptions,
    cancel: CancelToken,
}

/// A subtree walking ahead in its own task
struct Prefetch {
    rx: mpsc::Receiver<TreeJob>,
    handle: JoinHandle<Result<(), Stop>>,
    /// Held until the parent starts forwarding
    permit: Option<OwnedSemaphorePermit>,
}

impl Drop for Prefetch {
    fn drop(&mut self) {
        // No-op for finished subtrees; stops abandoned ones
        self.handle.abort();
    }
}

enum Slot {
    Leaf(PathBuf, Node),
    Subtree(Prefetch),
    /// Directory left for the drain to walk inline
    Deferred(PathBuf, Node, Id),
}

/// Children of one loaded directory, scheduled in node order
struct Children {
    path: PathBuf,
    nodes: std::vec::IntoIter<Node>,
    pending: VecDeque<Slot>,
    in_flight: usize,
}

impl<L> TreeWalk<L>
where
    L: TreeLoader + ?Sized + 'static,
{
    /// Load one directory, emit its job, then its descendants
    async fn walk_dir(
        self: Arc<Self>,
        path: PathBuf,
        node: Option<Node>,
        id: Id,
        out: mpsc::Sender<TreeJob>,
    ) -> Result<(), Stop> {
        let tree = match self.load(&path, id).await? {
            Ok(tree) => tree,
            Err(error) => {
                let job = TreeJob {
                    path,
                    node,
                    tree: None,
                    error: Some(error),
                };
                return self.emit(&out, job).await;
            }
        };

        // Start the first subtree loads before handing the tree over
        let mut children = Children {
            path: path.clone(),
            nodes: tree.nodes().to_vec().into_iter(),
            pending: VecDeque::new(),
            in_flight: 0,
        };
        self.schedule(&mut children);

        let job = TreeJob {
            path,
            node,
            tree: Some(tree),
            error: None,
        };
        self.emit(&out, job).await?;
        self.drain(children, &out).await
    }

    fn walk_dir_boxed(
        self: Arc<Self>,
        path: PathBuf,
        node: Node,
        id: Id,
        out: mpsc::Sender<TreeJob>,
    ) -> BoxFuture<'static, Result<(), Stop>> {
        self.walk_dir(path, Some(node), id, out).boxed()
    }

    /// Queue children until the prefetch window is full or the walk runs
    /// out of prefetch permits
    fn schedule(self: &Arc<Self>, children: &mut Children) {
        while children.in_flight < self.options.prefetch_window {
            let Some(node) = children.nodes.next() else {
                break;
            };
            let path = children.path.join(&node.name);
            let id = match node.subtree {
                Some(id) if node.is_dir() => id,
                _ => {
                    children.pending.push_back(Slot::Leaf(path, node));
                    continue;
                }
            };

            match Arc::clone(&self.prefetched).try_acquire_owned() {
                Ok(permit) => {
                    debug!(path = %path.display(), tree = %id.short(), "Prefetching subtree");
                    children
                        .pending
                        .push_back(Slot::Subtree(self.prefetch(path, node, id, permit)));
                    children.in_flight += 1;
                }
                Err(_) => {
                    debug!(path = %path.display(), tree = %id.short(), "Prefetch limit reached");
                    children.pending.push_back(Slot::Deferred(path, node, id));
                    break;
                }
            }
        }
    }

    fn prefetch(self: &Arc<Self>, path: PathBuf, node: Node, id: Id, permit: OwnedSemaphorePermit) -> Prefetch {
        let (tx, rx) = mpsc::channel(self.options.subtree_buffer);
        let handle = tokio::spawn(Arc::clone(self).walk_dir_boxed(path, node, id, tx));
        Prefetch {
            rx,
            handle,
            permit: Some(permit),
        }
    }

    /// Emit children in node order, topping up the window as slots drain
    async fn drain(self: &Arc<Self>, mut children: Children, out: &mpsc::Sender<TreeJob>) -> Result<(), Stop> {
        while let Some(slot) = children.pending.pop_front() {
            match slot {
                Slot::Leaf(path, node) => {
                    let job = TreeJob {
                        path,
                        node: Some(node),
                        tree: None,
                        error: None,
                    };
                    self.emit(out, job).await?;
                }
                Slot::Subtree(mut prefetch) => {
                    // Forwarded subtrees are on the emission path; let
                    // another one run ahead in their place
                    drop(prefetch.permit.take());
                    children.in_flight -= 1;
                    self.schedule(&mut children);
                    self.forward(&mut prefetch, out).await?;
                }
                Slot::Deferred(path, node, id) => {
                    Arc::clone(self)
                        .walk_dir_boxed(path, node, id, out.clone())
                        .await?;
                }
            }
            self.schedule(&mut children);
        }
        Ok(())
    }

    /// Pass every job of a prefetched subtree through, then confirm it finished
    async fn forward(&self, prefetch: &mut Prefetch, out: &mpsc::Sender<TreeJob>) -> Result<(), Stop> {
        loop {
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(Stop),
                next = prefetch.rx.recv() => next,
            };
            match next {
                Some(job) => self.emit(out, job).await?,
                None => break,
            }
        }

        // A closed channel alone does not mean the subtree completed
        match (&mut prefetch.handle).await {
            Ok(result) => result,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(_) => Err(Stop),
        }
    }

    async fn load(&self, path: &Path, id: Id) -> Result<Result<Tree, WalkError>, Stop> {
        let _permit = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(Stop),
            permit = self.loads.acquire() => permit.map_err(|_| Stop)?,
        };

        let result = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(Stop),
            result = self.loader.load_tree(id) => result,
        };

        Ok(result.map_err(|source| {
            warn!(path = %path.display(), tree = %id.short(), error = %source, "Failed to load tree");
            WalkError::Load {
                path: path.to_path_buf(),
                source,
            }
        }))
    }

    async fn emit(&self, out: &mpsc::Sender<TreeJob>, job: TreeJob) -> Result<(), Stop> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Stop),
            sent = out.send(job) => sent.map_err(|_| Stop),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use snapwalk_core::{MemoryStore, TreeWriter};

    fn store_tree(store: &MemoryStore, nodes: Vec<Node>) -> Id {
        let mut tree = Tree::new();
        for node in nodes {
            tree.insert(node).unwrap();
        }
        store.save_tree(&tree).unwrap()
    }

    async fn paths(jobs: TreeJobs) -> Vec<String> {
        jobs.collect_all()
            .await
            .into_iter()
            .map(|job| job.path.to_string_lossy().into_owned())
            .collect()
    }

    #[tokio::test]
    async fn test_single_level() {
        let store = Arc::new(MemoryStore::new());
        let root = store_tree(&store, vec![Node::file("a", 1), Node::file("b", 2)]);

        let jobs = walk_tree(store, root, TreeWalkOptions::default(), CancelToken::new()).unwrap();
        assert_eq!(paths(jobs).await, vec!["", "a", "b"]);
    }

    #[tokio::test]
    async fn test_prefix_is_applied() {
        let store = Arc::new(MemoryStore::new());
        let sub = store_tree(&store, vec![Node::file("f", 1)]);
        let root = store_tree(&store, vec![Node::dir("d", sub)]);

        let options = TreeWalkOptions {
            prefix: PathBuf::from("snap"),
            ..Default::default()
        };
        let jobs = walk_tree(store, root, options, CancelToken::new()).unwrap();
        assert_eq!(paths(jobs).await, vec!["snap", "snap/d", "snap/d/f"]);
    }

    #[tokio::test]
    async fn test_window_of_one_still_walks_everything() {
        let store = Arc::new(MemoryStore::new());
        let mut nodes = Vec::new();
        for i in 0..5 {
            let sub = store_tree(&store, vec![Node::file(format!("f{}", i), 1)]);
            nodes.push(Node::dir(format!("d{}", i), sub));
        }
        let root = store_tree(&store, nodes);

        let options = TreeWalkOptions {
            prefetch_window: 1,
            max_concurrent_loads: 1,
            subtree_buffer: 1,
            channel_capacity: 1,
            ..Default::default()
        };
        let jobs = walk_tree(store, root, options, CancelToken::new()).unwrap();
        let got = paths(jobs).await;
        assert_eq!(got.len(), 11);
        assert_eq!(got[1..3], ["d0".to_string(), "d0/f0".to_string()]);
        assert_eq!(got[9..], ["d4".to_string(), "d4/f4".to_string()]);
    }

    #[tokio::test]
    async fn test_missing_root_is_sole_job() {
        let store = Arc::new(MemoryStore::new());
        let missing = snapwalk_core::hash_bytes(b"nothing");

        let jobs = walk_tree(store, missing, TreeWalkOptions::default(), CancelToken::new())
            .unwrap()
            .collect_all()
            .await;
        assert_eq!(jobs.len(), 1);
        assert!(jobs[0].tree.is_none());
        assert!(jobs[0].error.as_ref().unwrap().is_not_found());
    }

    #[tokio::test]
    async fn test_prefetch_limit_walks_the_rest_inline() {
        let store = Arc::new(MemoryStore::new());
        let mut nodes = Vec::new();
        for i in 0..4 {
            let inner = store_tree(&store, vec![Node::file("f", 1)]);
            let sub = store_tree(&store, vec![Node::dir(format!("e{}", i), inner)]);
            nodes.push(Node::dir(format!("d{}", i), sub));
        }
        let root = store_tree(&store, nodes);

        let options = TreeWalkOptions {
            max_prefetched_subtrees: 1,
            ..Default::default()
        };
        let jobs = walk_tree(store, root, options, CancelToken::new()).unwrap();
        let got = paths(jobs).await;
        assert_eq!(got.len(), 13);
        assert_eq!(got[1..4], ["d0".to_string(), "d0/e0".to_string(), "d0/e0/f".to_string()]);
        assert_eq!(got[10..], ["d3".to_string(), "d3/e3".to_string(), "d3/e3/f".to_string()]);
    }

    #[tokio::test]
    async fn test_invalid_options_are_rejected() {
        let store = Arc::new(MemoryStore::new());
        let root = store_tree(&store, Vec::new());
        let options = TreeWalkOptions {
            channel_capacity: 0,
            ..Default::default()
        };
        assert!(matches!(
            walk_tree(store, root, options, CancelToken::new()),
            Err(ConfigError::TooSmall {
                field: "tree.channel_capacity",
                ..
            })
        ));
    }
}
