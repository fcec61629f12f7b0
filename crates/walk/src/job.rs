//! Jobs emitted by the two walkers
//!
//! Both walkers emit in depth-first pre-order by name. A consumer that pulls
//! one job from each stream at a time sees the same path, and the same entry
//! count at every directory, as long as both sides describe the same tree.

use crate::error::WalkError;
use futures::Stream;
use snapwalk_core::{Node, NodeKind, Tree};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::SystemTime;
use tokio::sync::mpsc;

/// One step of the snapshot tree walk
#[derive(Debug, Clone)]
pub struct TreeJob {
    /// Logical path: the walk prefix joined with ancestor names
    pub path: PathBuf,
    /// Entry in the parent tree, absent for the root job
    pub node: Option<Node>,
    /// Loaded tree, present only for directories that loaded
    pub tree: Option<Tree>,
    /// Load failure; descendants of this job are not emitted
    pub error: Option<WalkError>,
}

impl TreeJob {
    /// True for the root job and for directory nodes, loaded or not
    pub fn is_dir(&self) -> bool {
        match &self.node {
            Some(node) => node.is_dir(),
            None => true,
        }
    }

    /// Node count of a loaded directory, otherwise 1
    pub fn entry_count(&self) -> usize {
        match &self.tree {
            Some(tree) => tree.len(),
            None => 1,
        }
    }
}

/// Metadata of a filesystem entry, as read by lstat
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metadata {
    pub kind: NodeKind,
    pub size: u64,
    pub mode: u32,
    pub mtime: Option<SystemTime>,
}

impl Metadata {
    pub fn is_dir(&self) -> bool {
        self.kind == NodeKind::Dir
    }
}

impl From<&std::fs::Metadata> for Metadata {
    fn from(metadata: &std::fs::Metadata) -> Self {
        let node = Node::from_metadata("", metadata, None);
        Self {
            kind: node.kind,
            size: node.size,
            mode: node.mode,
            mtime: node.mtime,
        }
    }
}

/// An immediate child of a directory, already classified
#[derive(Debug, Clone)]
pub struct ChildEntry {
    pub name: OsString,
    /// Absent when lstat failed; the child's own job carries the error
    pub metadata: Option<Metadata>,
}

/// Directory job: emitted before any of its children
#[derive(Debug, Clone)]
pub struct DirJob {
    pub path: PathBuf,
    /// Location on disk; empty for the synthetic top-level job
    pub source: PathBuf,
    pub metadata: Option<Metadata>,
    /// Included children in name order
    pub entries: Vec<ChildEntry>,
    pub error: Option<WalkError>,
}

/// Non-directory job
#[derive(Debug, Clone)]
pub struct EntryJob {
    pub path: PathBuf,
    pub source: PathBuf,
    pub metadata: Option<Metadata>,
    pub error: Option<WalkError>,
}

/// One step of the filesystem walk
#[derive(Debug, Clone)]
pub enum Job {
    Dir(DirJob),
    Entry(EntryJob),
}

impl Job {
    pub fn path(&self) -> &Path {
        match self {
            Job::Dir(dir) => &dir.path,
            Job::Entry(entry) => &entry.path,
        }
    }

    pub fn source(&self) -> &Path {
        match self {
            Job::Dir(dir) => &dir.source,
            Job::Entry(entry) => &entry.source,
        }
    }

    pub fn error(&self) -> Option<&WalkError> {
        match self {
            Job::Dir(dir) => dir.error.as_ref(),
            Job::Entry(entry) => entry.error.as_ref(),
        }
    }

    pub fn metadata(&self) -> Option<&Metadata> {
        match self {
            Job::Dir(dir) => dir.metadata.as_ref(),
            Job::Entry(entry) => entry.metadata.as_ref(),
        }
    }

    pub fn is_dir(&self) -> bool {
        matches!(self, Job::Dir(_))
    }

    /// Number of included children for directories, otherwise 1
    pub fn entry_count(&self) -> usize {
        match self {
            Job::Dir(dir) => dir.entries.len(),
            Job::Entry(_) => 1,
        }
    }
}

/// End-of-walk summary of the filesystem walker
#[derive(Debug, Clone, Default)]
pub struct WalkResult {
    pub files: u64,
    pub dirs: u64,
    /// Symlinks and special files
    pub others: u64,
    /// Sum of regular file sizes
    pub bytes: u64,
    pub first_error: Option<WalkError>,
    /// Set when the walk stopped early because the token fired
    pub cancelled: bool,
}

impl WalkResult {
    pub(crate) fn record(&mut self, metadata: &Metadata) {
        match metadata.kind {
            NodeKind::Dir => self.dirs += 1,
            NodeKind::File => {
                self.files += 1;
                self.bytes += metadata.size;
            }
            NodeKind::Symlink | NodeKind::Other => self.others += 1,
        }
    }

    pub(crate) fn record_error(&mut self, error: &WalkError) {
        if self.first_error.is_none() {
            self.first_error = Some(error.clone());
        }
    }

    /// Collapse into an outcome: cancellation first, then the first error
    ///
    /// Per-path errors were already delivered with their jobs; this is for
    /// callers that only need to know whether the walk was complete.
    pub fn status(&self) -> Result<(), WalkError> {
        if self.cancelled {
            return Err(WalkError::Cancelled);
        }
        match &self.first_error {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

/// Lazy, single-pass sequence of jobs backed by a bounded channel
///
/// Dropping the sequence stops the producer.
#[derive(Debug)]
pub struct JobStream<T> {
    rx: mpsc::Receiver<T>,
}

impl<T> JobStream<T> {
    pub(crate) fn new(rx: mpsc::Receiver<T>) -> Self {
        Self { rx }
    }

    /// Next job, or `None` once the walker has closed the sequence
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    /// Drain every remaining job
    pub async fn collect_all(mut self) -> Vec<T> {
        let mut jobs = Vec::new();
        while let Some(job) = self.rx.recv().await {
            jobs.push(job);
        }
        jobs
    }
}

impl<T> Stream for JobStream<T> {
    type Item = T;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        self.rx.poll_recv(cx)
    }
}

/// Output of the snapshot tree walker
pub type TreeJobs = JobStream<TreeJob>;

/// Output of the filesystem walker
pub type FsJobs = JobStream<Job>;
