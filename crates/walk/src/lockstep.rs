//! Positional correlation of the two job streams
//!
//! Both walkers emit in the same order when they describe the same set of
//! paths, so a consumer can pair jobs by position. Nothing enforces that
//! precondition: the filesystem may have changed since the snapshot was
//! taken, or a subtree may have failed to load. `Lockstep` checks every
//! pair, and after the first disagreement reports the streams as
//! unsynchronized for good. From then on a consumer must match entries by
//! name instead of by position.

use crate::job::{FsJobs, Job, TreeJob, TreeJobs};
use std::path::PathBuf;

/// Which stream a report refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Filesystem,
    Tree,
}

/// Outcome of comparing one pair of jobs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Alignment {
    /// Same path and entry count
    Aligned { path: PathBuf, entries: usize },
    /// Both streams have ended
    BothClosed,
    /// One stream ended while the other still had a job
    ClosedEarly { closed: Side, pending: PathBuf },
    PathMismatch { fs: PathBuf, tree: PathBuf },
    CountMismatch { path: PathBuf, fs: usize, tree: usize },
    /// One side reported an error, so the subtree is unknown on that side
    Failed { path: PathBuf, side: Side },
}

impl Alignment {
    pub fn is_aligned(&self) -> bool {
        matches!(self, Alignment::Aligned { .. } | Alignment::BothClosed)
    }
}

/// Pairwise checker for the ordering contract
#[derive(Debug, Clone)]
pub struct Lockstep {
    synchronized: bool,
    pairs: u64,
}

impl Default for Lockstep {
    fn default() -> Self {
        Self::new()
    }
}

impl Lockstep {
    pub fn new() -> Self {
        Self {
            synchronized: true,
            pairs: 0,
        }
    }

    /// False once any pair has failed to line up
    pub fn synchronized(&self) -> bool {
        self.synchronized
    }

    /// Number of pairs checked, not counting the final close
    pub fn pairs(&self) -> u64 {
        self.pairs
    }

    /// Compare the next job from each stream; `None` means that stream closed
    pub fn check(&mut self, fs: Option<&Job>, tree: Option<&TreeJob>) -> Alignment {
        let alignment = match (fs, tree) {
            (None, None) => return Alignment::BothClosed,
            (None, Some(tree)) => Alignment::ClosedEarly {
                closed: Side::Filesystem,
                pending: tree.path.clone(),
            },
            (Some(fs), None) => Alignment::ClosedEarly {
                closed: Side::Tree,
                pending: fs.path().to_path_buf(),
            },
            (Some(fs), Some(tree)) => compare(fs, tree),
        };

        self.pairs += 1;
        if !alignment.is_aligned() {
            self.synchronized = false;
        }
        alignment
    }

    /// Drain both streams, pairing jobs by position
    pub async fn zip(mut fs_jobs: FsJobs, mut tree_jobs: TreeJobs) -> LockstepReport {
        let mut lockstep = Lockstep::new();
        let mut mismatches = Vec::new();

        loop {
            let (fs, tree) = tokio::join!(fs_jobs.recv(), tree_jobs.recv());
            match lockstep.check(fs.as_ref(), tree.as_ref()) {
                Alignment::BothClosed => break,
                Alignment::Aligned { .. } => {}
                mismatch => mismatches.push(mismatch),
            }
        }

        LockstepReport {
            pairs: lockstep.pairs(),
            synchronized: lockstep.synchronized(),
            mismatches,
        }
    }
}

fn compare(fs: &Job, tree: &TreeJob) -> Alignment {
    if fs.error().is_some() {
        return Alignment::Failed {
            path: fs.path().to_path_buf(),
            side: Side::Filesystem,
        };
    }
    if tree.error.is_some() {
        return Alignment::Failed {
            path: tree.path.clone(),
            side: Side::Tree,
        };
    }
    if fs.path() != tree.path {
        return Alignment::PathMismatch {
            fs: fs.path().to_path_buf(),
            tree: tree.path.clone(),
        };
    }

    let (fs_count, tree_count) = (fs.entry_count(), tree.entry_count());
    if fs.is_dir() != tree.is_dir() || fs_count != tree_count {
        return Alignment::CountMismatch {
            path: tree.path.clone(),
            fs: fs_count,
            tree: tree_count,
        };
    }

    Alignment::Aligned {
        path: tree.path.clone(),
        entries: tree_count,
    }
}

/// Summary of a [`Lockstep::zip`] run
#[derive(Debug, Clone)]
pub struct LockstepReport {
    pub pairs: u64,
    pub synchronized: bool,
    /// Every pair that did not line up, in stream order
    pub mismatches: Vec<Alignment>,
}
