//! Filesystem walker
//!
//! Visits the given roots depth-first in name order and emits one job per
//! directory (carrying its classified children) and one per other entry.
//! The first job is a synthetic directory with an empty path whose entries
//! are the roots, matching the root tree of a snapshot built from the same
//! roots.
//!
//! Metadata is read level by level; there is no cross-sibling concurrency
//! here because local lstat calls are cheap compared to tree loads.

use crate::cancel::CancelToken;
use crate::config::FsWalkOptions;
use crate::error::{ConfigError, WalkError};
use crate::filter::Filter;
use crate::job::{ChildEntry, DirJob, EntryJob, FsJobs, Job, JobStream, Metadata, WalkResult};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

#[derive(Debug)]
struct Stop;

/// Walk `roots` in the order given
///
/// Returns the job stream and a receiver for the end-of-walk summary, which
/// is sent exactly once, after the job stream has closed. Must be called
/// within a Tokio runtime. Fails only if `options` does not validate.
///
/// Entries rejected by `filter` are skipped, and rejected directories are
/// not descended into. Entries whose lstat fails are always included and
/// carry the error. Symlinks are never followed.
pub fn walk_fs(
    roots: Vec<PathBuf>,
    filter: Arc<dyn Filter>,
    options: FsWalkOptions,
    cancel: CancelToken,
) -> Result<(FsJobs, oneshot::Receiver<WalkResult>), ConfigError> {
    options.validate()?;
    let (tx, rx) = mpsc::channel(options.channel_capacity);
    let (result_tx, result_rx) = oneshot::channel();

    tokio::spawn(async move {
        info!(roots = roots.len(), "Starting filesystem walk");

        let mut walk = FsWalk {
            filter,
            cancel,
            out: tx,
            result: WalkResult::default(),
        };
        let outcome = walk.run(roots).await;

        // Close the job sequence before publishing the result
        let FsWalk { out, mut result, .. } = walk;
        drop(out);

        match outcome {
            Ok(()) => info!(
                files = result.files,
                dirs = result.dirs,
                others = result.others,
                bytes = result.bytes,
                failed = result.first_error.is_some(),
                "Filesystem walk complete"
            ),
            Err(Stop) => {
                result.cancelled = true;
                debug!("Filesystem walk stopped early");
            }
        }
        let _ = result_tx.send(result);
    });

    Ok((JobStream::new(rx), result_rx))
}

/// An entry whose lstat has been attempted and which passed the filter
struct Classified {
    name: OsString,
    source: PathBuf,
    path: PathBuf,
    metadata: Result<Metadata, WalkError>,
}

impl Classified {
    fn child_entry(&self) -> ChildEntry {
        ChildEntry {
            name: self.name.clone(),
            metadata: self.metadata.as_ref().ok().cloned(),
        }
    }
}

struct FsWalk {
    filter: Arc<dyn Filter>,
    cancel: CancelToken,
    out: mpsc::Sender<Job>,
    result: WalkResult,
}

impl FsWalk {
    async fn run(&mut self, roots: Vec<PathBuf>) -> Result<(), Stop> {
        let mut top = Vec::with_capacity(roots.len());
        for source in roots {
            let name = root_name(&source);
            let path = PathBuf::from(&name);
            if let Some(classified) = self.classify(name, source, path).await? {
                top.push(classified);
            }
        }

        let entries = top.iter().map(Classified::child_entry).collect();
        self.emit(Job::Dir(DirJob {
            path: PathBuf::new(),
            source: PathBuf::new(),
            metadata: None,
            entries,
            error: None,
        }))
        .await?;

        // Explicit stack instead of recursion; children are pushed reversed
        // so they pop in name order
        let mut stack: Vec<Classified> = top.into_iter().rev().collect();
        while let Some(entry) = stack.pop() {
            let Classified {
                source,
                path,
                metadata,
                ..
            } = entry;

            let metadata = match metadata {
                Ok(metadata) => metadata,
                Err(error) => {
                    self.result.record_error(&error);
                    self.emit(Job::Entry(EntryJob {
                        path,
                        source,
                        metadata: None,
                        error: Some(error),
                    }))
                    .await?;
                    continue;
                }
            };
            self.result.record(&metadata);

            if !metadata.is_dir() {
                self.emit(Job::Entry(EntryJob {
                    path,
                    source,
                    metadata: Some(metadata),
                    error: None,
                }))
                .await?;
                continue;
            }

            let (children, error) = self.list(&source, &path).await?;
            if let Some(error) = &error {
                self.result.record_error(error);
            }
            let entries = children.iter().map(Classified::child_entry).collect();
            self.emit(Job::Dir(DirJob {
                path,
                source,
                metadata: Some(metadata),
                entries,
                error,
            }))
            .await?;

            stack.extend(children.into_iter().rev());
        }
        Ok(())
    }

    /// Read, sort and classify the immediate children of a directory
    async fn list(
        &self,
        source: &Path,
        path: &Path,
    ) -> Result<(Vec<Classified>, Option<WalkError>), Stop> {
        let names = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(Stop),
            names = read_dir_names(source) => names,
        };

        let mut names = match names {
            Ok(names) => names,
            Err(e) => {
                warn!(path = %source.display(), error = %e, "Failed to list directory");
                return Ok((Vec::new(), Some(WalkError::metadata(source, e))));
            }
        };
        names.sort();

        let mut children = Vec::with_capacity(names.len());
        for name in names {
            let child_source = source.join(&name);
            let child_path = path.join(&name);
            if let Some(classified) = self.classify(name, child_source, child_path).await? {
                children.push(classified);
            }
        }
        Ok((children, None))
    }

    /// lstat one entry and apply the filter; `None` means excluded
    async fn classify(
        &self,
        name: OsString,
        source: PathBuf,
        path: PathBuf,
    ) -> Result<Option<Classified>, Stop> {
        let stat = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(Stop),
            stat = tokio::fs::symlink_metadata(&source) => stat,
        };

        let metadata = match stat {
            Ok(stat) => {
                let metadata = Metadata::from(&stat);
                if !self.filter.include(&source, &metadata) {
                    debug!(path = %source.display(), "Excluded by filter");
                    return Ok(None);
                }
                Ok(metadata)
            }
            Err(e) => {
                warn!(path = %source.display(), error = %e, "Failed to stat entry");
                Err(WalkError::metadata(&source, e))
            }
        };

        Ok(Some(Classified {
            name,
            source,
            path,
            metadata,
        }))
    }

    async fn emit(&self, job: Job) -> Result<(), Stop> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Stop),
            sent = self.out.send(job) => sent.map_err(|_| Stop),
        }
    }
}

async fn read_dir_names(dir: &Path) -> std::io::Result<Vec<OsString>> {
    let mut read_dir = tokio::fs::read_dir(dir).await?;
    let mut names = Vec::new();
    while let Some(entry) = read_dir.next_entry().await? {
        names.push(entry.file_name());
    }
    Ok(names)
}

/// Name a root is known by in logical paths: its last component
///
/// Paths without one (`/`, `..`) keep their full spelling.
pub(crate) fn root_name(root: &Path) -> OsString {
    root.file_name()
        .map(OsString::from)
        .unwrap_or_else(|| root.as_os_str().to_owned())
}
