//! Snapwalk walk - the traversal core of the backup engine
//!
//! Two walkers produce job sequences in the same depth-first, name-ordered
//! pre-order:
//! - [`walk_tree`] re-emits a stored snapshot, loading sibling subtrees
//!   concurrently while keeping emission order
//! - [`walk_fs`] visits live filesystem roots and classifies every entry
//!
//! Because the orders agree, an archiver can pull one job from each side
//! and compare them positionally; [`Lockstep`] checks that this still holds.
//! Both walkers observe the same [`CancelToken`].

pub mod cancel;
pub mod config;
pub mod error;
pub mod filter;
pub mod fs_walker;
pub mod job;
pub mod lockstep;
pub mod snapshot;
pub mod tree_walker;

pub use cancel::CancelToken;
pub use config::{FsWalkOptions, TreeWalkOptions, WalkConfig};
pub use error::{ConfigError, WalkError};
pub use filter::{Filter, IgnoreFilter, IncludeAll};
pub use fs_walker::walk_fs;
pub use job::{ChildEntry, DirJob, EntryJob, FsJobs, Job, JobStream, Metadata, TreeJob, TreeJobs, WalkResult};
pub use lockstep::{Alignment, Lockstep, LockstepReport, Side};
pub use snapshot::snapshot_paths;
pub use tree_walker::walk_tree;
