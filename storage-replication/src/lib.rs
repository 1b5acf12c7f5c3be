// SPDX-License-Identifier: GPL-3.0-only

//! Snapshot replication engine for hierarchical ZFS datasets
//!
//! Replicates volumes and their ordered snapshots from a source endpoint to a
//! destination endpoint, either of which may be local or reached over SSH.
//! Only the snapshots missing on the destination are sent, incrementally from
//! the most recent common snapshot, and missing child volumes are created on
//! the way down when syncing recursively.

pub mod config;
pub mod diff;
pub mod error;
pub mod exec;
pub mod listing;
pub mod location;
pub mod progress;
pub mod retry;
pub mod sync;
pub mod transfer;
pub mod volume;
pub mod zfs;

// Re-export commonly used types
pub use config::{Flags, LoggingLevel, Settings};
pub use diff::SnapshotDiff;
pub use error::{CommandError, ProcessError, ReplicationError, Result};
pub use exec::{CommandRunner, Process};
pub use location::{Location, ResolvedLocation};
pub use progress::{BarProgress, ProgressSink};
pub use retry::RetryPolicy;
pub use sync::{Replicator, SyncReport, TransferRecord};
pub use transfer::{Endpoint, Transfer};
pub use volume::Volume;
pub use zfs::Zfs;
