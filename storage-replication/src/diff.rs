// SPDX-License-Identifier: GPL-3.0-only

use std::collections::HashSet;

use crate::error::{ReplicationError, Result};
use crate::volume::Volume;

/// Snapshots a destination is missing, and the base to send them from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotDiff<'a> {
    /// Most recent common snapshot; `None` means a full send.
    pub previous: Option<&'a str>,
    /// Source snapshots after `previous`, oldest first.
    pub missing: &'a [String],
}

/// Compare two snapshot lists, both oldest first.
///
/// The common base is the last source snapshot, in source order, whose name
/// also exists on the destination. Returns `None` when the destination has
/// snapshots but shares none with the source.
pub fn diff_snapshots<'a>(source: &'a [String], destination: &[String]) -> Option<SnapshotDiff<'a>> {
    if destination.is_empty() || source.is_empty() {
        return Some(SnapshotDiff {
            previous: None,
            missing: source,
        });
    }

    let present: HashSet<&str> = destination.iter().map(String::as_str).collect();
    let common = source
        .iter()
        .rposition(|snapshot| present.contains(snapshot.as_str()))?;

    Some(SnapshotDiff {
        previous: Some(source[common].as_str()),
        missing: &source[common + 1..],
    })
}

/// [`diff_snapshots`] for two volumes, failing without a common snapshot.
pub fn diff<'a>(source: &'a Volume, destination: &Volume) -> Result<SnapshotDiff<'a>> {
    diff_snapshots(source.snapshots(), destination.snapshots()).ok_or_else(|| {
        ReplicationError::NoCommonSnapshot {
            from: source.full_name().to_string(),
            to: destination.full_name().to_string(),
        }
    })
}
