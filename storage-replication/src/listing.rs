// SPDX-License-Identifier: GPL-3.0-only

//! Parser for `zfs list -t all -Hr -o name` output
//!
//! Each line is either a volume path (`tank/a/b`) or a snapshot
//! (`tank/a/b@name`). Volumes are listed before their own snapshots and
//! children, and snapshots appear oldest first.

use crate::error::{ReplicationError, Result};
use crate::volume::Volume;

const HEADER: &str = "NAME";

fn invalid(line: &str, reason: impl ToString) -> ReplicationError {
    ReplicationError::Listing {
        line: line.to_string(),
        reason: reason.to_string(),
    }
}

/// Build a volume tree rooted at an empty-named root.
pub fn parse(listing: &str) -> Result<Volume> {
    let mut root = Volume::root();

    for (index, line) in listing.lines().enumerate() {
        let line = line.trim_end();
        if line.is_empty() || (index == 0 && line == HEADER) {
            continue;
        }

        match line.split_once('@') {
            Some((path, snapshot)) => add_snapshot(&mut root, line, path, snapshot)?,
            None => add_volume(&mut root, line)?,
        }
    }

    Ok(root)
}

fn add_snapshot(root: &mut Volume, line: &str, path: &str, snapshot: &str) -> Result<()> {
    if snapshot.is_empty() {
        return Err(invalid(line, "empty snapshot name"));
    }

    let volume = root.get_mut(path).map_err(|e| invalid(line, e))?;
    volume.push_snapshot(snapshot);
    Ok(())
}

fn add_volume(root: &mut Volume, path: &str) -> Result<()> {
    let (parent, name) = match path.rsplit_once('/') {
        Some((parent, name)) => (root.get_mut(parent).map_err(|e| invalid(path, e))?, name),
        None => (root, path),
    };

    if name.is_empty() {
        return Err(invalid(path, "empty volume name"));
    }

    parent.insert_child(name);
    Ok(())
}
