// SPDX-License-Identifier: GPL-3.0-only

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use tracing::debug;

use crate::config::{Flags, Settings};
use crate::error::{ReplicationError, Result};
use crate::exec::{CommandRunner, LocalRunner, RemoteRunner};
use crate::volume::Volume;
use crate::zfs::Zfs;

/// A volume on this host or on a host reached over SSH
///
/// Written as `[user@host:]path`. A colon before the first `/` marks a remote
/// location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    /// `[user@]host` for remote locations.
    pub remote: Option<String>,
    pub path: String,
}

impl FromStr for Location {
    type Err = ReplicationError;

    fn from_str(location: &str) -> Result<Self> {
        let slash = location.find('/').unwrap_or(location.len());

        let (remote, path) = match location.find(':') {
            Some(colon) if colon < slash => {
                let (target, path) = (&location[..colon], &location[colon + 1..]);
                if target.is_empty() {
                    return Err(ReplicationError::InvalidLocation(format!(
                        "missing host before ':' in '{location}'"
                    )));
                }
                (Some(target.to_string()), path)
            }
            _ => (None, location),
        };

        let path = path.trim_matches('/');
        if path.is_empty() {
            return Err(ReplicationError::InvalidLocation(format!(
                "missing volume path in '{location}'"
            )));
        }

        Ok(Self {
            remote,
            path: path.to_string(),
        })
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.remote {
            Some(remote) => write!(f, "{}:{}", remote, self.path),
            None => f.write_str(&self.path),
        }
    }
}

/// A location's ZFS instance with its listed volume tree
#[derive(Debug)]
pub struct ResolvedLocation {
    pub zfs: Zfs,
    /// Root of the whole listing.
    pub tree: Volume,
    /// Path of the located volume inside `tree`.
    pub path: String,
}

impl ResolvedLocation {
    pub fn volume(&self) -> Result<&Volume> {
        self.tree.get(&self.path)
    }

    pub fn volume_mut(&mut self) -> Result<&mut Volume> {
        self.tree.get_mut(&self.path)
    }
}

impl Location {
    pub fn is_remote(&self) -> bool {
        self.remote.is_some()
    }

    /// Runner executing commands where this location lives.
    pub fn runner(&self, settings: &Settings, flags: &Flags) -> Arc<dyn CommandRunner> {
        match &self.remote {
            Some(target) => Arc::new(
                RemoteRunner::new(&settings.ssh_binary, target)
                    .with_compression(flags.compression.clone()),
            ),
            None => Arc::new(LocalRunner),
        }
    }

    pub fn zfs(&self, settings: &Settings, flags: &Flags) -> Zfs {
        Zfs::new(self.runner(settings, flags), &settings.zfs_binary)
    }

    /// List the endpoint and check that the volume exists.
    pub fn resolve(&self, settings: &Settings, flags: &Flags) -> Result<ResolvedLocation> {
        Self::resolve_with(self.zfs(settings, flags), &self.path)
    }

    fn resolve_with(zfs: Zfs, path: &str) -> Result<ResolvedLocation> {
        let tree = zfs.list()?;
        tree.get(path)?;
        debug!("Resolved {}", path);

        Ok(ResolvedLocation {
            zfs,
            tree,
            path: path.to_string(),
        })
    }
}
