// SPDX-License-Identifier: GPL-3.0-only

//! ZFS command construction
//!
//! Builds the `zfs list/create/send/recv` invocations for one endpoint and
//! runs them through that endpoint's [`CommandRunner`].

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::error::{ReplicationError, Result};
use crate::exec::{self, CommandRunner, LocalRunner, Process};
use crate::listing;
use crate::volume::Volume;

/// Wrapper for local or remote ZFS commands
#[derive(Clone)]
pub struct Zfs {
    runner: Arc<dyn CommandRunner>,
    binary: String,
}

impl fmt::Debug for Zfs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Zfs").field("binary", &self.binary).finish()
    }
}

fn args<const N: usize>(args: [&str; N]) -> Vec<String> {
    args.iter().map(ToString::to_string).collect()
}

impl Zfs {
    pub fn new(runner: Arc<dyn CommandRunner>, binary: impl Into<String>) -> Self {
        Self {
            runner,
            binary: binary.into(),
        }
    }

    /// ZFS on this host.
    pub fn local(binary: impl Into<String>) -> Self {
        Self::new(Arc::new(LocalRunner), binary)
    }

    fn command(&self, args: &[String]) -> Box<dyn Process> {
        self.runner.command(&self.binary, args)
    }

    /// List all volumes and snapshots as a tree.
    pub fn list(&self) -> Result<Volume> {
        let stdout = exec::output(self.command(&args(["list", "-t", "all", "-Hr", "-o", "name"])))?;
        let listing = String::from_utf8_lossy(&stdout);
        let root = listing::parse(&listing)?;

        debug!("Listed {} volumes", root.descendants());
        Ok(root)
    }

    /// Create a new volume by its full path.
    pub fn create(&self, path: &str) -> Result<()> {
        exec::output(self.command(&args(["create", path])))?;
        Ok(())
    }

    /// Build a `zfs recv` into `volume`, rolling it back first when `force`.
    pub fn recv(&self, volume: &str, force: bool) -> Box<dyn Process> {
        let mut args = vec!["recv".to_string()];
        if force {
            // -F must be passed before the volume
            args.push("-F".to_string());
        }
        args.push(volume.to_string());

        self.command(&args)
    }

    /// Build a `zfs send` of `volume@current`, incremental from `previous`.
    ///
    /// `dry_run` only estimates the stream size (`-nP`).
    pub fn send(
        &self,
        volume: &str,
        previous: Option<&str>,
        current: &str,
        raw: bool,
        dry_run: bool,
    ) -> Box<dyn Process> {
        let mut args = vec!["send".to_string()];

        if raw {
            args.push("-w".to_string());
        }

        if dry_run {
            args.push("-nP".to_string());
        }

        if let Some(previous) = previous {
            args.push("-i".to_string());
            args.push(format!("@{previous}"));
        }

        args.push(format!("{volume}@{current}"));

        self.command(&args)
    }

    /// Estimated size in bytes of the stream [`Zfs::send`] would produce.
    pub fn send_size(
        &self,
        volume: &str,
        previous: Option<&str>,
        current: &str,
        raw: bool,
    ) -> Result<u64> {
        let stdout = exec::output(self.send(volume, previous, current, raw, true))?;
        let size = parse_transfer_size(&String::from_utf8_lossy(&stdout))?;

        debug!("Stream size of {}@{}: {} bytes", volume, current, size);
        Ok(size)
    }
}

/// Extract the `size\t<bytes>` line of a dry-run send.
pub fn parse_transfer_size(output: &str) -> Result<u64> {
    let line = output
        .lines()
        .find_map(|line| line.strip_prefix("size\t"))
        .ok_or_else(|| ReplicationError::SizeParse("no size line in output".to_string()))?;

    line.trim()
        .parse::<u64>()
        .map_err(|e| ReplicationError::SizeParse(format!("'{}': {}", line.trim(), e)))
}
