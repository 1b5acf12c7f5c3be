// SPDX-License-Identifier: GPL-3.0-only

//! Recursive sync
//!
//! Volumes are processed one at a time and snapshots in order. A failure
//! aborts the whole sync; volumes synced before it stay synced.

use std::fmt;

use serde::Serialize;
use tracing::{debug, info};

use crate::config::Flags;
use crate::diff;
use crate::error::Result;
use crate::progress::ProgressSink;
use crate::retry::RetryPolicy;
use crate::transfer::{Endpoint, Transfer};
use crate::volume::Volume;
use crate::zfs::Zfs;

/// One snapshot sent from `source` to `destination`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferRecord {
    pub source: String,
    pub destination: String,
    pub previous: Option<String>,
    pub current: String,
}

impl fmt::Display for TransferRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.previous {
            Some(previous) => write!(
                f,
                "{}@{} -> {} (incremental from @{})",
                self.source, self.current, self.destination, previous
            ),
            None => write!(
                f,
                "{}@{} -> {} (full)",
                self.source, self.current, self.destination
            ),
        }
    }
}

impl From<&Transfer<'_>> for TransferRecord {
    fn from(transfer: &Transfer<'_>) -> Self {
        Self {
            source: transfer.source.volume.full_name().to_string(),
            destination: transfer.destination.volume.full_name().to_string(),
            previous: transfer.previous.map(ToString::to_string),
            current: transfer.current.to_string(),
        }
    }
}

/// What a sync did, or would do in dry-run mode
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// Destination volumes created, parents before children.
    pub created: Vec<String>,
    pub transfers: Vec<TransferRecord>,
}

/// Drives diff and transfer for a source and destination volume tree
pub struct Replicator<'a> {
    source: &'a Zfs,
    destination: &'a Zfs,
    flags: &'a Flags,
    retry: RetryPolicy,
    progress: Option<&'a dyn ProgressSink>,
    dry_run: bool,
}

impl<'a> Replicator<'a> {
    pub fn new(source: &'a Zfs, destination: &'a Zfs, flags: &'a Flags) -> Self {
        Self {
            source,
            destination,
            flags,
            retry: RetryPolicy::default(),
            progress: None,
            dry_run: false,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Sink used for transfers when `Flags::progress` is set.
    pub fn with_progress(mut self, progress: &'a dyn ProgressSink) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Only plan: no volume is created and no snapshot is sent.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Transfer the snapshots `to` is missing from `from`, then recurse into
    /// the children if the sync is recursive.
    pub fn sync(&self, from: &Volume, to: &mut Volume) -> Result<SyncReport> {
        let mut report = SyncReport::default();
        self.sync_volume(from, to, &mut report)?;
        Ok(report)
    }

    fn sync_volume(&self, from: &Volume, to: &mut Volume, report: &mut SyncReport) -> Result<()> {
        info!("Synchronize {} to {}", from.full_name(), to.full_name());

        if !from.snapshots().is_empty() {
            self.transfer_missing(from, to, report)?;
        }

        if self.flags.recursive {
            for child in from.children() {
                let exists = to.child(child.name()).is_some();
                let target = if exists || !self.dry_run {
                    to.create_if_missing(self.destination, child.name())?
                } else {
                    to.insert_child(child.name())
                };

                if !exists {
                    report.created.push(target.full_name().to_string());
                }

                self.sync_volume(child, target, report)?;
            }
        }

        Ok(())
    }

    fn transfer_missing(&self, from: &Volume, to: &Volume, report: &mut SyncReport) -> Result<()> {
        let plan = diff::diff(from, to)?;
        debug!(
            "{}: {} snapshots missing after {:?}",
            to.full_name(),
            plan.missing.len(),
            plan.previous
        );

        let mut previous = plan.previous;
        for current in plan.missing.iter().map(String::as_str) {
            let transfer = Transfer {
                source: Endpoint {
                    zfs: self.source,
                    volume: from,
                },
                destination: Endpoint {
                    zfs: self.destination,
                    volume: to,
                },
                previous,
                current,
                flags: self.flags,
            };

            if !self.dry_run {
                transfer.run_with_retry(&self.retry, self.progress)?;
            }

            report.transfers.push(TransferRecord::from(&transfer));
            previous = Some(current);
        }

        Ok(())
    }
}
