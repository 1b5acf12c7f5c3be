// SPDX-License-Identifier: GPL-3.0-only

//! Command-line front end for storage-replication

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use storage_replication::{
    BarProgress, Flags, Location, ResolvedLocation, Replicator, Settings, SyncReport,
};
use tracing::{debug, info};

/// Synchronize ZFS snapshots from a source volume to a destination volume
#[derive(Parser)]
#[command(name = "storage-replicate")]
#[command(
    about = "Replicate ZFS snapshots between local or remote volumes",
    long_about = None,
    after_help = "Example: storage-replicate -r backup@remote.host:zpool/var zpool/backup/remote.host"
)]
struct Cli {
    /// Source volume, `[user@host:]path`
    source: String,
    /// Destination volume, `[user@host:]path`
    destination: String,
    /// Synchronize child volumes recursively
    #[arg(short, long)]
    recursive: bool,
    /// Show progress
    #[arg(short, long)]
    progress: bool,
    /// Roll the destination back to its most recent snapshot before receiving
    #[arg(short, long)]
    force: bool,
    /// Send encrypted streams as raw
    #[arg(short = 'w', long)]
    raw: bool,
    /// Compression option for SSH (yes/no)
    #[arg(short, long, value_name = "VALUE")]
    compression: Option<String>,
    /// Settings file (TOML)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
    /// Print the planned transfers without running them
    #[arg(long)]
    dry_run: bool,
    /// Print the sync report as JSON
    #[arg(long)]
    json: bool,
}

impl Cli {
    fn flags(&self) -> Flags {
        Flags {
            recursive: self.recursive,
            force: self.force,
            progress: self.progress,
            raw: self.raw,
            compression: self.compression.clone(),
        }
    }
}

fn resolve(
    role: &str,
    argument: &str,
    settings: &Settings,
    flags: &Flags,
) -> Result<ResolvedLocation> {
    let location: Location = argument
        .parse()
        .with_context(|| format!("invalid {role} '{argument}'"))?;

    if location.is_remote() {
        which::which(&settings.ssh_binary)
            .with_context(|| format!("{} not found in PATH", settings.ssh_binary))?;
    }

    location
        .resolve(settings, flags)
        .with_context(|| format!("invalid {role} '{argument}'"))
}

fn print_plan(report: &SyncReport) {
    for created in &report.created {
        println!("create {created}");
    }
    for transfer in &report.transfers {
        println!("send {transfer}");
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = match &cli.config {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };

    // Initialize tracing to stderr
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new(settings.log_level.as_directive())
            }),
        )
        .init();

    let flags = cli.flags();
    let source = resolve("source", &cli.source, &settings, &flags)?;
    let ResolvedLocation {
        zfs: destination_zfs,
        tree: mut destination_tree,
        path: destination_path,
    } = resolve("destination", &cli.destination, &settings, &flags)?;

    debug!("Source volumes:\n{}", source.tree);

    let progress = BarProgress;
    let mut replicator = Replicator::new(&source.zfs, &destination_zfs, &flags)
        .with_retry(settings.retry_policy())
        .dry_run(cli.dry_run);
    if flags.progress {
        replicator = replicator.with_progress(&progress);
    }

    let report = replicator.sync(
        source.volume()?,
        destination_tree.get_mut(&destination_path)?,
    )?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else if cli.dry_run {
        print_plan(&report);
    } else {
        info!(
            "Done: {} snapshots transferred, {} volumes created",
            report.transfers.len(),
            report.created.len()
        );
    }

    Ok(())
}
