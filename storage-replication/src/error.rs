// SPDX-License-Identifier: GPL-3.0-only

use std::io;

use thiserror::Error;

/// Text the receiving side prints when another operation holds the dataset.
pub const BUSY_MARKER: &str = "dataset is busy";

/// Why an external process did not complete successfully
#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("spawn error: {0}")]
    Spawn(io::Error),

    #[error("wait error: {0}")]
    Wait(io::Error),

    #[error("I/O error: {0}")]
    Io(io::Error),

    #[error("exit status {0}")]
    Exit(i32),

    #[error("terminated by signal")]
    Signal,
}

/// A failed external command together with the stderr it produced
#[derive(Error, Debug)]
#[error("{} failed with {cause}: {}", .args.join(" "), .stderr.trim_end())]
pub struct CommandError {
    pub args: Vec<String>,
    pub cause: ProcessError,
    pub stderr: String,
}

impl CommandError {
    /// Whether the failure is the transient "dataset is busy" condition.
    pub fn is_busy(&self) -> bool {
        self.stderr.contains(BUSY_MARKER) || self.cause.to_string().contains(BUSY_MARKER)
    }
}

/// Error types for replication operations
#[derive(Error, Debug)]
pub enum ReplicationError {
    #[error("unable to find {segment}")]
    NotFound { segment: String },

    #[error("unable to find {segment} in {within}")]
    NotFoundWithin { segment: String, within: String },

    #[error("invalid listing line '{line}': {reason}")]
    Listing { line: String, reason: String },

    #[error("{from} and {to} don't have a common snapshot")]
    NoCommonSnapshot { from: String, to: String },

    #[error(transparent)]
    Command(#[from] CommandError),

    #[error("transfer failed: {0}")]
    Transfer(io::Error),

    #[error("unable to extract snapshot size: {0}")]
    SizeParse(String),

    #[error("invalid location: {0}")]
    InvalidLocation(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl ReplicationError {
    /// Lookup failure for `segment`, searched within the volume named `within`.
    pub fn not_found(segment: &str, within: &str) -> Self {
        if within.is_empty() {
            Self::NotFound {
                segment: segment.to_string(),
            }
        } else {
            Self::NotFoundWithin {
                segment: segment.to_string(),
                within: within.to_string(),
            }
        }
    }

    /// Whether retrying may succeed because the destination was only locked.
    pub fn is_busy(&self) -> bool {
        match self {
            Self::Command(error) => error.is_busy(),
            other => other.to_string().contains(BUSY_MARKER),
        }
    }
}

/// Result type alias for replication operations
pub type Result<T> = std::result::Result<T, ReplicationError>;
