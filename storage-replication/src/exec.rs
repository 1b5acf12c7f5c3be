// SPDX-License-Identifier: GPL-3.0-only

//! Command runner capability
//!
//! Everything above this module talks to external programs through
//! [`CommandRunner`] and [`Process`], so the same replication code drives a
//! local pool or one reached over SSH without knowing which.

pub mod local;
pub mod remote;

#[cfg(test)]
pub(crate) mod testing;

use std::io::{self, Read, Write};

use crate::error::{CommandError, ProcessError};

pub use local::{LocalProcess, LocalRunner};
pub use remote::RemoteRunner;

/// Standard streams of a process that are handed back to the caller.
///
/// Streams that are not piped are connected to the null device, stderr is
/// always captured.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Pipes {
    pub stdin: bool,
    pub stdout: bool,
}

impl Pipes {
    pub const STDIN: Self = Self {
        stdin: true,
        stdout: false,
    };
    pub const STDOUT: Self = Self {
        stdin: false,
        stdout: true,
    };
}

/// Handle to one external process
pub trait Process: Send {
    /// Full argument vector, program first.
    fn args(&self) -> &[String];

    /// Spawn the process with the requested pipes.
    fn start(&mut self, pipes: Pipes) -> io::Result<()>;

    /// Writer feeding the process' stdin, available once after `start`.
    fn take_stdin(&mut self) -> Option<Box<dyn Write + Send>>;

    /// Reader over the process' stdout, available once after `start`.
    fn take_stdout(&mut self) -> Option<Box<dyn Read + Send>>;

    /// Block until the process exits; non-zero exit is an error.
    fn wait(&mut self) -> Result<(), ProcessError>;

    /// Everything the process wrote to stderr, complete after `wait`.
    fn stderr(&self) -> String;
}

/// Creates processes for a program and its arguments
pub trait CommandRunner: Send + Sync {
    fn command(&self, program: &str, args: &[String]) -> Box<dyn Process>;
}

/// Render an argument vector for logs.
pub fn render(args: &[String]) -> String {
    args.join(" ")
}

/// Attach the argument vector and captured stderr of `process` to `cause`.
pub fn failure(process: &dyn Process, cause: ProcessError) -> CommandError {
    CommandError {
        args: process.args().to_vec(),
        cause,
        stderr: process.stderr(),
    }
}

/// Run a process to completion and collect its stdout.
pub fn output(mut process: Box<dyn Process>) -> Result<Vec<u8>, CommandError> {
    process
        .start(Pipes::STDOUT)
        .map_err(|e| failure(process.as_ref(), ProcessError::Spawn(e)))?;

    let mut stdout = Vec::new();
    let read = match process.take_stdout() {
        Some(mut reader) => reader.read_to_end(&mut stdout).map(|_| ()),
        None => Ok(()),
    };

    process
        .wait()
        .map_err(|cause| failure(process.as_ref(), cause))?;
    read.map_err(|e| failure(process.as_ref(), ProcessError::Io(e)))?;

    Ok(stdout)
}
