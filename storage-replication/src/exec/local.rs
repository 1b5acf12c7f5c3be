// SPDX-License-Identifier: GPL-3.0-only

use std::io::{self, Read, Write};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};

use tracing::debug;

use super::{CommandRunner, Pipes, Process};
use crate::error::ProcessError;

/// Runs programs on this host
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalRunner;

impl CommandRunner for LocalRunner {
    fn command(&self, program: &str, args: &[String]) -> Box<dyn Process> {
        let mut argv = Vec::with_capacity(args.len() + 1);
        argv.push(program.to_string());
        argv.extend(args.iter().cloned());
        Box::new(LocalProcess::new(argv))
    }
}

/// A child process of this program
///
/// Stderr is drained by a helper thread from the moment the process starts so
/// a chatty child can never block on a full stderr pipe.
#[derive(Debug)]
pub struct LocalProcess {
    args: Vec<String>,
    child: Option<Child>,
    stderr_reader: Option<JoinHandle<Vec<u8>>>,
    stderr: Vec<u8>,
}

impl LocalProcess {
    /// `args[0]` is the program.
    pub fn new(args: Vec<String>) -> Self {
        Self {
            args,
            child: None,
            stderr_reader: None,
            stderr: Vec::new(),
        }
    }
}

fn stdio(piped: bool) -> Stdio {
    if piped { Stdio::piped() } else { Stdio::null() }
}

/// Read `reader` to the end, keeping what was read before a failure.
fn drain(mut reader: impl Read) -> Vec<u8> {
    let mut collected = Vec::new();
    if let Err(e) = reader.read_to_end(&mut collected) {
        debug!("Failed to read stderr: {}", e);
    }
    collected
}

fn exit_result(status: ExitStatus) -> Result<(), ProcessError> {
    if status.success() {
        return Ok(());
    }

    match status.code() {
        Some(code) => Err(ProcessError::Exit(code)),
        None => Err(ProcessError::Signal),
    }
}

impl Process for LocalProcess {
    fn args(&self) -> &[String] {
        &self.args
    }

    fn start(&mut self, pipes: Pipes) -> io::Result<()> {
        let (program, args) = self
            .args
            .split_first()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "empty command"))?;

        let mut child = Command::new(program)
            .args(args)
            .stdin(stdio(pipes.stdin))
            .stdout(stdio(pipes.stdout))
            .stderr(Stdio::piped())
            .spawn()?;

        debug!("Started {} (pid {})", program, child.id());

        if let Some(stderr) = child.stderr.take() {
            self.stderr_reader = Some(thread::spawn(move || drain(stderr)));
        }

        self.child = Some(child);
        Ok(())
    }

    fn take_stdin(&mut self) -> Option<Box<dyn Write + Send>> {
        let stdin = self.child.as_mut()?.stdin.take()?;
        Some(Box::new(stdin))
    }

    fn take_stdout(&mut self) -> Option<Box<dyn Read + Send>> {
        let stdout = self.child.as_mut()?.stdout.take()?;
        Some(Box::new(stdout))
    }

    fn wait(&mut self) -> Result<(), ProcessError> {
        let child = self.child.as_mut().ok_or_else(|| {
            ProcessError::Wait(io::Error::new(
                io::ErrorKind::NotConnected,
                "process was not started",
            ))
        })?;

        let status = child.wait().map_err(ProcessError::Wait)?;

        if let Some(reader) = self.stderr_reader.take()
            && let Ok(collected) = reader.join()
        {
            self.stderr = collected;
        }

        exit_result(status)
    }

    fn stderr(&self) -> String {
        String::from_utf8_lossy(&self.stderr).to_string()
    }
}
