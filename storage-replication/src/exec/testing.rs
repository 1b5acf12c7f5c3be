// SPDX-License-Identifier: GPL-3.0-only

//! Scripted in-memory runner for unit tests

use std::io::{self, Cursor, Read, Write};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};

use super::{CommandRunner, Pipes, Process, render};
use crate::error::ProcessError;

/// Scripted behaviour of one process
#[derive(Debug, Clone, Default)]
pub struct Script {
    stdout: Vec<u8>,
    stderr: String,
    exit: i32,
    spawn_failure: bool,
    reject_stdin: bool,
}

impl Script {
    pub fn ok() -> Self {
        Self::default()
    }

    pub fn exit(code: i32) -> Self {
        Self {
            exit: code,
            ..Self::default()
        }
    }

    pub fn spawn_failure() -> Self {
        Self {
            spawn_failure: true,
            ..Self::default()
        }
    }

    pub fn stdout(mut self, stdout: impl AsRef<[u8]>) -> Self {
        self.stdout = stdout.as_ref().to_vec();
        self
    }

    pub fn stderr(mut self, stderr: &str) -> Self {
        self.stderr = stderr.to_string();
        self
    }

    /// Writes to stdin fail with a broken pipe, as when the process died early.
    pub fn reject_stdin(mut self) -> Self {
        self.reject_stdin = true;
        self
    }
}

#[derive(Debug)]
struct Rule {
    pattern: String,
    script: Script,
    remaining: Option<usize>,
}

/// Runner answering each command with the first matching [`Script`]
///
/// A rule matches when its pattern is a substring of the rendered argument
/// vector. Unmatched commands succeed with empty output.
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    rules: Mutex<Vec<Rule>>,
    started: Arc<Mutex<Vec<String>>>,
    received: Arc<Mutex<Vec<u8>>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(self, pattern: &str, script: Script) -> Self {
        self.push(pattern, script, None)
    }

    /// Like [`ScriptedRunner::on`] but only for the first `times` matches.
    pub fn on_times(self, pattern: &str, script: Script, times: usize) -> Self {
        self.push(pattern, script, Some(times))
    }

    fn push(self, pattern: &str, script: Script, remaining: Option<usize>) -> Self {
        if let Ok(mut rules) = self.rules.lock() {
            rules.push(Rule {
                pattern: pattern.to_string(),
                script,
                remaining,
            });
        }
        self
    }

    /// Rendered commands that were started successfully, in order.
    pub fn started(&self) -> Vec<String> {
        self.started.lock().map(|log| log.clone()).unwrap_or_default()
    }

    pub fn count(&self, pattern: &str) -> usize {
        self.started()
            .iter()
            .filter(|command| command.contains(pattern))
            .count()
    }

    /// Bytes written to the stdin of every process.
    pub fn received(&self) -> Vec<u8> {
        self.received
            .lock()
            .map(|bytes| bytes.clone())
            .unwrap_or_default()
    }

    fn script_for(&self, rendered: &str) -> Script {
        let Ok(mut rules) = self.rules.lock() else {
            return Script::ok();
        };

        for rule in rules.iter_mut() {
            if !rendered.contains(&rule.pattern) || rule.remaining == Some(0) {
                continue;
            }
            if let Some(remaining) = rule.remaining.as_mut() {
                *remaining -= 1;
            }
            return rule.script.clone();
        }

        Script::ok()
    }
}

impl CommandRunner for ScriptedRunner {
    fn command(&self, program: &str, args: &[String]) -> Box<dyn Process> {
        let mut argv = vec![program.to_string()];
        argv.extend(args.iter().cloned());
        let script = self.script_for(&render(&argv));

        Box::new(ScriptedProcess {
            args: argv,
            script,
            pipes: None,
            stdin_closed: None,
            stdout_closed: None,
            started: Arc::clone(&self.started),
            received: Arc::clone(&self.received),
        })
    }
}

/// A process that, like a real one, only exits once the streams handed out
/// for it have been closed.
struct ScriptedProcess {
    args: Vec<String>,
    script: Script,
    pipes: Option<Pipes>,
    stdin_closed: Option<Receiver<()>>,
    stdout_closed: Option<Receiver<()>>,
    started: Arc<Mutex<Vec<String>>>,
    received: Arc<Mutex<Vec<u8>>>,
}

/// Stream wrapper that disconnects its channel when dropped
struct Signalled<T> {
    inner: T,
    _closed: Sender<()>,
}

fn signalled<T>(inner: T) -> (Signalled<T>, Receiver<()>) {
    let (closed, receiver) = mpsc::channel();
    (
        Signalled {
            inner,
            _closed: closed,
        },
        receiver,
    )
}

impl<R: Read> Read for Signalled<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl<W: Write> Write for Signalled<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

struct SharedWriter(Arc<Mutex<Vec<u8>>>);

impl Write for SharedWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut bytes = self
            .0
            .lock()
            .map_err(|_| io::Error::other("poisoned"))?;
        bytes.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

struct BrokenPipe;

impl Write for BrokenPipe {
    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(io::Error::new(io::ErrorKind::BrokenPipe, "broken pipe"))
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Process for ScriptedProcess {
    fn args(&self) -> &[String] {
        &self.args
    }

    fn start(&mut self, pipes: Pipes) -> io::Result<()> {
        if self.script.spawn_failure {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                "no such file or directory",
            ));
        }

        if let Ok(mut started) = self.started.lock() {
            started.push(render(&self.args));
        }
        self.pipes = Some(pipes);
        Ok(())
    }

    fn take_stdin(&mut self) -> Option<Box<dyn Write + Send>> {
        if !self.pipes?.stdin {
            return None;
        }
        if self.script.reject_stdin {
            let (writer, closed) = signalled(BrokenPipe);
            self.stdin_closed = Some(closed);
            return Some(Box::new(writer));
        }
        let (writer, closed) = signalled(SharedWriter(Arc::clone(&self.received)));
        self.stdin_closed = Some(closed);
        Some(Box::new(writer))
    }

    fn take_stdout(&mut self) -> Option<Box<dyn Read + Send>> {
        if !self.pipes?.stdout {
            return None;
        }
        let stdout = std::mem::take(&mut self.script.stdout);
        let (reader, closed) = signalled(Cursor::new(stdout));
        self.stdout_closed = Some(closed);
        Some(Box::new(reader))
    }

    fn wait(&mut self) -> Result<(), ProcessError> {
        if self.pipes.is_none() {
            return Err(ProcessError::Wait(io::Error::new(
                io::ErrorKind::NotConnected,
                "process was not started",
            )));
        }

        for closed in [self.stdin_closed.take(), self.stdout_closed.take()]
            .into_iter()
            .flatten()
        {
            // returns once the stream has been dropped
            let _ = closed.recv();
        }

        match self.script.exit {
            0 => Ok(()),
            code => Err(ProcessError::Exit(code)),
        }
    }

    fn stderr(&self) -> String {
        self.script.stderr.clone()
    }
}
