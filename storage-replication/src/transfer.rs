// SPDX-License-Identifier: GPL-3.0-only

//! Single snapshot transfer
//!
//! Runs `zfs send` on the source and `zfs recv` on the destination and relays
//! the stream between them. The following order avoids deadlocks:
//! 1. start the send process
//! 2. start the recv process and the relay
//! 3. wait for send, then the relay, then recv

use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use std::thread;

use tracing::{debug, info};

use crate::config::Flags;
use crate::error::{CommandError, ProcessError, ReplicationError, Result};
use crate::exec::{self, Pipes, Process};
use crate::progress::ProgressSink;
use crate::retry::RetryPolicy;
use crate::volume::Volume;
use crate::zfs::Zfs;

const RELAY_BUFFER: usize = 1024 * 1024;

/// A volume together with the ZFS instance it lives on
#[derive(Debug, Clone, Copy)]
pub struct Endpoint<'a> {
    pub zfs: &'a Zfs,
    pub volume: &'a Volume,
}

/// Arguments for transferring a single snapshot
#[derive(Debug, Clone, Copy)]
pub struct Transfer<'a> {
    pub source: Endpoint<'a>,
    pub destination: Endpoint<'a>,
    /// Base of an incremental send; `None` sends the full snapshot.
    pub previous: Option<&'a str>,
    pub current: &'a str,
    pub flags: &'a Flags,
}

/// Keeps the failure of whichever process is observed failing first
#[derive(Debug, Default)]
struct FirstFailure(Mutex<Option<CommandError>>);

impl FirstFailure {
    fn record(&self, process: &dyn Process, cause: ProcessError) {
        let mut slot = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_none() {
            *slot = Some(exec::failure(process, cause));
        } else {
            debug!("Ignoring later failure of {}: {}", exec::render(process.args()), cause);
        }
    }

    fn into_inner(self) -> Option<CommandError> {
        self.0.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Debug)]
enum RelayError {
    Read(io::Error),
    Write(io::Error),
}

impl RelayError {
    fn into_io(self) -> io::Error {
        match self {
            Self::Read(e) | Self::Write(e) => e,
        }
    }
}

/// Copy `reader` into `writer` until end of stream, then close `writer`.
///
/// `consumer_gone` is set before the reader is dropped when the writing side
/// breaks, so whoever sees the producer die afterwards knows why.
fn relay(
    mut reader: Box<dyn Read + Send>,
    mut writer: Box<dyn Write + Send>,
    consumer_gone: &AtomicBool,
) -> std::result::Result<u64, RelayError> {
    let mut buffer = vec![0u8; RELAY_BUFFER];
    let mut total: u64 = 0;

    loop {
        let bytes_read = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(RelayError::Read(e)),
        };

        if let Err(e) = writer.write_all(&buffer[..bytes_read]) {
            consumer_gone.store(true, Ordering::Release);
            return Err(RelayError::Write(e));
        }
        total += bytes_read as u64;
    }

    if let Err(e) = writer.flush() {
        consumer_gone.store(true, Ordering::Release);
        return Err(RelayError::Write(e));
    }
    Ok(total)
}

fn panicked(what: &str) -> RelayError {
    RelayError::Read(io::Error::other(format!("{what} thread panicked")))
}

impl Transfer<'_> {
    fn recv(&self) -> Box<dyn Process> {
        self.destination
            .zfs
            .recv(self.destination.volume.full_name(), self.flags.force)
    }

    fn send(&self) -> Box<dyn Process> {
        self.source.zfs.send(
            self.source.volume.full_name(),
            self.previous,
            self.current,
            self.flags.raw,
            false,
        )
    }

    fn send_size(&self) -> Result<u64> {
        self.source.zfs.send_size(
            self.source.volume.full_name(),
            self.previous,
            self.current,
            self.flags.raw,
        )
    }

    /// Run the transfer, retrying while the destination is busy.
    pub fn run_with_retry(
        &self,
        policy: &RetryPolicy,
        progress: Option<&dyn ProgressSink>,
    ) -> Result<()> {
        policy.run(|| self.run(progress))
    }

    /// Run the transfer once.
    ///
    /// Returns the failure of whichever process failed first, or a transfer
    /// error if both exited cleanly but relaying the stream failed.
    pub fn run(&self, progress: Option<&dyn ProgressSink>) -> Result<()> {
        let tracker = match progress {
            Some(sink) if self.flags.progress => Some((sink, self.send_size()?)),
            _ => None,
        };

        let mut recv = self.recv();
        let mut send = self.send();

        info!(
            "Running {} | {}",
            exec::render(send.args()),
            exec::render(recv.args())
        );

        if let Err(e) = send.start(Pipes::STDOUT) {
            return Err(exec::failure(send.as_ref(), ProcessError::Spawn(e)).into());
        }

        let stdout = send
            .take_stdout()
            .unwrap_or_else(|| Box::new(io::empty()));
        let failure = FirstFailure::default();

        if let Err(e) = recv.start(Pipes::STDIN) {
            failure.record(recv.as_ref(), ProcessError::Spawn(e));
            // closing the stream lets send exit
            drop(stdout);
            if let Err(cause) = send.wait() {
                failure.record(send.as_ref(), cause);
            }
            return Err(failure.into_inner().map_or_else(
                || ReplicationError::Transfer(io::Error::other("recv did not start")),
                ReplicationError::from,
            ));
        }

        let stdin = recv.take_stdin().unwrap_or_else(|| Box::new(io::sink()));
        let stdout = match tracker {
            Some((sink, size)) => sink.track(size, stdout),
            None => stdout,
        };

        let consumer_gone = AtomicBool::new(false);
        let relayed = thread::scope(|scope| {
            let failure = &failure;
            let consumer_gone = &consumer_gone;
            let relayer = scope.spawn(move || relay(stdout, stdin, consumer_gone));
            let receiver = scope.spawn(move || {
                if let Err(cause) = recv.wait() {
                    failure.record(recv.as_ref(), cause);
                }
            });
            let mut receiver = Some(receiver);

            if let Err(cause) = send.wait() {
                // recv stopped reading first, its failure explains the one of send
                if consumer_gone.load(Ordering::Acquire)
                    && let Some(receiver) = receiver.take()
                    && receiver.join().is_err()
                {
                    debug!("recv watcher thread panicked");
                }
                failure.record(send.as_ref(), cause);
            }

            let relayed = relayer
                .join()
                .unwrap_or_else(|_| Err(panicked("relay")));

            if let Some(receiver) = receiver
                && receiver.join().is_err()
            {
                debug!("recv watcher thread panicked");
            }

            relayed
        });

        if let Some(error) = failure.into_inner() {
            return Err(error.into());
        }

        let bytes = relayed.map_err(|e| ReplicationError::Transfer(e.into_io()))?;
        debug!("Transferred {} bytes", bytes);
        Ok(())
    }
}
