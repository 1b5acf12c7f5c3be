// SPDX-License-Identifier: GPL-3.0-only

use std::io::{self, Read};

use indicatif::{ProgressBar, ProgressStyle};

const TEMPLATE: &str =
    "{bytes:>10}/{total_bytes:10} [{bar:40}] {percent:>3}% {bytes_per_sec:>12} eta {eta}";

/// Displays how much of a snapshot stream has been transferred
pub trait ProgressSink: Send + Sync {
    /// Wrap `reader` so every read advances an indicator towards `total`.
    fn track(&self, total: u64, reader: Box<dyn Read + Send>) -> Box<dyn Read + Send>;
}

/// Terminal progress bar on stderr
#[derive(Debug, Clone, Copy, Default)]
pub struct BarProgress;

impl ProgressSink for BarProgress {
    fn track(&self, total: u64, reader: Box<dyn Read + Send>) -> Box<dyn Read + Send> {
        let bar = ProgressBar::new(total);
        if let Ok(style) = ProgressStyle::with_template(TEMPLATE) {
            bar.set_style(style.progress_chars("=> "));
        }
        Box::new(ProgressReader::new(reader, bar, total))
    }
}

/// Reader that advances a progress bar and completes it at end of stream
pub struct ProgressReader<R> {
    inner: R,
    bar: ProgressBar,
    total: u64,
}

impl<R: Read> ProgressReader<R> {
    pub fn new(inner: R, bar: ProgressBar, total: u64) -> Self {
        Self { inner, bar, total }
    }
}

impl<R: Read> Read for ProgressReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        if n == 0 {
            // size estimates are not exact, snap to the full bar
            self.bar.set_position(self.total);
            self.bar.finish();
        } else {
            self.bar.inc(n as u64);
        }
        Ok(n)
    }
}

impl<R> Drop for ProgressReader<R> {
    fn drop(&mut self) {
        if !self.bar.is_finished() {
            self.bar.abandon();
        }
    }
}
