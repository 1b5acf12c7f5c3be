// SPDX-License-Identifier: GPL-3.0-only

use std::thread;
use std::time::Duration;

use tracing::warn;

use crate::error::Result;

/// Bounded retry of transfers that hit a busy destination
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Retry `n` waits `n * backoff_unit`.
    pub backoff_unit: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            backoff_unit: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, backoff_unit: Duration) -> Self {
        Self {
            max_retries,
            backoff_unit,
        }
    }

    /// Run `attempt` until it succeeds, fails with anything other than the
    /// busy condition, or the retries are used up.
    pub fn run<F>(&self, attempt: F) -> Result<()>
    where
        F: FnMut() -> Result<()>,
    {
        self.run_with_sleep(attempt, thread::sleep)
    }

    fn run_with_sleep<F, S>(&self, mut attempt: F, mut sleep: S) -> Result<()>
    where
        F: FnMut() -> Result<()>,
        S: FnMut(Duration),
    {
        let mut retries = 0;

        loop {
            match attempt() {
                Err(error) if error.is_busy() && retries < self.max_retries => {
                    retries += 1;
                    let delay = self.backoff_unit.saturating_mul(retries);
                    warn!("dataset is busy, retrying in {:?}", delay);
                    sleep(delay);
                }
                result => return result,
            }
        }
    }
}
