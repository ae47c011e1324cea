//! Fixed-delay retry policy handed to every component that talks to an upstream API.

use anyhow::{anyhow, Result};
use std::thread::sleep;
use std::time::Duration;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub delay: Duration,
    /// `None` retries until the operation succeeds.
    pub max_attempts: Option<usize>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::forever(Duration::from_secs(1))
    }
}

impl RetryPolicy {
    pub fn forever(delay: Duration) -> Self {
        Self { delay, max_attempts: None }
    }

    pub fn bounded(delay: Duration, attempts: usize) -> Self {
        Self { delay, max_attempts: Some(attempts.max(1)) }
    }

    /// Run `op` until it returns `Ok`, sleeping `delay` between attempts.
    /// With a bounded policy the last error is returned once attempts run out.
    pub fn run<T, F>(&self, label: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Result<T>,
    {
        let mut attempt = 0usize;
        loop {
            attempt += 1;
            match op() {
                Ok(v) => return Ok(v),
                Err(e) => {
                    if let Some(max) = self.max_attempts {
                        if attempt >= max {
                            return Err(e.context(format!("{} failed after {} attempt(s)", label, attempt)));
                        }
                    }
                    tracing::debug!("{} attempt {} failed: {:#}; retrying", label, attempt, e);
                    if !self.delay.is_zero() {
                        sleep(self.delay);
                    }
                }
            }
        }
    }
}

/// Turn a non-success HTTP status into an error so it flows through `RetryPolicy::run`.
pub fn ensure_success(status: reqwest::StatusCode, what: &str) -> Result<()> {
    if status.is_success() {
        Ok(())
    } else {
        Err(anyhow!("{} returned HTTP {}", what, status))
    }
}
