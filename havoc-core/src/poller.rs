//! Cooperative status polling.
//!
//! A caller hands in an accessor that fetches the current status of a resource
//! by id. The loop stops on the expected status, on the error marker (at once,
//! without waiting out the budget) or when the timeout measured from the first
//! call is spent.

use log::{debug, warn};
use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, Instant};

use crate::error::{HavocError, Result};

/// Status reported by a resource that will never recover on its own.
pub const ERROR_STATUS: &str = "ERROR";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollPolicy {
    interval: Duration,
    timeout: Duration,
    error_status: String,
}

impl PollPolicy {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self {
            interval,
            timeout,
            error_status: ERROR_STATUS.to_string(),
        }
    }

    /// Replaces the terminal error marker, e.g. `crashed` for hypervisor domains.
    pub fn with_error_status(mut self, status: impl Into<String>) -> Self {
        self.error_status = status.into();
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn error_status(&self) -> &str {
        &self.error_status
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(10), Duration::from_secs(300))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// The expected status was seen on call number `attempts`.
    Reached { attempts: u32 },
    /// The error marker was seen.
    Failed { status: String },
    /// The budget ran out; `last_status` is the final sample and `waited` the
    /// time from the first call to it.
    TimedOut {
        last_status: Option<String>,
        waited: Duration,
    },
}

/// Polls `accessor(id)` until `expected`, the policy's error marker, or the timeout.
///
/// Accessor errors end the loop and propagate unchanged.
pub async fn poll<F, Fut>(
    mut accessor: F,
    id: &str,
    expected: &str,
    policy: &PollPolicy,
) -> Result<PollOutcome>
where
    F: FnMut(&str) -> Fut,
    Fut: Future<Output = Result<String>>,
{
    let started = Instant::now();
    let mut attempts = 0u32;

    loop {
        let status = accessor(id).await?;
        attempts += 1;

        if status == policy.error_status {
            warn!("Poller: {} reported {} after {} attempts", id, status, attempts);
            return Ok(PollOutcome::Failed { status });
        }
        if status == expected {
            debug!("Poller: {} reached {} after {} attempts", id, expected, attempts);
            return Ok(PollOutcome::Reached { attempts });
        }
        debug!("Poller: {} is {}, waiting for {}", id, status, expected);

        let elapsed = started.elapsed();
        if elapsed >= policy.timeout {
            return Ok(PollOutcome::TimedOut {
                last_status: Some(status),
                waited: elapsed,
            });
        }
        sleep(policy.interval.min(policy.timeout - elapsed)).await;
    }
}

/// [`poll`], with the failure outcomes turned into errors.
pub async fn wait_for_status<F, Fut>(
    accessor: F,
    id: &str,
    expected: &str,
    policy: &PollPolicy,
) -> Result<()>
where
    F: FnMut(&str) -> Fut,
    Fut: Future<Output = Result<String>>,
{
    match poll(accessor, id, expected, policy).await? {
        PollOutcome::Reached { .. } => Ok(()),
        PollOutcome::Failed { status } => Err(HavocError::ResourceFailed {
            id: id.to_string(),
            status,
        }),
        PollOutcome::TimedOut {
            last_status,
            waited,
        } => Err(HavocError::PollTimeout {
            id: id.to_string(),
            expected: expected.to_string(),
            last_status,
            waited,
        }),
    }
}
