//! Retry with exponential backoff around DynamoDB calls.
//!
//! Only throttling and server side failures are retried. The loop gives up
//! when the next sleep would cross the policy deadline, handing back the
//! last error untouched, and stops at once when its cancellation token
//! fires.

use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::errors::{Error, Result, TransportError};

/// Backoff settings for [`with_retry`].
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Upper bound on the whole call including retries. Zero means no bound.
    pub timeout: Duration,
    pub initial_interval: Duration,
    pub multiplier: f64,
    pub max_interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            initial_interval: Duration::from_millis(500),
            multiplier: 1.5,
            max_interval: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Deadline for a call starting now.
    pub fn deadline(&self) -> Option<Instant> {
        if self.timeout.is_zero() {
            None
        } else {
            Some(Instant::now() + self.timeout)
        }
    }

    fn backoff(&self) -> Backoff {
        Backoff {
            next: self.initial_interval.min(self.max_interval),
            multiplier: self.multiplier,
            max: self.max_interval,
        }
    }
}

struct Backoff {
    next: Duration,
    multiplier: f64,
    max: Duration,
}

impl Backoff {
    fn next_delay(&mut self) -> Duration {
        let current = self.next;
        self.next = current.mul_f64(self.multiplier).min(self.max);
        current
    }
}

/// Whether a failed call may be retried.
///
/// 500 and 503 always retry. A 400 retries only for throughput and
/// throttling errors.
pub fn can_retry(status: Option<u16>, code: Option<&str>) -> bool {
    match status {
        Some(500) | Some(503) => true,
        Some(400) => matches!(
            code,
            Some("ProvisionedThroughputExceededException") | Some("ThrottlingException")
        ),
        _ => false,
    }
}

async fn reached(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Run `op` until it succeeds, fails terminally, runs out of time or is
/// canceled.
///
/// # Arguments
///
/// * `policy` - Backoff intervals and overall timeout
/// * `cancel` - Aborts the loop, including an in-flight attempt
/// * `op` - Produces one attempt per call
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, TransportError>>,
{
    with_retry_until(policy, policy.deadline(), cancel, op).await
}

/// [`with_retry`] against a deadline shared with other calls. `None` means
/// no bound.
pub async fn with_retry_until<T, F, Fut>(
    policy: &RetryPolicy,
    deadline: Option<Instant>,
    cancel: &CancellationToken,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, TransportError>>,
{
    let mut backoff = policy.backoff();
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Canceled),
            _ = reached(deadline) => return Err(Error::DeadlineExceeded),
            outcome = op() => outcome,
        };

        let err = match outcome {
            Ok(value) => {
                if attempt > 1 {
                    debug!(attempt, "call succeeded after retrying");
                }
                return Ok(value);
            }
            Err(err) => err,
        };

        if !err.is_retryable() {
            return Err(err.into());
        }

        let delay = backoff.next_delay();
        if let Some(deadline) = deadline {
            if Instant::now() + delay > deadline {
                debug!(attempt, "retry deadline reached, giving up");
                return Err(err.into());
            }
        }

        warn!(
            attempt,
            status = ?err.status(),
            code = ?err.code(),
            delay_ms = delay.as_millis() as u64,
            "retryable DynamoDB error: {}",
            err
        );

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Canceled),
            _ = sleep(delay) => {}
        }
    }
}
