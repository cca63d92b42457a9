use std::fmt;
use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::{run_cancellable, Cancelled};

/// Fixed-interval retry bounded by a total deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub interval: Duration,
    pub deadline: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            deadline: Duration::from_secs(10),
        }
    }
}

/// Runs `operation` until it succeeds, re-attempting every `policy.interval`.
///
/// When the next attempt would start after `policy.deadline`, the last failure is returned.
/// Cancellation of `token` stops both a running attempt and the wait between attempts.
pub async fn retry_on_failure<T, E, F, Fut>(
    policy: RetryPolicy,
    token: &CancellationToken,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: From<Cancelled> + fmt::Display,
{
    let deadline = Instant::now() + policy.deadline;
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        let err = match run_cancellable(token, operation()).await? {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if Instant::now() + policy.interval > deadline {
            tracing::warn!(
                target = "lantern.scheduler",
                attempt,
                error = %err,
                "giving up after retry deadline"
            );
            return Err(err);
        }

        tracing::debug!(
            target = "lantern.scheduler",
            attempt,
            error = %err,
            retry_in_ms = policy.interval.as_millis() as u64,
            "operation failed; retrying"
        );
        run_cancellable(token, tokio::time::sleep(policy.interval)).await?;
    }
}
