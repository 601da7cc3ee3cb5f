//! Bounded retry for flaky remote operations
//!
//! One combinator backs every retrying call in the harness: optimistic
//! replace (linear backoff on conflicts), node address resolution (fixed
//! delay), the metrics readiness poll (deadline mode) and curl-with-backoff
//! inside scenarios. Callers pick a limit, a backoff shape and optionally a
//! predicate restricting which errors are worth retrying.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use verkko::retry::{retry, Backoff};
//!
//! let node = retry(|| async { read_node("worker-1").await })
//!     .attempts(3)
//!     .backoff(Backoff::Fixed(Duration::from_secs(1)))
//!     .run()
//!     .await?;
//! ```

use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

/// Delay shape between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Same delay after every attempt
    Fixed(Duration),
    /// `base * attempt` - strictly increasing
    Linear(Duration),
    /// `base * 2^(attempt-1)`, capped at `max`
    Exponential { base: Duration, max: Duration },
}

impl Backoff {
    /// Delay to sleep after the given failed attempt (1-based)
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        match *self {
            Backoff::Fixed(d) => d,
            Backoff::Linear(base) => base * attempt,
            Backoff::Exponential { base, max } => {
                let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
                (base * factor).min(max)
            }
        }
    }
}

/// When to stop retrying
#[derive(Debug, Clone, Copy)]
enum Limit {
    /// Give up after this many attempts
    Attempts(u32),
    /// Give up once this much wall-clock time has elapsed since the first attempt
    Deadline(Duration),
}

/// Builder for a retried operation
pub struct Retry<F, P> {
    op: F,
    limit: Limit,
    backoff: Backoff,
    retry_if: P,
}

/// Retry an async operation until it succeeds or the limit is reached
///
/// Defaults: 3 attempts, fixed 1s backoff, every error retryable.
pub fn retry<F, Fut, T, E>(op: F) -> Retry<F, fn(&E) -> bool>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    Retry {
        op,
        limit: Limit::Attempts(3),
        backoff: Backoff::Fixed(Duration::from_secs(1)),
        retry_if: |_| true,
    }
}

impl<F, P> Retry<F, P> {
    /// Give up after `n` attempts
    ///
    /// # Panics
    ///
    /// Panics if `n` is 0. Use at least 1 attempt.
    #[must_use]
    pub fn attempts(mut self, n: u32) -> Self {
        assert!(n > 0, "retry requires at least 1 attempt, got attempts=0");
        self.limit = Limit::Attempts(n);
        self
    }

    /// Keep retrying until this much wall-clock time has passed
    ///
    /// The first attempt always runs; the elapsed check happens after each
    /// failure, so a slow operation may overrun the deadline by one attempt.
    #[must_use]
    pub fn deadline(mut self, timeout: Duration) -> Self {
        self.limit = Limit::Deadline(timeout);
        self
    }

    /// Set the delay shape between attempts
    #[must_use]
    pub fn backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Only retry errors matching the predicate; others propagate immediately
    #[must_use]
    pub fn retry_if<E, Q>(self, pred: Q) -> Retry<F, Q>
    where
        Q: Fn(&E) -> bool,
    {
        Retry {
            op: self.op,
            limit: self.limit,
            backoff: self.backoff,
            retry_if: pred,
        }
    }

    /// Run the operation, retrying per the configured policy
    ///
    /// Returns the first success, or the last error once the limit is
    /// reached or a non-retryable error occurs.
    pub async fn run<Fut, T, E>(mut self) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
        P: Fn(&E) -> bool,
    {
        let start = Instant::now();
        let mut attempt = 0u32;

        loop {
            attempt += 1;

            match (self.op)().await {
                Ok(value) => {
                    debug!(attempt = attempt, "Retry succeeded");
                    return Ok(value);
                }
                Err(e) => {
                    if !(self.retry_if)(&e) {
                        debug!(attempt = attempt, error = %e, "Error not retryable");
                        return Err(e);
                    }

                    let exhausted = match self.limit {
                        Limit::Attempts(n) => attempt >= n,
                        Limit::Deadline(timeout) => start.elapsed() >= timeout,
                    };
                    if exhausted {
                        warn!(
                            attempt = attempt,
                            elapsed = ?start.elapsed(),
                            error = %e,
                            "Retry exhausted"
                        );
                        return Err(e);
                    }

                    let delay = self.backoff.delay(attempt);
                    debug!(
                        attempt = attempt,
                        backoff = ?delay,
                        error = %e,
                        "Attempt failed, backing off"
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}
