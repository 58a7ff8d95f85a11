//! Retry with exponential back-off for transient upstream failures.
//!
//! Every network and git call in the pipeline goes through a
//! [`RetryExecutor`]. Errors are not inspected by type: they report an
//! explicit [`ErrorKind`] tag via [`Classify`], and only the tag decides
//! whether another attempt is made.

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::constants::{RETRY_BASE_DELAY_SECS, RETRY_MAX_ATTEMPTS};

/// Failure classification used by the retry loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Platform rate limit exceeded (quota message on a 403/429).
    RateLimited,
    /// HTTP 429 without a rate-limit body.
    TooManyRequests,
    /// Object not found; the platform is eventually consistent, so this
    /// may clear up on a later attempt.
    NotFound,
    /// Anything else. Never retried.
    Fatal,
}

impl ErrorKind {
    pub fn is_transient(self) -> bool {
        !matches!(self, ErrorKind::Fatal)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::RateLimited => write!(f, "rate-limited"),
            ErrorKind::TooManyRequests => write!(f, "too-many-requests"),
            ErrorKind::NotFound => write!(f, "not-found"),
            ErrorKind::Fatal => write!(f, "fatal"),
        }
    }
}

/// Errors that can report their retry classification.
pub trait Classify {
    fn kind(&self) -> ErrorKind;
}

/// Attempt ceiling and back-off schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts including the first try (minimum 1).
    pub max_attempts: u32,
    /// Back-off before retry `n` is `base_delay * 2^n` (n starts at 1).
    pub base_delay: Duration,
    /// Optional cap on the total time spent sleeping between attempts.
    pub max_elapsed: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: RETRY_MAX_ATTEMPTS,
            base_delay: Duration::from_secs(RETRY_BASE_DELAY_SECS),
            max_elapsed: None,
        }
    }
}

impl RetryPolicy {
    /// Delay before the retry that follows failed attempt `attempt` (1-based).
    ///
    /// Exponential and unjittered: 2s, 4s, 8s, ... with the default base.
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }

    fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

/// Suspends the current task between attempts.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Real timer backed by `tokio::time::sleep`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Fake clock: records requested delays and returns immediately.
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    delays: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delays(&self) -> Vec<Duration> {
        self.delays.lock().map(|d| d.clone()).unwrap_or_default()
    }

    pub fn total(&self) -> Duration {
        self.delays().iter().sum()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        if let Ok(mut delays) = self.delays.lock() {
            delays.push(duration);
        }
    }
}

/// Runs fallible async operations under a [`RetryPolicy`].
///
/// Cheap to clone; one executor is shared by every component of a review
/// cycle.
#[derive(Clone)]
pub struct RetryExecutor {
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl fmt::Debug for RetryExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryExecutor")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl Default for RetryExecutor {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self::with_sleeper(policy, Arc::new(TokioSleeper))
    }

    pub fn with_sleeper(policy: RetryPolicy, sleeper: Arc<dyn Sleeper>) -> Self {
        Self { policy, sleeper }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `op`, retrying transient failures.
    ///
    /// Fatal errors are returned at once. When the attempt ceiling (or the
    /// optional back-off budget) is reached, the last error is returned.
    pub async fn execute<T, E, F, Fut>(&self, operation: &str, mut op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Classify + fmt::Display,
    {
        let max_attempts = self.policy.attempts();
        let mut attempt = 1;
        let mut slept = Duration::ZERO;

        loop {
            let err = match op().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            let kind = err.kind();
            if !kind.is_transient() {
                return Err(err);
            }
            if attempt >= max_attempts {
                debug!(operation, attempt, kind = %kind, "retries exhausted");
                return Err(err);
            }

            let delay = self.policy.backoff(attempt);
            if let Some(budget) = self.policy.max_elapsed {
                if slept + delay > budget {
                    warn!(
                        operation,
                        attempt,
                        budget_secs = budget.as_secs_f64(),
                        "retry budget exhausted"
                    );
                    return Err(err);
                }
            }

            warn!(
                operation,
                attempt,
                max_attempts,
                delay_secs = delay.as_secs_f64(),
                kind = %kind,
                error = %err,
                "transient failure, retrying"
            );
            self.sleeper.sleep(delay).await;
            slept += delay;
            attempt += 1;
        }
    }
}
