//! Retry policy for a single network operation.
//!
//! Retry eligibility is a pure decision over the error value ([`decide`]);
//! the executor only sequences attempts, hooks, backoff sleeps and
//! cancellation checks around it.
//!
//! [`decide`]: RetryPolicy::decide

use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Default number of attempts (first try included).
pub const DEFAULT_MAX_ATTEMPTS: u32 = 2;

/// Context handed to the eligibility predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryContext {
    /// Attempt that just failed, starting at 1.
    pub attempt: u32,
    pub max_attempts: u32,
}

/// Notification emitted before each retry.
#[derive(Debug)]
pub struct RetryNotice<'a> {
    pub error: &'a SyncError,
    /// Attempt that just failed, starting at 1.
    pub attempt: u32,
    /// Delay before the next attempt.
    pub delay: Duration,
}

/// Receives a notice before each retry (progress reporting, telemetry).
#[async_trait]
pub trait RetryObserver: Send + Sync {
    async fn on_retry(&self, notice: &RetryNotice<'_>);
}

/// Outcome of classifying a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Wait this long, then try again.
    Retry(Duration),
    /// Surface the error.
    GiveUp,
}

type BackoffFn = Arc<dyn Fn(u32) -> Duration + Send + Sync>;
type PredicateFn = Arc<dyn Fn(&SyncError, &RetryContext) -> bool + Send + Sync>;

/// Stateless retry configuration. Cheap to clone.
#[derive(Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff: BackoffFn,
    should_retry: PredicateFn,
    on_retry: Option<Arc<dyn RetryObserver>>,
}

impl RetryPolicy {
    /// Retries up to `max_attempts` total attempts, waiting `backoff(n)`
    /// after the `n`th failure when `should_retry` allows it.
    pub fn wait_and_retry<B, P>(max_attempts: u32, backoff: B, should_retry: P) -> Self
    where
        B: Fn(u32) -> Duration + Send + Sync + 'static,
        P: Fn(&SyncError, &RetryContext) -> bool + Send + Sync + 'static,
    {
        Self {
            max_attempts: max_attempts.max(1),
            backoff: Arc::new(backoff),
            should_retry: Arc::new(should_retry),
            on_retry: None,
        }
    }

    /// A policy that makes exactly one attempt.
    pub fn no_retry() -> Self {
        Self::wait_and_retry(1, |_| Duration::ZERO, |_, _| false)
    }

    /// Registers a hook invoked before every retry.
    pub fn with_on_retry(mut self, hook: Arc<dyn RetryObserver>) -> Self {
        self.on_retry = Some(hook);
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay applied after the `attempt`th failure.
    pub fn backoff(&self, attempt: u32) -> Duration {
        (self.backoff)(attempt)
    }

    /// Classifies a failed attempt.
    ///
    /// Cancellation, configuration and validation errors and lost sessions
    /// are never retried, whatever the predicate says.
    pub fn decide(&self, error: &SyncError, attempt: u32) -> RetryDecision {
        if error.is_fatal() || attempt >= self.max_attempts {
            return RetryDecision::GiveUp;
        }
        let ctx = RetryContext {
            attempt,
            max_attempts: self.max_attempts,
        };
        if (self.should_retry)(error, &ctx) {
            RetryDecision::Retry(self.backoff(attempt))
        } else {
            RetryDecision::GiveUp
        }
    }

    /// Runs `op` until it succeeds or the policy gives up.
    ///
    /// `op` receives the 1-based attempt number. Cancellation is checked
    /// before each attempt and raced against both the attempt and the
    /// backoff sleep; a cancelled run never makes another attempt.
    pub async fn execute<T, F, Fut>(
        &self,
        cancel: &CancellationToken,
        observer: Option<&dyn RetryObserver>,
        mut op: F,
    ) -> SyncResult<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = SyncResult<T>>,
    {
        let mut attempt = 1;
        loop {
            if cancel.is_cancelled() {
                debug!(attempt, "cancelled before attempt");
                return Err(SyncError::Cancelled);
            }

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(SyncError::Cancelled),
                r = op(attempt) => r,
            };

            let error = match result {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            let delay = match self.decide(&error, attempt) {
                RetryDecision::GiveUp => return Err(error),
                RetryDecision::Retry(delay) => delay,
            };

            warn!(attempt, ?delay, "attempt failed, retrying: {error}");

            let notice = RetryNotice {
                error: &error,
                attempt,
                delay,
            };
            if let Some(hook) = &self.on_retry {
                hook.on_retry(&notice).await;
            }
            if let Some(observer) = observer {
                observer.on_retry(&notice).await;
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(SyncError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }

            attempt += 1;
        }
    }
}

impl Default for RetryPolicy {
    /// Two attempts, `500ms × n` backoff, everything retried except the
    /// errors [`RetryPolicy::decide`] always refuses.
    fn default() -> Self {
        Self::wait_and_retry(
            DEFAULT_MAX_ATTEMPTS,
            |attempt| Duration::from_millis(500 * u64::from(attempt)),
            |error, _| !error.is_session_lost(),
        )
    }
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("has_on_retry", &self.on_retry.is_some())
            .finish()
    }
}
