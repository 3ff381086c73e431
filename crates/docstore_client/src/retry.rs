//! Bounded-attempt retry of network operations.

use crate::config::BackoffConfig;
use crate::context::RequestContext;
use crate::error::{StoreError, StoreResult};
use std::future::Future;

type RetryPredicate<'a> = Box<dyn Fn(&StoreError) -> bool + Send + Sync + 'a>;
type RetryHook<'a> = Box<dyn Fn(u32, &StoreError) + Send + Sync + 'a>;

/// Runs an operation up to a fixed number of attempts.
///
/// An attempt is retried only while the predicate accepts its error
/// (defaults to [`StoreError::is_retryable`]). Not-found and cancellation
/// errors are never retried whatever the predicate says. When attempts run
/// out only the last error is returned.
///
/// ```ignore
/// let response = Retry::new(5)
///     .on_retry(|attempt, err| warn!("attempt {} failed: {}", attempt, err))
///     .run(&ctx, move || client.send(request.clone()))
///     .await?;
/// ```
pub struct Retry<'a> {
    attempts: u32,
    backoff: BackoffConfig,
    retry_if: Option<RetryPredicate<'a>>,
    on_retry: Option<RetryHook<'a>>,
}

impl<'a> Retry<'a> {
    /// Creates an executor allowing `attempts` attempts (at least one).
    pub fn new(attempts: u32) -> Self {
        Self {
            attempts: attempts.max(1),
            backoff: BackoffConfig::default(),
            retry_if: None,
            on_retry: None,
        }
    }

    /// Sets the delay schedule between attempts.
    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }

    /// Replaces the retryability predicate.
    pub fn retry_if(mut self, predicate: impl Fn(&StoreError) -> bool + Send + Sync + 'a) -> Self {
        self.retry_if = Some(Box::new(predicate));
        self
    }

    /// Sets a hook called before each retry sleep with the failed attempt
    /// number (1-indexed) and its error.
    pub fn on_retry(mut self, hook: impl Fn(u32, &StoreError) + Send + Sync + 'a) -> Self {
        self.on_retry = Some(Box::new(hook));
        self
    }

    /// Returns the attempt budget.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    fn should_retry(&self, err: &StoreError) -> bool {
        if err.is_not_found() || err.is_cancellation() {
            return false;
        }
        match &self.retry_if {
            Some(predicate) => predicate(err),
            None => err.is_retryable(),
        }
    }

    /// Runs `operation` until it succeeds, fails permanently, or the budget
    /// is spent. The context aborts both in-flight attempts and sleeps.
    pub async fn run<F, Fut, T>(&self, ctx: &RequestContext, mut operation: F) -> StoreResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = StoreResult<T>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;

            let err = match ctx.run(operation()).await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if attempt >= self.attempts || !self.should_retry(&err) {
                return Err(err);
            }

            if let Some(hook) = &self.on_retry {
                hook(attempt, &err);
            }

            ctx.sleep(self.backoff.delay_for_attempt(attempt)).await?;
        }
    }
}

impl std::fmt::Debug for Retry<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Retry")
            .field("attempts", &self.attempts)
            .field("backoff", &self.backoff)
            .field("retry_if", &self.retry_if.is_some())
            .field("on_retry", &self.on_retry.is_some())
            .finish()
    }
}
