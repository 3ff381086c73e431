//! Ambient cancellation and deadline for store operations.

use crate::error::{StoreError, StoreResult};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Cancellation signal and optional deadline carried by every operation.
///
/// Clones share the same token. [`RequestContext::child`] derives a context
/// that is cancelled with its parent but can also be cancelled on its own.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl RequestContext {
    /// Creates a context that is never cancelled and has no deadline.
    pub fn background() -> Self {
        Self::default()
    }

    /// Creates a context that expires after `timeout`.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::background().timeout(timeout)
    }

    /// Derives a context with a deadline at most `timeout` from now.
    pub fn timeout(&self, timeout: Duration) -> Self {
        self.deadline(Instant::now() + timeout)
    }

    /// Derives a context expiring at `deadline`, or earlier if the parent does.
    pub fn deadline(&self, deadline: Instant) -> Self {
        let deadline = match self.deadline {
            Some(existing) if existing < deadline => existing,
            _ => deadline,
        };
        Self {
            token: self.token.child_token(),
            deadline: Some(deadline),
        }
    }

    /// Derives a context cancelled together with this one.
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    /// Cancels this context and every context derived from it.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Returns the deadline, if any.
    pub fn deadline_at(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns true once the context is cancelled or its deadline passed.
    pub fn is_done(&self) -> bool {
        self.err().is_some()
    }

    /// Returns the error describing why the context is done, if it is.
    pub fn err(&self) -> Option<StoreError> {
        if self.token.is_cancelled() {
            return Some(StoreError::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(StoreError::DeadlineExceeded),
            _ => None,
        }
    }

    /// Resolves when the context is done, yielding the reason.
    pub async fn done(&self) -> StoreError {
        match self.deadline {
            Some(deadline) => tokio::select! {
                _ = self.token.cancelled() => StoreError::Cancelled,
                _ = tokio::time::sleep_until(deadline) => StoreError::DeadlineExceeded,
            },
            None => {
                self.token.cancelled().await;
                StoreError::Cancelled
            }
        }
    }

    /// Runs `fut` until it completes or the context is done.
    pub async fn run<F, T>(&self, fut: F) -> StoreResult<T>
    where
        F: Future<Output = StoreResult<T>>,
    {
        if let Some(err) = self.err() {
            return Err(err);
        }
        tokio::select! {
            biased;
            err = self.done() => Err(err),
            result = fut => result,
        }
    }

    /// Sleeps for `duration` unless the context ends first.
    pub async fn sleep(&self, duration: Duration) -> StoreResult<()> {
        if duration.is_zero() {
            return match self.err() {
                Some(err) => Err(err),
                None => Ok(()),
            };
        }
        self.run(async {
            tokio::time::sleep(duration).await;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn background_never_done() {
        let ctx = RequestContext::background();
        assert!(!ctx.is_done());
        let value = ctx.run(async { Ok(7) }).await.unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn cancel_propagates_to_children() {
        let parent = RequestContext::background();
        let child = parent.child();
        parent.cancel();
        assert!(matches!(child.err(), Some(StoreError::Cancelled)));
    }

    #[tokio::test]
    async fn child_cancel_leaves_parent() {
        let parent = RequestContext::background();
        let child = parent.child();
        child.cancel();
        assert!(child.is_done());
        assert!(!parent.is_done());
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_aborts_pending_work() {
        let ctx = RequestContext::with_timeout(Duration::from_millis(50));
        let result: StoreResult<()> = ctx
            .run(async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(StoreError::DeadlineExceeded)));
    }

    #[tokio::test(start_paused = true)]
    async fn derived_deadline_never_extends_parent() {
        let parent = RequestContext::with_timeout(Duration::from_millis(10));
        let child = parent.timeout(Duration::from_secs(60));
        assert_eq!(child.deadline_at(), parent.deadline_at());
    }

    #[tokio::test]
    async fn cancelled_sleep_returns_error() {
        let ctx = RequestContext::background();
        ctx.cancel();
        let result = ctx.sleep(Duration::from_secs(5)).await;
        assert!(matches!(result, Err(StoreError::Cancelled)));
    }
}
