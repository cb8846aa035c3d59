// ABOUTME: Cancellable per-operation context passed to every runtime call.
// ABOUTME: Wraps a cancellation token and an optional deadline.

use super::error::{CancelReason, RuntimeError};
use futures::{Stream, StreamExt};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Context scoping one or more runtime operations.
///
/// Cloning shares the same token, so cancelling any clone cancels them all.
/// [`OpContext::child`] derives a context that is cancelled with its parent
/// but can also be cancelled on its own.
#[derive(Debug, Clone)]
pub struct OpContext {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl Default for OpContext {
    fn default() -> Self {
        Self::new()
    }
}

impl OpContext {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: None,
        }
    }

    /// Context that expires `timeout` from now.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: Some(Instant::now() + timeout),
        }
    }

    /// Derive a context cancelled together with this one.
    ///
    /// The child keeps the earlier of the two deadlines.
    pub fn child(&self, timeout: Option<Duration>) -> Self {
        let own = timeout.map(|t| Instant::now() + t);
        let deadline = match (self.deadline, own) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        Self {
            token: self.token.child_token(),
            deadline,
        }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns why this context is no longer usable, if it is not.
    pub fn done(&self) -> Option<CancelReason> {
        if self.token.is_cancelled() {
            return Some(CancelReason::Cancelled);
        }
        match self.deadline {
            Some(d) if Instant::now() >= d => Some(CancelReason::DeadlineExceeded),
            _ => None,
        }
    }

    /// Fail fast when the context is already done.
    pub fn check(&self, op: &'static str) -> Result<(), RuntimeError> {
        match self.done() {
            Some(reason) => Err(RuntimeError::Cancelled { op, reason }),
            None => Ok(()),
        }
    }

    /// Run an engine operation under this context.
    ///
    /// The future is never polled when the context is already done. Otherwise
    /// it is dropped as soon as the context is cancelled or the deadline
    /// passes, which aborts the in-flight request.
    pub async fn run<T, F>(&self, op: &'static str, fut: F) -> Result<T, RuntimeError>
    where
        F: Future<Output = Result<T, RuntimeError>>,
    {
        self.check(op)?;

        let deadline = async {
            match self.deadline {
                Some(d) => tokio::time::sleep_until(d).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(RuntimeError::Cancelled {
                op,
                reason: CancelReason::Cancelled,
            }),
            _ = deadline => Err(RuntimeError::Cancelled {
                op,
                reason: CancelReason::DeadlineExceeded,
            }),
            res = fut => res,
        }
    }

    /// Tie a returned stream to this context's cancellation.
    ///
    /// The stream ends early once the context is cancelled; the underlying
    /// engine stream is dropped with it.
    pub fn bind_stream<S>(&self, stream: S) -> impl Stream<Item = S::Item> + Send + 'static
    where
        S: Stream + Send + 'static,
    {
        stream.take_until(self.token.clone().cancelled_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::ErrorKind;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[tokio::test]
    async fn cancelled_context_never_polls() {
        let ctx = OpContext::new();
        ctx.cancel();

        let polled = Arc::new(AtomicBool::new(false));
        let flag = polled.clone();
        let res: Result<(), _> = ctx
            .run("probe", async move {
                flag.store(true, Ordering::SeqCst);
                Ok(())
            })
            .await;

        assert_eq!(res.unwrap_err().kind(), ErrorKind::Cancelled);
        assert!(!polled.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn deadline_aborts_slow_operation() {
        let ctx = OpContext::with_timeout(Duration::from_millis(50));
        let res: Result<(), _> = ctx
            .run("slow", async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(())
            })
            .await;

        match res {
            Err(RuntimeError::Cancelled { reason, .. }) => {
                assert_eq!(reason, CancelReason::DeadlineExceeded)
            }
            other => panic!("expected deadline error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn child_is_cancelled_with_parent() {
        let parent = OpContext::new();
        let child = parent.child(None);
        parent.cancel();
        assert_eq!(child.done(), Some(CancelReason::Cancelled));
    }

    #[tokio::test]
    async fn child_cancel_leaves_parent_alone() {
        let parent = OpContext::new();
        let child = parent.child(Some(Duration::from_secs(5)));
        child.cancel();
        assert!(parent.done().is_none());
        assert!(child.deadline().is_some());
    }

    #[tokio::test]
    async fn bound_stream_stops_on_cancel() {
        let ctx = OpContext::new();
        let stream = futures::stream::iter(vec![1, 2, 3]).chain(futures::stream::pending());
        let mut bound = Box::pin(ctx.bind_stream(stream));

        assert_eq!(bound.next().await, Some(1));
        assert_eq!(bound.next().await, Some(2));
        assert_eq!(bound.next().await, Some(3));
        ctx.cancel();
        assert_eq!(bound.next().await, None);
    }
}
