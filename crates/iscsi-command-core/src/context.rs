//! Per-call cancellation and deadline context.
//!
//! Every RPC runs with a [`CallContext`]. The context can be canceled
//! explicitly through a [`CancelHandle`] or expire when its deadline
//! passes. The translator races the subprocess against [`CallContext::done`]
//! and consults [`CallContext::err`] before looking at the exit status.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

/// Why a context finished early.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextError {
    Canceled,
    DeadlineExceeded,
}

impl fmt::Display for ContextError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextError::Canceled => write!(f, "context canceled"),
            ContextError::DeadlineExceeded => write!(f, "context deadline exceeded"),
        }
    }
}

impl std::error::Error for ContextError {}

/// Cancellation and deadline state for a single call.
#[derive(Debug, Clone)]
pub struct CallContext {
    deadline: Option<Instant>,
    canceled: watch::Receiver<bool>,
}

/// Cancels the [`CallContext`] it was created with. Dropping the handle
/// without calling [`CancelHandle::cancel`] leaves the context running.
#[derive(Debug)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

impl CallContext {
    /// A context that is never canceled and has no deadline.
    pub fn background() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self {
            deadline: None,
            canceled: rx,
        }
    }

    /// A context that expires `timeout` from now.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::background().and_deadline(Instant::now() + timeout)
    }

    /// Derive a context that also expires at `deadline`. The earlier of
    /// the existing and the new deadline wins.
    pub fn and_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(existing) => existing.min(deadline),
            None => deadline,
        });
        self
    }

    /// Derive a cancelable context. Cancellation of the parent still
    /// applies to the child.
    pub fn with_cancel(self) -> (Self, CancelHandle) {
        let (tx, rx) = watch::channel(false);
        let tx = Arc::new(tx);
        let mut parent = self.canceled.clone();
        let forward = Arc::clone(&tx);
        tokio::spawn(async move {
            loop {
                if *parent.borrow_and_update() {
                    forward.send_replace(true);
                    return;
                }
                tokio::select! {
                    changed = parent.changed() => {
                        if changed.is_err() {
                            return;
                        }
                    }
                    _ = forward.closed() => return,
                }
            }
        });
        let ctx = Self {
            deadline: self.deadline,
            canceled: rx,
        };
        (ctx, CancelHandle { tx })
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Current state: `None` while the context is live.
    pub fn err(&self) -> Option<ContextError> {
        if *self.canceled.borrow() {
            return Some(ContextError::Canceled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(ContextError::DeadlineExceeded),
            _ => None,
        }
    }

    /// Resolve once the context is canceled or its deadline has passed.
    /// Pending forever for a background context.
    pub async fn done(&self) -> ContextError {
        let mut canceled = self.canceled.clone();
        let cancellation = async move {
            loop {
                if *canceled.borrow_and_update() {
                    return;
                }
                if canceled.changed().await.is_err() {
                    // Every handle is gone, so this context can no longer be canceled.
                    std::future::pending::<()>().await;
                }
            }
        };

        match self.deadline {
            Some(deadline) => tokio::select! {
                _ = cancellation => ContextError::Canceled,
                _ = tokio::time::sleep_until(deadline) => ContextError::DeadlineExceeded,
            },
            None => {
                cancellation.await;
                ContextError::Canceled
            }
        }
    }
}

impl Default for CallContext {
    fn default() -> Self {
        Self::background()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_background_is_live() {
        let ctx = CallContext::background();
        assert_eq!(ctx.err(), None);
        assert!(ctx.deadline().is_none());

        let waited = tokio::time::timeout(Duration::from_millis(50), ctx.done()).await;
        assert!(waited.is_err(), "background context must never finish");
    }

    #[tokio::test]
    async fn test_cancel_is_observed() {
        let (ctx, handle) = CallContext::background().with_cancel();
        assert_eq!(ctx.err(), None);

        handle.cancel();
        assert_eq!(ctx.err(), Some(ContextError::Canceled));
        assert_eq!(ctx.done().await, ContextError::Canceled);
    }

    #[tokio::test]
    async fn test_dropped_handle_does_not_cancel() {
        let (ctx, handle) = CallContext::background().with_cancel();
        drop(handle);

        assert_eq!(ctx.err(), None);
        let waited = tokio::time::timeout(Duration::from_millis(50), ctx.done()).await;
        assert!(waited.is_err());
    }

    #[tokio::test]
    async fn test_deadline_expires() {
        let ctx = CallContext::with_timeout(Duration::from_millis(20));
        assert_eq!(ctx.err(), None);

        assert_eq!(ctx.done().await, ContextError::DeadlineExceeded);
        assert_eq!(ctx.err(), Some(ContextError::DeadlineExceeded));
    }

    #[tokio::test]
    async fn test_cancel_wins_over_later_deadline() {
        let (ctx, handle) = CallContext::with_timeout(Duration::from_secs(30)).with_cancel();
        handle.cancel();
        assert_eq!(ctx.done().await, ContextError::Canceled);
    }

    #[tokio::test]
    async fn test_earlier_deadline_wins() {
        let ctx = CallContext::with_timeout(Duration::from_millis(10))
            .and_deadline(Instant::now() + Duration::from_secs(60));
        assert_eq!(ctx.done().await, ContextError::DeadlineExceeded);
    }

    #[tokio::test]
    async fn test_parent_cancel_reaches_child() {
        let (parent, handle) = CallContext::background().with_cancel();
        let (child, _child_handle) = parent.with_cancel();

        handle.cancel();
        let reason = tokio::time::timeout(Duration::from_secs(1), child.done())
            .await
            .unwrap();
        assert_eq!(reason, ContextError::Canceled);
    }

    #[test]
    fn test_context_error_display() {
        assert_eq!(ContextError::Canceled.to_string(), "context canceled");
        assert_eq!(
            ContextError::DeadlineExceeded.to_string(),
            "context deadline exceeded"
        );
    }
}
