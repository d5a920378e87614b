//! Cancellable execution context.
//!
//! A [`Context`] is a shared cancellation handle with an optional deadline and
//! optional typed values. Contexts form a tree: cancelling a parent cancels
//! every descendant, cancelling a child never touches its parent or siblings.

use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;

use crate::core::ContextError;

/// Children list is compacted once it grows past this size.
const CHILD_COMPACT_THRESHOLD: usize = 32;

struct Inner {
    cancelled: AtomicBool,
    notify: Notify,
    deadline: Option<Instant>,
    value: Option<Arc<dyn Any + Send + Sync>>,
    parent: Option<Arc<Inner>>,
    children: Mutex<Vec<Weak<Inner>>>,
}

impl Inner {
    fn cancel(&self) {
        if self.cancelled.swap(true, Ordering::AcqRel) {
            return;
        }
        self.notify.notify_waiters();

        let children = std::mem::take(
            &mut *self
                .children
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        for child in children.iter().filter_map(Weak::upgrade) {
            child.cancel();
        }
    }
}

/// Shared cancellation handle. Cloning is cheap; all clones observe and
/// trigger the same cancellation.
#[derive(Clone)]
pub struct Context {
    inner: Arc<Inner>,
}

impl Context {
    /// Root context: no deadline, cancelled only through [`Context::cancel`].
    pub fn background() -> Self {
        Self {
            inner: Arc::new(Inner {
                cancelled: AtomicBool::new(false),
                notify: Notify::new(),
                deadline: None,
                value: None,
                parent: None,
                children: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Derived context inheriting cancellation and deadline.
    pub fn child(&self) -> Self {
        self.derive(None, None)
    }

    /// Derived context that expires after `timeout` (or earlier if the parent does).
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.derive(Some(Instant::now() + timeout), None)
    }

    /// Derived context that expires at `deadline` (or earlier if the parent does).
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        self.derive(Some(deadline), None)
    }

    /// Derived context carrying `value`, retrievable with [`Context::value`].
    pub fn with_value<T: Any + Send + Sync>(&self, value: T) -> Self {
        self.derive(None, Some(Arc::new(value)))
    }

    fn derive(&self, deadline: Option<Instant>, value: Option<Arc<dyn Any + Send + Sync>>) -> Self {
        let deadline = match (self.inner.deadline, deadline) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        let inner = Arc::new(Inner {
            cancelled: AtomicBool::new(false),
            notify: Notify::new(),
            deadline,
            value,
            parent: Some(Arc::clone(&self.inner)),
            children: Mutex::new(Vec::new()),
        });

        {
            let mut children = self
                .inner
                .children
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if self.inner.cancelled.load(Ordering::Acquire) {
                inner.cancelled.store(true, Ordering::Release);
            } else {
                if children.len() >= CHILD_COMPACT_THRESHOLD {
                    children.retain(|c| c.strong_count() > 0);
                }
                children.push(Arc::downgrade(&inner));
            }
        }

        Self { inner }
    }

    /// Cancel this context and all its descendants. Idempotent.
    pub fn cancel(&self) {
        self.inner.cancel();
    }

    /// Deadline, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.inner.deadline
    }

    /// Why the context is done, or `None` while it is still live.
    pub fn err(&self) -> Option<ContextError> {
        if self.inner.cancelled.load(Ordering::Acquire) {
            Some(ContextError::Canceled)
        } else if self.inner.deadline.is_some_and(|d| Instant::now() >= d) {
            Some(ContextError::DeadlineExceeded)
        } else {
            None
        }
    }

    /// Whether the context is cancelled or past its deadline.
    pub fn is_done(&self) -> bool {
        self.err().is_some()
    }

    /// Resolve once the context is cancelled or its deadline passes.
    pub async fn done(&self) {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.inner.cancelled.load(Ordering::Acquire) {
                return;
            }

            match self.inner.deadline {
                Some(deadline) => {
                    if Instant::now() >= deadline {
                        return;
                    }
                    tokio::select! {
                        _ = &mut notified => {}
                        _ = tokio::time::sleep_until(deadline) => return,
                    }
                }
                None => notified.await,
            }
        }
    }

    /// Nearest value of type `T` on the path to the root.
    pub fn value<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        let mut node = Some(&self.inner);
        while let Some(inner) = node {
            if let Some(value) = &inner.value {
                if let Ok(v) = Arc::clone(value).downcast::<T>() {
                    return Some(v);
                }
            }
            node = inner.parent.as_ref();
        }
        None
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::background()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("err", &self.err())
            .field("deadline", &self.inner.deadline)
            .finish()
    }
}
