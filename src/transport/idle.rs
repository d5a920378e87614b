//! Per-connection idle watchdog.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::time::Instant;
use tracing::trace;

use super::context::Context;

/// Tracks the last successful I/O of one connection.
#[derive(Debug)]
pub(crate) struct IdleTimer {
    timeout: Duration,
    origin: Instant,
    /// Milliseconds since `origin` of the last activity.
    last: AtomicU64,
}

impl IdleTimer {
    pub(crate) fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            origin: Instant::now(),
            last: AtomicU64::new(0),
        }
    }

    pub(crate) fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Record activity.
    pub(crate) fn touch(&self) {
        let now = self.origin.elapsed().as_millis() as u64;
        self.last.fetch_max(now, Ordering::Relaxed);
    }

    /// Time left before expiry, `None` once expired.
    pub(crate) fn remaining(&self) -> Option<Duration> {
        let last = Duration::from_millis(self.last.load(Ordering::Relaxed));
        let idle = self.origin.elapsed().saturating_sub(last);
        self.timeout.checked_sub(idle).filter(|d| !d.is_zero())
    }
}

/// Spawn a task running `on_expire` once `timer` expires. The task exits
/// silently when `ctx` is done first.
pub(crate) fn watch<F, Fut>(timer: Arc<IdleTimer>, ctx: Context, on_expire: F)
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send,
{
    tokio::spawn(async move {
        while let Some(wait) = timer.remaining() {
            tokio::select! {
                _ = ctx.done() => return,
                _ = tokio::time::sleep(wait) => {}
            }
        }
        trace!(timeout = ?timer.timeout(), "idle timeout reached");
        on_expire().await;
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    #[tokio::test]
    async fn test_touch_extends_deadline() {
        let timer = IdleTimer::new(Duration::from_millis(80));
        tokio::time::sleep(Duration::from_millis(50)).await;
        timer.touch();
        let left = timer.remaining().unwrap();
        assert!(left > Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_watch_fires() {
        let timer = Arc::new(IdleTimer::new(Duration::from_millis(30)));
        let fired = Arc::new(AtomicBool::new(false));
        let f = fired.clone();
        watch(timer, Context::background(), move || async move {
            f.store(true, Ordering::SeqCst);
        });
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(fired.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_watch_stops_on_cancel() {
        let timer = Arc::new(IdleTimer::new(Duration::from_millis(30)));
        let ctx = Context::background();
        let fired = Arc::new(AtomicBool::new(false));
        let f = fired.clone();
        watch(timer, ctx.clone(), move || async move {
            f.store(true, Ordering::SeqCst);
        });
        ctx.cancel();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!fired.load(Ordering::SeqCst));
    }
}
