//! Lifecycle state shared by stream and datagram servers.
//!
//! The core tracks three things: whether the server accepts work
//! (`running`), whether its accept/receive loop is alive, and how many
//! connections and dispatched tasks are still outstanding. Every decrement
//! wakes shutdown waiters.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use arc_swap::{ArcSwap, ArcSwapOption};
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::debug;

use crate::config::ServerConfig;
use crate::core::constants::DEFAULT_SHUTDOWN_TIMEOUT;
use crate::core::{Callbacks, ConnState, Endpoint, ServerError, error_filter};
use crate::transport::{Connection, Context, SocketHook, TlsSlot};

/// Boxed future returned by a [`Handler`].
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Connection handler. Invoked once per accepted connection or datagram peer
/// flow, on its own task. The connection is closed after it returns.
pub type Handler = Arc<dyn Fn(Connection) -> BoxFuture<'static, ()> + Send + Sync>;

/// Wrap an async closure as a [`Handler`].
pub fn handler_fn<F, Fut>(f: F) -> Handler
where
    F: Fn(Connection) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(move |conn| Box::pin(f(conn)))
}

pub(crate) struct ServerCore {
    pub(crate) config: ServerConfig,
    pub(crate) handler: Handler,
    pub(crate) hook: Option<SocketHook>,
    pub(crate) callbacks: Arc<Callbacks>,
    pub(crate) tls: TlsSlot,
    running: AtomicBool,
    looping: AtomicBool,
    open: AtomicUsize,
    tasks: AtomicUsize,
    drained: Notify,
    stop: ArcSwap<Context>,
    local: ArcSwapOption<Endpoint>,
}

impl ServerCore {
    pub(crate) fn new(config: ServerConfig, handler: Handler, hook: Option<SocketHook>) -> Self {
        let tls = TlsSlot::new(config.tls.clone());
        let stop = Context::background();
        stop.cancel();
        Self {
            config,
            handler,
            hook,
            callbacks: Arc::new(Callbacks::new()),
            tls,
            running: AtomicBool::new(false),
            looping: AtomicBool::new(false),
            open: AtomicUsize::new(0),
            tasks: AtomicUsize::new(0),
            drained: Notify::new(),
            stop: ArcSwap::from_pointee(stop),
            local: ArcSwapOption::empty(),
        }
    }

    pub(crate) fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub(crate) fn is_looping(&self) -> bool {
        self.looping.load(Ordering::Acquire)
    }

    pub(crate) fn is_gone(&self) -> bool {
        !self.looping.load(Ordering::Acquire) && self.tasks.load(Ordering::Acquire) == 0
    }

    pub(crate) fn open_connections(&self) -> usize {
        self.open.load(Ordering::Acquire)
    }

    fn is_drained(&self) -> bool {
        self.is_gone() && self.open_connections() == 0
    }

    pub(crate) fn local_endpoint(&self) -> Option<Endpoint> {
        self.local.load_full().map(|ep| (*ep).clone())
    }

    pub(crate) fn set_local(&self, local: Option<Endpoint>) {
        self.local.store(local.map(Arc::new));
    }

    /// Enter the loop. Returns the loop context, a child of `ctx` that
    /// connection contexts derive from.
    pub(crate) fn begin(&self, ctx: &Context) -> Result<LoopGuard<'_>, ServerError> {
        if self
            .looping
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(ServerError::AlreadyRunning);
        }
        let run = ctx.child();
        self.stop.store(Arc::new(run.clone()));
        self.running.store(true, Ordering::Release);
        Ok(LoopGuard { core: self, run })
    }

    /// Run `handler` for `conn` on the current task and close it afterwards.
    pub(crate) async fn serve(&self, conn: Connection) {
        self.callbacks
            .info(conn.local(), conn.remote(), ConnState::Handler);
        (self.handler)(conn.clone()).await;
        if let Some(err) = error_filter(conn.close().await.err()) {
            self.callbacks.error(&[&err]);
        }
    }

    /// Count `conn` as open until it is released, and report it as new.
    pub(crate) fn track(self: &Arc<Self>, conn: &Connection) {
        self.open.fetch_add(1, Ordering::AcqRel);
        let core = Arc::clone(self);
        let (local, remote) = (conn.local().clone(), conn.remote().clone());
        conn.on_release(move || {
            core.callbacks.info(&local, &remote, ConnState::Close);
            core.open.fetch_sub(1, Ordering::AcqRel);
            core.drained.notify_waiters();
        });
        self.callbacks.info(conn.local(), conn.remote(), ConnState::New);
    }

    /// Spawn `fut` as a dispatched task counted by `is_gone`.
    pub(crate) fn spawn<F>(self: &Arc<Self>, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tasks.fetch_add(1, Ordering::AcqRel);
        let guard = TaskGuard {
            core: Arc::clone(self),
        };
        tokio::spawn(async move {
            let _guard = guard;
            fut.await;
        });
    }

    /// Stop accepting and wait for the drain, bounded by `ctx`'s deadline
    /// or [`DEFAULT_SHUTDOWN_TIMEOUT`].
    pub(crate) async fn shutdown(&self, ctx: &Context) -> Result<(), ServerError> {
        self.callbacks.info_server(format_args!(
            "shutting down {} server on {}",
            self.config.network, self.config.address
        ));
        self.running.store(false, Ordering::Release);
        self.stop.load().cancel();

        let deadline = ctx
            .deadline()
            .unwrap_or_else(|| Instant::now() + DEFAULT_SHUTDOWN_TIMEOUT);

        tokio::select! {
            biased;
            _ = self.drain() => Ok(()),
            _ = tokio::time::sleep_until(deadline) => Err(ServerError::ShutdownTimeout),
            _ = ctx.done() => Err(ServerError::ShutdownTimeout),
        }
    }

    async fn drain(&self) {
        loop {
            let notified = self.drained.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.is_drained() {
                return;
            }
            notified.await;
        }
    }

    /// Resolve once the loop has exited and every task has returned.
    pub(crate) async fn gone(&self) {
        loop {
            let notified = self.drained.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.is_gone() {
                return;
            }
            notified.await;
        }
    }
}

impl fmt::Debug for ServerCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerCore")
            .field("config", &self.config)
            .field("running", &self.is_running())
            .field("gone", &self.is_gone())
            .field("open", &self.open_connections())
            .field("tls", &self.tls)
            .finish_non_exhaustive()
    }
}

/// Held by the accept/receive loop; leaving the loop drops it.
pub(crate) struct LoopGuard<'a> {
    core: &'a ServerCore,
    pub(crate) run: Context,
}

impl Drop for LoopGuard<'_> {
    fn drop(&mut self) {
        self.run.cancel();
        self.core.running.store(false, Ordering::Release);
        self.core.looping.store(false, Ordering::Release);
        self.core.drained.notify_waiters();
        debug!(network = %self.core.config.network, "server loop exited");
    }
}

struct TaskGuard {
    core: Arc<ServerCore>,
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        self.core.tasks.fetch_sub(1, Ordering::AcqRel);
        self.core.drained.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn core() -> Arc<ServerCore> {
        Arc::new(ServerCore::new(
            ServerConfig::default(),
            handler_fn(|_| async {}),
            None,
        ))
    }

    #[tokio::test]
    async fn test_idle_core_is_gone() {
        let core = core();
        assert!(core.is_gone());
        assert!(!core.is_running());
        core.shutdown(&Context::background()).await.unwrap();
    }

    #[tokio::test]
    async fn test_second_loop_is_rejected() {
        let core = core();
        let ctx = Context::background();
        let guard = core.begin(&ctx).unwrap();
        assert!(core.is_running());
        assert!(matches!(core.begin(&ctx), Err(ServerError::AlreadyRunning)));
        assert!(core.is_looping());
        drop(guard);
        assert!(!core.is_looping());
        assert!(core.is_gone());
        assert!(!core.is_running());
    }

    #[tokio::test]
    async fn test_shutdown_times_out_on_stuck_task() {
        let core = core();
        core.spawn(tokio::time::sleep(Duration::from_secs(5)));
        assert!(!core.is_gone());

        let ctx = Context::background().with_timeout(Duration::from_millis(50));
        let err = core.shutdown(&ctx).await.unwrap_err();
        assert!(matches!(err, ServerError::ShutdownTimeout));
    }

    #[tokio::test]
    async fn test_gone_waits_for_tasks() {
        let core = core();
        core.spawn(tokio::time::sleep(Duration::from_millis(30)));
        tokio::time::timeout(Duration::from_secs(1), core.gone())
            .await
            .unwrap();
        assert!(core.is_gone());
    }
}
