//! Socket servers.
//!
//! [`SocketServer`] combines the shared lifecycle core with a protocol
//! strategy chosen from the configured network: an accept loop for TCP and
//! unix streams, a receive loop with a peer map for UDP and unixgram.
//!
//! # Example
//!
//! ```no_run
//! use sockcore::config::ServerConfigBuilder;
//! use sockcore::server::{SocketServer, handler_fn};
//! use sockcore::transport::Context;
//!
//! # async fn run() -> Result<(), sockcore::core::ServerError> {
//! let config = ServerConfigBuilder::new().address("127.0.0.1:9000").build();
//! let server = SocketServer::new(
//!     None,
//!     handler_fn(|conn| async move {
//!         let mut buf = [0u8; 1024];
//!         while let Ok(n) = conn.read(&mut buf).await {
//!             if n == 0 || conn.write_all(&buf[..n]).await.is_err() {
//!                 break;
//!             }
//!         }
//!     }),
//!     config,
//! )?;
//!
//! let ctx = Context::background();
//! server.listen(&ctx).await
//! # }
//! ```

mod datagram;
mod lifecycle;
mod listener;
mod stream;

pub use lifecycle::{BoxFuture, Handler, handler_fn};

use std::error::Error;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, error};

use self::lifecycle::ServerCore;
use self::listener::Bound;
use crate::config::ServerConfig;
use crate::core::{ConfigError, ConnState, Endpoint, NetworkProtocol, ServerError};
use crate::transport::{Context, SocketHook};

/// Snapshot of the listening side of a server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerInfo {
    /// Network kind.
    pub network: NetworkProtocol,
    /// Configured address.
    pub address: String,
    /// Bound address, while bound.
    pub local: Option<Endpoint>,
    /// Whether new stream connections negotiate TLS.
    pub tls: bool,
}

impl fmt::Display for ListenerInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.local {
            Some(local) => write!(f, "{}", local.host(self.network))?,
            None => write!(f, "{}({})", self.address, self.network.code())?,
        }
        if self.tls {
            f.write_str(" tls")?;
        }
        Ok(())
    }
}

/// Server for any supported network kind.
pub struct SocketServer {
    core: Arc<ServerCore>,
    bound: Mutex<Option<Bound>>,
}

impl SocketServer {
    /// Validate `config` and build a server. Nothing is bound yet.
    pub fn new(
        hook: Option<SocketHook>,
        handler: Handler,
        config: ServerConfig,
    ) -> Result<Self, ServerError> {
        config.validate()?;
        Ok(Self {
            core: Arc::new(ServerCore::new(config, handler, hook)),
            bound: Mutex::new(None),
        })
    }

    /// Configuration snapshot.
    pub fn config(&self) -> &ServerConfig {
        &self.core.config
    }

    /// Bind now instead of in [`listen`](Self::listen), e.g. to learn the
    /// port picked for `127.0.0.1:0`. Binding twice returns the first address;
    /// binding while the loop runs fails with [`ServerError::AlreadyRunning`].
    pub async fn bind(&self) -> Result<Endpoint, ServerError> {
        if self.core.is_looping() {
            return Err(ServerError::AlreadyRunning);
        }
        if let Some(local) = self.core.local_endpoint() {
            if self.lock_bound().is_some() {
                return Ok(local);
            }
        }
        let bound = self.bind_socket().await?;
        let local = bound.local_endpoint()?;
        if self.core.is_looping() {
            return Err(ServerError::AlreadyRunning);
        }
        *self.lock_bound() = Some(bound);
        self.core.set_local(Some(local.clone()));
        Ok(local)
    }

    /// Run the accept or receive loop until `ctx` is cancelled or
    /// [`shutdown`](Self::shutdown) is called. Binds first if needed; a bind
    /// failure is fatal.
    pub async fn listen(&self, ctx: &Context) -> Result<(), ServerError> {
        let guard = self.core.begin(ctx)?;

        let bound = self.lock_bound().take();
        let bound = match bound {
            Some(bound) => bound,
            None => self.bind_socket().await?,
        };
        let local = bound.local_endpoint()?;
        self.core.set_local(Some(local.clone()));

        let network = self.core.config.network;
        debug!(%network, %local, "server listening");
        self.core.callbacks.info_server(format_args!(
            "starting listening socket '{}'",
            local.host(network)
        ));

        let res = match bound {
            Bound::Stream(listener) => stream::accept_loop(&self.core, listener, &guard.run).await,
            Bound::Datagram { socket, .. } => {
                datagram::receive_loop(&self.core, socket, &guard.run).await
            }
        };

        self.core.callbacks.info_server(format_args!(
            "closing listening socket '{}'",
            local.host(network)
        ));
        self.core.set_local(None);
        drop(guard);
        res
    }

    async fn bind_socket(&self) -> Result<Bound, ServerError> {
        listener::bind(&self.core.config, self.core.hook.as_ref())
            .await
            .inspect_err(|err| {
                error!(%err, "bind failed");
                self.core.callbacks.error(&[err as &dyn Error]);
            })
    }

    fn lock_bound(&self) -> std::sync::MutexGuard<'_, Option<Bound>> {
        self.bound.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stop accepting, cancel every connection context, and wait until all
    /// connections are closed and all handlers have returned. The wait is
    /// bounded by `ctx`'s deadline, or one second without one; past it,
    /// [`ServerError::ShutdownTimeout`] is returned and handlers keep running.
    pub async fn shutdown(&self, ctx: &Context) -> Result<(), ServerError> {
        self.lock_bound().take();
        self.core.shutdown(ctx).await
    }

    /// [`shutdown`](Self::shutdown) with the default drain bound.
    pub async fn close(&self) -> Result<(), ServerError> {
        self.shutdown(&Context::background()).await
    }

    /// Whether the loop is accepting work.
    pub fn is_running(&self) -> bool {
        self.core.is_running()
    }

    /// Whether the loop has exited and every dispatched task has returned.
    pub fn is_gone(&self) -> bool {
        self.core.is_gone()
    }

    /// Connections not yet closed.
    pub fn open_connections(&self) -> usize {
        self.core.open_connections()
    }

    /// Resolve once [`is_gone`](Self::is_gone) holds.
    pub async fn done(&self) {
        self.core.gone().await;
    }

    /// Listening side snapshot.
    pub fn listener(&self) -> ListenerInfo {
        ListenerInfo {
            network: self.core.config.network,
            address: self.core.config.address.clone(),
            local: self.core.local_endpoint(),
            tls: self.core.tls.is_enabled(),
        }
    }

    /// Bound address, while bound.
    pub fn local_addr(&self) -> Option<Endpoint> {
        self.core.local_endpoint()
    }

    /// Enable, replace or disable TLS. Applies to handshakes started
    /// afterwards. Enabling without a configuration, or on a non-TCP
    /// network, is a configuration error.
    pub fn set_tls(
        &self,
        enable: bool,
        config: Option<Arc<rustls::ServerConfig>>,
    ) -> Result<(), ServerError> {
        if enable && !self.core.config.network.is_tcp() {
            return Err(ConfigError::InvalidTls(format!(
                "TLS is not available over {}",
                self.core.config.network
            ))
            .into());
        }
        self.core.tls.set(enable, config)?;
        self.core.callbacks.info_server(format_args!(
            "TLS {} on '{}'",
            if enable { "enabled" } else { "disabled" },
            self.core.config.address
        ));
        Ok(())
    }

    /// Replace the error callback.
    pub fn register_func_error<F>(&self, f: F)
    where
        F: Fn(&[&dyn Error]) + Send + Sync + 'static,
    {
        self.core.callbacks.register_error(f);
    }

    /// Replace the connection info callback.
    pub fn register_func_info<F>(&self, f: F)
    where
        F: Fn(&Endpoint, &Endpoint, ConnState) + Send + Sync + 'static,
    {
        self.core.callbacks.register_info(f);
    }

    /// Replace the server info callback.
    pub fn register_func_info_server<F>(&self, f: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.core.callbacks.register_info_server(f);
    }
}

impl fmt::Debug for SocketServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SocketServer")
            .field("core", &self.core)
            .finish_non_exhaustive()
    }
}
