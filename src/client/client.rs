//! Socket client.
//!
//! [`SocketClient`] holds at most one [`Connection`]. Its configuration is
//! kept across reconnects. `is_connected` is local knowledge only; the next
//! failing read or write is what reports a dead peer.

use std::error::Error;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use tracing::{debug, trace};

use super::dialer;
use crate::config::ClientConfig;
use crate::core::{
    Callbacks, ClientError, ConfigError, ConnState, ConnectionError, ContextError, Endpoint,
    PeerGone, error_filter,
};
use crate::transport::{ClientTls, Connection, Context, SocketHook};

/// Client for any supported network kind.
pub struct SocketClient {
    config: ClientConfig,
    tls: ArcSwapOption<ClientTls>,
    hook: Option<SocketHook>,
    conn: ArcSwapOption<Connection>,
    callbacks: Arc<Callbacks>,
}

impl SocketClient {
    /// Validate `config` and build a client. Nothing is dialed yet.
    pub fn new(hook: Option<SocketHook>, config: ClientConfig) -> Result<Self, ClientError> {
        config.validate().map_err(|err| match err {
            ConfigError::InvalidAddress(msg) => ClientError::InvalidAddress(msg),
            other => ClientError::Config(other),
        })?;
        let tls = ArcSwapOption::from(config.tls.clone().map(Arc::new));
        Ok(Self {
            config,
            tls,
            hook,
            conn: ArcSwapOption::empty(),
            callbacks: Arc::new(Callbacks::new()),
        })
    }

    /// Configuration snapshot (TLS as configured at construction).
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Enable or disable TLS for the next [`connect`](Self::connect).
    /// Enabling without a configuration, or on a non-TCP network, fails
    /// before any network activity.
    pub fn set_tls(
        &self,
        enable: bool,
        config: Option<Arc<rustls::ClientConfig>>,
        server_name: &str,
    ) -> Result<(), ClientError> {
        if !enable {
            self.tls.store(None);
            return Ok(());
        }
        let Some(config) = config else {
            return Err(ConfigError::InvalidTls("TLS enabled without configuration".into()).into());
        };
        if !self.config.network.is_tcp() {
            return Err(ConfigError::InvalidTls(format!(
                "TLS is not available over {}",
                self.config.network
            ))
            .into());
        }
        self.tls
            .store(Some(Arc::new(ClientTls::new(config, server_name)?)));
        Ok(())
    }

    /// Dial and replace any previous connection. The connection context is
    /// derived from `ctx`.
    pub async fn connect(&self, ctx: &Context) -> Result<(), ClientError> {
        if let Some(err) = ctx.err() {
            return Err(err.into());
        }

        let (local, remote) = dialer::target(&self.config).await?;
        self.callbacks.info(&local, &remote, ConnState::Dial);

        let tls = self.tls.load_full();
        let dialed = tokio::select! {
            _ = ctx.done() => Err(ctx.err().unwrap_or(ContextError::Canceled).into()),
            res = dialer::dial(&self.config, tls.as_deref(), self.hook.as_ref(), ctx) => res,
        };

        let conn = match dialed {
            Ok(conn) => conn,
            Err(err) => {
                debug!(%err, address = %self.config.address, "dial failed");
                self.callbacks.info(&local, &remote, ConnState::Error);
                self.callbacks.error(&[&err]);
                return Err(err);
            }
        };

        let callbacks = Arc::clone(&self.callbacks);
        let (local, remote) = (conn.local().clone(), conn.remote().clone());
        conn.on_release(move || callbacks.info(&local, &remote, ConnState::Close));
        self.callbacks.info(conn.local(), conn.remote(), ConnState::New);
        trace!(remote = %conn.remote_host(), "connected");

        if let Some(old) = self.conn.swap(Some(Arc::new(conn))) {
            self.report(old.close().await.err());
        }
        Ok(())
    }

    /// Whether a connection is held and not known to be torn down.
    pub fn is_connected(&self) -> bool {
        self.conn
            .load()
            .as_ref()
            .is_some_and(|conn| conn.is_connected())
    }

    /// Current connection, if any.
    pub fn connection(&self) -> Option<Connection> {
        self.conn.load_full().map(|conn| (*conn).clone())
    }

    fn current(&self) -> Result<Arc<Connection>, ClientError> {
        let conn = self.conn.load_full().ok_or(ClientError::NoInstance)?;
        if conn.is_closed() {
            return Err(ClientError::NotConnected);
        }
        Ok(conn)
    }

    /// Read from the current connection.
    pub async fn read(&self, buf: &mut [u8]) -> Result<usize, ClientError> {
        let conn = self.current()?;
        conn.read(buf).await.map_err(|err| self.io_error(err))
    }

    /// Write to the current connection. A torn-down connection yields
    /// [`ClientError::NotConnected`] without any I/O.
    pub async fn write(&self, buf: &[u8]) -> Result<usize, ClientError> {
        let conn = self.current()?;
        conn.write(buf).await.map_err(|err| self.io_error(err))
    }

    /// Connect if needed, send `request`, then hand the connection to
    /// `response`. The exchange is bounded by `ctx`; the connection is closed
    /// afterwards whatever happens. Nothing is retried.
    pub async fn once<F, Fut, T>(
        &self,
        ctx: &Context,
        request: &[u8],
        response: F,
    ) -> Result<T, ClientError>
    where
        F: FnOnce(Connection) -> Fut,
        Fut: Future<Output = Result<T, ConnectionError>>,
    {
        if !self.is_connected() {
            self.connect(ctx).await?;
        }
        let conn = self.current()?;

        let exchange = async {
            conn.write_all(request)
                .await
                .map_err(|err| self.io_error(err))?;
            response((*conn).clone())
                .await
                .map_err(|err| self.io_error(err))
        };
        // Biased, so a context already done wins before any byte is sent.
        let res = tokio::select! {
            biased;
            _ = ctx.done() => Err(ctx.err().unwrap_or(ContextError::Canceled).into()),
            res = exchange => res,
        };

        let closed = self.close().await;
        let value = res?;
        closed.map(|()| value)
    }

    /// Close the current connection, if any. Idempotent.
    pub async fn close(&self) -> Result<(), ClientError> {
        let Some(conn) = self.conn.swap(None) else {
            return Ok(());
        };
        match error_filter(conn.close().await.err()) {
            Some(err) => Err(err.into()),
            None => Ok(()),
        }
    }

    fn io_error(&self, err: ConnectionError) -> ClientError {
        if err.is_closed() {
            return ClientError::NotConnected;
        }
        if !err.is_peer_gone() {
            self.callbacks.error(&[&err]);
        }
        ClientError::Connection(err)
    }

    fn report(&self, err: Option<ConnectionError>) {
        if let Some(err) = error_filter(err) {
            self.callbacks.error(&[&err]);
        }
    }

    /// Replace the error callback.
    pub fn register_func_error<F>(&self, f: F)
    where
        F: Fn(&[&dyn Error]) + Send + Sync + 'static,
    {
        self.callbacks.register_error(f);
    }

    /// Replace the connection info callback.
    pub fn register_func_info<F>(&self, f: F)
    where
        F: Fn(&Endpoint, &Endpoint, ConnState) + Send + Sync + 'static,
    {
        self.callbacks.register_info(f);
    }
}

impl fmt::Debug for SocketClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SocketClient")
            .field("config", &self.config)
            .field("tls", &self.tls.load().is_some())
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}
