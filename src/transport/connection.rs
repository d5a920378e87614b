//! Context-wrapping connection.
//!
//! [`Connection`] couples one raw socket with a derived [`Context`]. Every
//! read and write checks the closed flag and the context first, so a closed
//! connection never touches the socket again. Closing is idempotent: exactly
//! one caller cancels the context and releases the handle, everyone else gets
//! `Ok(())`.
//!
//! State machine: `New → {Read, Write} → CloseWrite → CloseRead → Close`.
//! `Close` is absorbing and is reachable from anywhere through
//! [`Connection::close`], context cancellation, the idle watchdog or an
//! unrecoverable I/O error.

use std::any::Any;
use std::fmt;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use arc_swap::ArcSwapOption;
use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::{Mutex as AsyncMutex, mpsc};
use tokio::time::Instant;
use tracing::{debug, trace};

use super::context::Context;
use super::datagram::DatagramSocket;
use super::idle::{self, IdleTimer};
use crate::core::constants::DEFAULT_SHUTDOWN_TIMEOUT;
use crate::core::{
    ConnState, ConnectionError, ContextError, Endpoint, NetworkProtocol, PeerGone, error_filter,
};

/// Byte stream accepted by [`Connection::from_stream`].
pub trait AsyncStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T> AsyncStream for T where T: AsyncRead + AsyncWrite + Send + Unpin {}

type BoxStream = Box<dyn AsyncStream>;

type ReleaseFn = Box<dyn FnOnce() + Send>;

enum Io {
    Stream {
        reader: AsyncMutex<Option<ReadHalf<BoxStream>>>,
        writer: AsyncMutex<Option<WriteHalf<BoxStream>>>,
    },
    Datagram(ArcSwapOption<DatagramSocket>),
    Flow {
        socket: DatagramSocket,
        peer: Endpoint,
        rx: AsyncMutex<Option<mpsc::Receiver<Bytes>>>,
    },
}

impl Io {
    /// `Ok(None)` is end of stream.
    async fn read(&self, buf: &mut [u8]) -> Result<Option<usize>, ConnectionError> {
        match self {
            Self::Stream { reader, .. } => {
                let mut reader = reader.lock().await;
                let reader = reader.as_mut().ok_or(ConnectionError::Closed)?;
                let n = reader.read(buf).await?;
                Ok((n > 0 || buf.is_empty()).then_some(n))
            }
            Self::Datagram(slot) => {
                let socket = slot.load_full().ok_or(ConnectionError::Closed)?;
                loop {
                    let n = socket.recv(buf).await?;
                    if n > 0 || buf.is_empty() {
                        return Ok(Some(n));
                    }
                    trace!("empty datagram dropped");
                }
            }
            Self::Flow { rx, .. } => {
                let mut rx = rx.lock().await;
                let rx = rx.as_mut().ok_or(ConnectionError::Closed)?;
                Ok(rx.recv().await.map(|data| copy_datagram(&data, buf)))
            }
        }
    }

    async fn write(&self, buf: &[u8]) -> Result<usize, ConnectionError> {
        match self {
            Self::Stream { writer, .. } => {
                let mut writer = writer.lock().await;
                let writer = writer.as_mut().ok_or(ConnectionError::Closed)?;
                let n = writer.write(buf).await?;
                writer.flush().await?;
                Ok(n)
            }
            Self::Datagram(slot) => {
                let socket = slot.load_full().ok_or(ConnectionError::Closed)?;
                Ok(socket.send(buf).await?)
            }
            Self::Flow { socket, peer, .. } => Ok(socket.send_to(buf, peer).await?),
        }
    }

    async fn close_write(&self) -> io::Result<()> {
        match self {
            Self::Stream { writer, .. } => {
                let Some(mut writer) = writer.lock().await.take() else {
                    return Ok(());
                };
                tokio::time::timeout(DEFAULT_SHUTDOWN_TIMEOUT, writer.shutdown())
                    .await
                    .unwrap_or_else(|_| {
                        Err(io::Error::new(io::ErrorKind::TimedOut, "stream shutdown timed out"))
                    })
            }
            Self::Datagram(slot) => {
                slot.store(None);
                Ok(())
            }
            Self::Flow { .. } => Ok(()),
        }
    }

    async fn close_read(&self) {
        match self {
            Self::Stream { reader, .. } => drop(reader.lock().await.take()),
            Self::Datagram(_) => {}
            Self::Flow { rx, .. } => drop(rx.lock().await.take()),
        }
    }
}

fn copy_datagram(data: &[u8], buf: &mut [u8]) -> usize {
    let n = data.len().min(buf.len());
    buf[..n].copy_from_slice(&data[..n]);
    if n < data.len() {
        trace!(len = data.len(), kept = n, "datagram truncated");
    }
    n
}

struct Inner {
    protocol: NetworkProtocol,
    local: Endpoint,
    remote: Endpoint,
    ctx: Context,
    closed: AtomicBool,
    state: AtomicU8,
    io: Io,
    idle: Option<Arc<IdleTimer>>,
    release: Mutex<Option<ReleaseFn>>,
}

impl Inner {
    fn release(&self) {
        let release = self
            .release
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(release) = release {
            release();
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.ctx.cancel();
        self.release();
    }
}

/// Context-aware, idempotently closable, idle-bounded connection.
///
/// Clones share the same socket and state; a clone may read while another
/// writes.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<Inner>,
}

impl Connection {
    /// Wrap a byte stream. The connection context is a child of `parent`.
    pub fn from_stream<S>(
        stream: S,
        parent: &Context,
        protocol: NetworkProtocol,
        local: Endpoint,
        remote: Endpoint,
        idle_timeout: Option<Duration>,
    ) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let (reader, writer) = tokio::io::split(Box::new(stream) as BoxStream);
        let io = Io::Stream {
            reader: AsyncMutex::new(Some(reader)),
            writer: AsyncMutex::new(Some(writer)),
        };
        Self::with_io(io, parent, protocol, local, remote, idle_timeout)
    }

    /// Wrap a connected datagram socket.
    pub fn from_datagram(
        socket: DatagramSocket,
        parent: &Context,
        protocol: NetworkProtocol,
        idle_timeout: Option<Duration>,
    ) -> io::Result<Self> {
        let local = socket.local_endpoint()?;
        let remote = socket.peer_endpoint()?;
        let io = Io::Datagram(ArcSwapOption::from_pointee(socket));
        Ok(Self::with_io(io, parent, protocol, local, remote, idle_timeout))
    }

    /// One peer flow on a shared server socket; datagrams arrive through `rx`.
    pub(crate) fn from_flow(
        socket: DatagramSocket,
        peer: Endpoint,
        rx: mpsc::Receiver<Bytes>,
        parent: &Context,
        protocol: NetworkProtocol,
        local: Endpoint,
        idle_timeout: Option<Duration>,
    ) -> Self {
        let io = Io::Flow {
            socket,
            peer: peer.clone(),
            rx: AsyncMutex::new(Some(rx)),
        };
        Self::with_io(io, parent, protocol, local, peer, idle_timeout)
    }

    fn with_io(
        io: Io,
        parent: &Context,
        protocol: NetworkProtocol,
        local: Endpoint,
        remote: Endpoint,
        idle_timeout: Option<Duration>,
    ) -> Self {
        let inner = Arc::new(Inner {
            protocol,
            local,
            remote,
            ctx: parent.child(),
            closed: AtomicBool::new(false),
            state: AtomicU8::new(ConnState::New.as_u8()),
            io,
            idle: idle_timeout.map(|t| Arc::new(IdleTimer::new(t))),
            release: Mutex::new(None),
        });

        if let Some(timer) = &inner.idle {
            let weak = Arc::downgrade(&inner);
            idle::watch(Arc::clone(timer), inner.ctx.clone(), move || async move {
                if let Some(inner) = weak.upgrade() {
                    let conn = Connection { inner };
                    debug!(remote = %conn.remote_host(), "closing idle connection");
                    if let Err(err) = conn.close().await {
                        debug!(%err, "idle close failed");
                    }
                }
            });
        }

        Self { inner }
    }

    /// Run `f` once, when the connection is closed or dropped.
    pub(crate) fn on_release<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        *self
            .inner
            .release
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Box::new(f));
    }

    /// Network kind.
    pub fn protocol(&self) -> NetworkProtocol {
        self.inner.protocol
    }

    /// Local endpoint.
    pub fn local(&self) -> &Endpoint {
        &self.inner.local
    }

    /// Remote endpoint.
    pub fn remote(&self) -> &Endpoint {
        &self.inner.remote
    }

    /// `"<local address>(<protocol>)"`.
    pub fn local_host(&self) -> String {
        self.inner.local.host(self.inner.protocol)
    }

    /// `"<remote address>(<protocol>)"`.
    pub fn remote_host(&self) -> String {
        self.inner.remote.host(self.inner.protocol)
    }

    /// Last lifecycle transition.
    pub fn state(&self) -> ConnState {
        ConnState::from_u8(self.inner.state.load(Ordering::Acquire))
    }

    /// Derived context of this connection.
    pub fn context(&self) -> &Context {
        &self.inner.ctx
    }

    /// Whether the closed flag is set.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Not closed and context still live.
    pub fn is_connected(&self) -> bool {
        !self.is_closed() && self.inner.ctx.err().is_none()
    }

    /// `Closed` once the flag is set, even before the context reports
    /// cancellation; otherwise the context error, if any.
    pub fn err(&self) -> Option<ConnectionError> {
        if self.is_closed() {
            Some(ConnectionError::Closed)
        } else {
            self.inner.ctx.err().map(ConnectionError::from)
        }
    }

    /// Context deadline.
    pub fn deadline(&self) -> Option<Instant> {
        self.inner.ctx.deadline()
    }

    /// Resolve once the connection is closed or its context is done.
    pub async fn done(&self) {
        self.inner.ctx.done().await;
    }

    /// Context value lookup.
    pub fn value<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.inner.ctx.value::<T>()
    }

    /// Read into `buf`. `Ok(0)` on a non-empty buffer means the peer ended the
    /// stream; the connection is closed at that point.
    pub async fn read(&self, buf: &mut [u8]) -> Result<usize, ConnectionError> {
        self.guard().await?;
        self.transition(ConnState::Read);

        let res = tokio::select! {
            biased;
            _ = self.inner.ctx.done() => return Err(self.interrupted().await),
            res = self.inner.io.read(buf) => res,
        };

        match res {
            Ok(Some(n)) => {
                self.touch();
                Ok(n)
            }
            Ok(None) => {
                trace!(remote = %self.remote_host(), "end of stream");
                if let Err(err) = self.close_inner().await {
                    debug!(%err, "close after end of stream failed");
                }
                Ok(0)
            }
            Err(_) if self.is_closed() => Err(ConnectionError::Closed),
            Err(err) => {
                self.transition(ConnState::Error);
                Err(self.close_with(err).await)
            }
        }
    }

    /// Write from `buf`. Generic errors leave the connection open so the
    /// caller may retry; a zero-length write or a gone peer closes it.
    pub async fn write(&self, buf: &[u8]) -> Result<usize, ConnectionError> {
        self.guard().await?;
        if buf.is_empty() {
            return Ok(0);
        }
        self.transition(ConnState::Write);

        let res = tokio::select! {
            biased;
            _ = self.inner.ctx.done() => return Err(self.interrupted().await),
            res = self.inner.io.write(buf) => res,
        };

        match res {
            Ok(0) => {
                if let Err(err) = self.close_inner().await {
                    debug!(%err, "close after zero write failed");
                }
                Ok(0)
            }
            Ok(n) => {
                self.touch();
                Ok(n)
            }
            Err(_) if self.is_closed() => Err(ConnectionError::Closed),
            Err(err) if err.is_peer_gone() => {
                self.transition(ConnState::Error);
                Err(self.close_with(err).await)
            }
            Err(err) => Err(err),
        }
    }

    /// Write the whole buffer.
    pub async fn write_all(&self, mut buf: &[u8]) -> Result<(), ConnectionError> {
        while !buf.is_empty() {
            match self.write(buf).await? {
                0 => return Err(io::Error::from(io::ErrorKind::WriteZero).into()),
                n => buf = &buf[n..],
            }
        }
        Ok(())
    }

    /// Close the connection. Idempotent and safe to call concurrently; only
    /// the first caller releases the socket. Peer-gone errors from the
    /// release are swallowed.
    pub async fn close(&self) -> Result<(), ConnectionError> {
        self.close_inner().await.map_err(ConnectionError::from)
    }

    async fn close_inner(&self) -> io::Result<()> {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        // Wake blocked readers and writers so they drop their half.
        self.inner.ctx.cancel();

        self.set_state(ConnState::CloseWrite);
        let res = self.inner.io.close_write().await;
        self.set_state(ConnState::CloseRead);
        self.inner.io.close_read().await;
        self.set_state(ConnState::Close);

        trace!(remote = %self.remote_host(), "connection closed");
        self.inner.release();

        match error_filter(res.err()) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn guard(&self) -> Result<(), ConnectionError> {
        if self.is_closed() {
            return Err(ConnectionError::Closed);
        }
        if let Some(err) = self.inner.ctx.err() {
            return Err(self.close_with(err.into()).await);
        }
        Ok(())
    }

    async fn interrupted(&self) -> ConnectionError {
        if self.is_closed() {
            return ConnectionError::Closed;
        }
        let err = self.inner.ctx.err().unwrap_or(ContextError::Canceled);
        self.close_with(err.into()).await
    }

    async fn close_with(&self, error: ConnectionError) -> ConnectionError {
        match self.close_inner().await {
            Ok(()) => error,
            Err(close) => ConnectionError::CloseFailed {
                error: Box::new(error),
                close,
            },
        }
    }

    fn touch(&self) {
        if let Some(idle) = &self.inner.idle {
            idle.touch();
        }
    }

    fn set_state(&self, state: ConnState) {
        self.inner.state.store(state.as_u8(), Ordering::Release);
    }

    fn transition(&self, state: ConnState) {
        if !self.is_closed() {
            self.set_state(state);
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("protocol", &self.inner.protocol)
            .field("local", &self.inner.local)
            .field("remote", &self.inner.remote)
            .field("state", &self.state())
            .field("closed", &self.is_closed())
            .finish()
    }
}
