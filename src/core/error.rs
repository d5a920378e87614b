//! Error types for the socket core.
//!
//! One enum per layer: configuration, context, connection wrapper, server and
//! client. Every enum implements [`PeerGone`] so callers can filter the
//! "connection is gone" family with [`error_filter`](super::error_filter).

use std::io;

use thiserror::Error;

use super::constants::MAX_GID;
use super::state::PeerGone;

/// Configuration errors. Raised before any socket operation, never retried.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Address is empty, malformed, unresolvable or of the wrong family.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// Unknown network kind, or one unsupported on this platform.
    #[error("invalid network protocol: {0}")]
    InvalidProtocol(String),

    /// TLS requested without usable settings, or on a non-TCP network.
    #[error("invalid TLS configuration: {0}")]
    InvalidTls(String),

    /// Unix socket group id above [`MAX_GID`].
    #[error("invalid unix group id {0} (max {max})", max = MAX_GID)]
    InvalidGroup(u32),

    /// Unix socket path unusable (e.g. an existing non-socket file).
    #[error("invalid unix socket file: {0}")]
    InvalidUnixFile(String),
}

/// Why a [`Context`](crate::transport::Context) is done.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ContextError {
    /// Cancelled explicitly or through a parent.
    #[error("context canceled")]
    Canceled,

    /// Deadline elapsed.
    #[error("context deadline exceeded")]
    DeadlineExceeded,
}

/// Errors returned by a [`Connection`](crate::transport::Connection).
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// The wrapper is closed; no I/O was attempted.
    #[error("connection closed")]
    Closed,

    /// The connection context is done.
    #[error(transparent)]
    Context(#[from] ContextError),

    /// Underlying socket error.
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    /// An error forced a close, and the close failed too.
    #[error("{error}, {close}")]
    CloseFailed {
        /// Error that triggered the close.
        #[source]
        error: Box<ConnectionError>,
        /// Error returned by the close itself.
        close: io::Error,
    },
}

impl ConnectionError {
    /// Whether this is the closed-wrapper signal.
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }
}

impl PeerGone for ConnectionError {
    fn is_peer_gone(&self) -> bool {
        match self {
            Self::Closed => true,
            Self::Context(_) => false,
            Self::Io(e) => e.is_peer_gone(),
            Self::CloseFailed { error, close } => error.is_peer_gone() && close.is_peer_gone(),
        }
    }
}

/// Server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Invalid configuration; nothing was bound.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Listener could not be created. Fatal for `listen`.
    #[error("bind failed on {address}: {source}")]
    Bind {
        /// Address that was being bound.
        address: String,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// Accept or receive failed on the listener itself.
    #[error("accept failed: {0}")]
    Accept(#[source] io::Error),

    /// `listen` called while the server is already running.
    #[error("server is already running")]
    AlreadyRunning,

    /// Graceful drain did not finish before the deadline.
    #[error("timeout on stopping server")]
    ShutdownTimeout,

    /// TLS handshake with a peer failed.
    #[error("TLS handshake failed: {0}")]
    Tls(#[source] io::Error),

    /// Connection wrapper error.
    #[error("connection error: {0}")]
    Connection(#[from] ConnectionError),

    /// Other I/O error.
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

impl PeerGone for ServerError {
    fn is_peer_gone(&self) -> bool {
        match self {
            Self::Accept(e) | Self::Tls(e) | Self::Io(e) => e.is_peer_gone(),
            Self::Connection(e) => e.is_peer_gone(),
            _ => false,
        }
    }
}

/// Client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The client holds no connection; call `connect` first.
    #[error("no connection instance")]
    NoInstance,

    /// The connection exists but has been torn down.
    #[error("not connected")]
    NotConnected,

    /// Dial address missing or unusable.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// Dialing failed.
    #[error("dial {address} failed: {source}")]
    Dial {
        /// Address that was dialed.
        address: String,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// TLS handshake failed.
    #[error("TLS handshake failed: {0}")]
    Tls(#[source] io::Error),

    /// Caller context done before the operation finished.
    #[error(transparent)]
    Context(#[from] ContextError),

    /// Connection wrapper error.
    #[error("connection error: {0}")]
    Connection(#[from] ConnectionError),
}

impl PeerGone for ClientError {
    fn is_peer_gone(&self) -> bool {
        match self {
            Self::NotConnected => true,
            Self::Dial { source, .. } => source.is_peer_gone(),
            Self::Tls(e) => e.is_peer_gone(),
            Self::Connection(e) => e.is_peer_gone(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error_filter;

    #[test]
    fn test_closed_connection_is_filtered() {
        assert!(error_filter(Some(ConnectionError::Closed)).is_none());
        assert!(ConnectionError::Closed.is_closed());
    }

    #[test]
    fn test_context_error_is_kept() {
        let err = ConnectionError::from(ContextError::Canceled);
        assert!(!err.is_peer_gone());
        assert_eq!(err.to_string(), "context canceled");
    }

    #[test]
    fn test_close_failed_message() {
        let err = ConnectionError::CloseFailed {
            error: Box::new(ConnectionError::Io(io::Error::other("boom"))),
            close: io::Error::other("close boom"),
        };
        assert_eq!(err.to_string(), "i/o error: boom, close boom");
        assert!(!err.is_peer_gone());
    }

    #[test]
    fn test_server_errors() {
        assert!(!ServerError::ShutdownTimeout.is_peer_gone());
        let reset = ServerError::Accept(io::Error::from(io::ErrorKind::ConnectionReset));
        assert!(reset.is_peer_gone());
        assert_eq!(
            ServerError::from(ConfigError::InvalidAddress(String::new())).to_string(),
            "configuration error: invalid address: "
        );
    }

    #[test]
    fn test_client_errors_are_distinct() {
        assert_ne!(
            ClientError::NoInstance.to_string(),
            ClientError::NotConnected.to_string()
        );
        assert!(ClientError::NotConnected.is_peer_gone());
        assert!(!ClientError::InvalidAddress("x".into()).is_peer_gone());
    }

    #[test]
    fn test_invalid_group_message() {
        assert_eq!(
            ConfigError::InvalidGroup(40000).to_string(),
            "invalid unix group id 40000 (max 32767)"
        );
    }
}
