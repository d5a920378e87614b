//! Local and remote endpoint descriptors.

use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use super::protocol::NetworkProtocol;

/// Address of one side of a connection or datagram flow.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// IP socket address.
    Inet(SocketAddr),
    /// Unix socket path; `None` for unnamed sockets.
    Unix(Option<PathBuf>),
}

impl Endpoint {
    /// Unnamed unix endpoint (autobound or unbound client sockets).
    pub const fn unnamed() -> Self {
        Self::Unix(None)
    }

    /// `"<address>(<protocol-code>)"`, used for logs and callbacks.
    pub fn host(&self, protocol: NetworkProtocol) -> String {
        format!("{self}({})", protocol.code())
    }

    /// IP address, if any.
    pub fn as_socket_addr(&self) -> Option<SocketAddr> {
        match self {
            Self::Inet(addr) => Some(*addr),
            Self::Unix(_) => None,
        }
    }

    /// Unix path, if any.
    pub fn as_path(&self) -> Option<&Path> {
        match self {
            Self::Inet(_) => None,
            Self::Unix(path) => path.as_deref(),
        }
    }

    #[cfg(unix)]
    pub(crate) fn from_unix(addr: &tokio::net::unix::SocketAddr) -> Self {
        Self::Unix(addr.as_pathname().map(Path::to_path_buf))
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inet(addr) => write!(f, "{addr}"),
            Self::Unix(Some(path)) => write!(f, "{}", path.display()),
            Self::Unix(None) => f.write_str("@"),
        }
    }
}

impl From<SocketAddr> for Endpoint {
    fn from(addr: SocketAddr) -> Self {
        Self::Inet(addr)
    }
}

impl From<PathBuf> for Endpoint {
    fn from(path: PathBuf) -> Self {
        Self::Unix(Some(path))
    }
}
