//! Binding listeners and datagram sockets.

use std::io;
#[cfg(unix)]
use std::path::{Path, PathBuf};

use socket2::SockRef;
use tokio::net::{TcpListener, TcpStream};
#[cfg(unix)]
use tokio::net::{UnixDatagram, UnixListener, UnixStream};
use tracing::debug;

use crate::config::ServerConfig;
use crate::core::{Endpoint, NetworkProtocol, ServerError};
use crate::transport::{DatagramSocket, SocketHook, apply_hook};

/// A bound server socket, waiting for its loop.
pub(crate) enum Bound {
    Stream(StreamListener),
    Datagram {
        socket: DatagramSocket,
        #[cfg(unix)]
        file: Option<SocketFile>,
    },
}

impl Bound {
    pub(crate) fn local_endpoint(&self) -> io::Result<Endpoint> {
        match self {
            Self::Stream(listener) => listener.local_endpoint(),
            Self::Datagram { socket, .. } => socket.local_endpoint(),
        }
    }
}

/// Bind the socket described by `config`. Datagram sockets go through `hook`
/// here, once; stream connections go through it per accept.
pub(crate) async fn bind(config: &ServerConfig, hook: Option<&SocketHook>) -> Result<Bound, ServerError> {
    let bind_err = |source: io::Error| ServerError::Bind {
        address: config.address.clone(),
        source,
    };

    match config.network {
        NetworkProtocol::Tcp | NetworkProtocol::Tcp4 | NetworkProtocol::Tcp6 => {
            let addr = config.lookup_addr().await?;
            let listener = TcpListener::bind(addr).await.map_err(bind_err)?;
            Ok(Bound::Stream(StreamListener::Tcp(listener)))
        }
        NetworkProtocol::Udp | NetworkProtocol::Udp4 | NetworkProtocol::Udp6 => {
            let addr = config.lookup_addr().await?;
            let socket = DatagramSocket::bind_udp(addr).await.map_err(bind_err)?;
            apply_hook(hook, socket.sock_ref());
            Ok(Bound::Datagram {
                socket,
                #[cfg(unix)]
                file: None,
            })
        }
        #[cfg(unix)]
        NetworkProtocol::Unix => {
            let path = config.unix_path()?;
            SocketFile::prepare(&path)?;
            let listener = UnixListener::bind(&path).map_err(bind_err)?;
            let file = SocketFile(path);
            file.apply_perms(config).map_err(bind_err)?;
            Ok(Bound::Stream(StreamListener::Unix { listener, file }))
        }
        #[cfg(unix)]
        NetworkProtocol::UnixGram => {
            let path = config.unix_path()?;
            SocketFile::prepare(&path)?;
            let socket = DatagramSocket::from(UnixDatagram::bind(&path).map_err(bind_err)?);
            let file = SocketFile(path);
            file.apply_perms(config).map_err(bind_err)?;
            apply_hook(hook, socket.sock_ref());
            Ok(Bound::Datagram {
                socket,
                file: Some(file),
            })
        }
        #[cfg(not(unix))]
        other => Err(crate::core::ConfigError::InvalidProtocol(format!(
            "{other} is not supported on this platform"
        ))
        .into()),
    }
}

/// Stream listener.
pub(crate) enum StreamListener {
    Tcp(TcpListener),
    #[cfg(unix)]
    Unix {
        listener: UnixListener,
        file: SocketFile,
    },
}

/// Accepted stream with its endpoints.
pub(crate) struct Accepted {
    pub(crate) stream: AcceptedStream,
    pub(crate) local: Endpoint,
    pub(crate) remote: Endpoint,
}

pub(crate) enum AcceptedStream {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(UnixStream),
}

impl AcceptedStream {
    pub(crate) fn sock_ref(&self) -> SockRef<'_> {
        match self {
            Self::Tcp(s) => SockRef::from(s),
            #[cfg(unix)]
            Self::Unix(s) => SockRef::from(s),
        }
    }
}

impl StreamListener {
    pub(crate) fn local_endpoint(&self) -> io::Result<Endpoint> {
        match self {
            Self::Tcp(l) => l.local_addr().map(Endpoint::from),
            #[cfg(unix)]
            Self::Unix { file, .. } => Ok(Endpoint::from(file.0.clone())),
        }
    }

    pub(crate) async fn accept(&self) -> io::Result<Accepted> {
        match self {
            Self::Tcp(l) => {
                let (stream, remote) = l.accept().await?;
                let local = stream.local_addr()?;
                Ok(Accepted {
                    stream: AcceptedStream::Tcp(stream),
                    local: Endpoint::from(local),
                    remote: Endpoint::from(remote),
                })
            }
            #[cfg(unix)]
            Self::Unix { listener, file } => {
                let (stream, remote) = listener.accept().await?;
                Ok(Accepted {
                    stream: AcceptedStream::Unix(stream),
                    local: Endpoint::from(file.0.clone()),
                    remote: Endpoint::from_unix(&remote),
                })
            }
        }
    }
}

/// Unix socket file, removed when dropped.
#[cfg(unix)]
pub(crate) struct SocketFile(PathBuf);

#[cfg(unix)]
impl SocketFile {
    /// Remove a stale socket file. Anything else at `path` is refused.
    fn prepare(path: &Path) -> Result<(), ServerError> {
        use std::os::unix::fs::FileTypeExt;

        match std::fs::symlink_metadata(path) {
            Ok(meta) if meta.file_type().is_socket() => {
                debug!(path = %path.display(), "removing stale socket file");
                std::fs::remove_file(path).map_err(ServerError::Io)
            }
            Ok(_) => Err(crate::core::ConfigError::InvalidUnixFile(format!(
                "{} exists and is not a socket",
                path.display()
            ))
            .into()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(ServerError::Io(err)),
        }
    }

    fn apply_perms(&self, config: &ServerConfig) -> io::Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let mode = config
            .perm_file
            .unwrap_or(crate::core::constants::DEFAULT_UNIX_PERM);
        std::fs::set_permissions(&self.0, std::fs::Permissions::from_mode(mode))?;
        if let Some(gid) = config.group_perm {
            std::os::unix::fs::chown(&self.0, None, Some(gid))?;
        }
        Ok(())
    }
}

#[cfg(unix)]
impl Drop for SocketFile {
    fn drop(&mut self) {
        if let Err(err) = std::fs::remove_file(&self.0) {
            debug!(path = %self.0.display(), %err, "cannot remove socket file");
        }
    }
}
