//! Dialing per network kind.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use socket2::SockRef;
use tokio::net::{TcpStream, UdpSocket};
#[cfg(unix)]
use tokio::net::{UnixDatagram, UnixStream};

use crate::config::ClientConfig;
use crate::core::{ClientError, Endpoint, NetworkProtocol};
use crate::transport::{ClientTls, Connection, Context, DatagramSocket, SocketHook, apply_hook};

/// Target of a dial, for callbacks before a socket exists.
pub(crate) async fn target(config: &ClientConfig) -> Result<(Endpoint, Endpoint), ClientError> {
    if config.network.is_unix() {
        let path = config.unix_path()?;
        Ok((Endpoint::unnamed(), Endpoint::from(path)))
    } else {
        let addr = config.lookup_addr().await?;
        Ok((Endpoint::from(unspecified(&addr)), Endpoint::from(addr)))
    }
}

fn unspecified(peer: &SocketAddr) -> SocketAddr {
    let ip = match peer {
        SocketAddr::V4(_) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        SocketAddr::V6(_) => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
    };
    SocketAddr::new(ip, 0)
}

/// Open a connection as described by `config`, with its context derived
/// from `ctx`.
pub(crate) async fn dial(
    config: &ClientConfig,
    tls: Option<&ClientTls>,
    hook: Option<&SocketHook>,
    ctx: &Context,
) -> Result<Connection, ClientError> {
    let network = config.network;
    let dial_err = |source: std::io::Error| ClientError::Dial {
        address: config.address.clone(),
        source,
    };

    match network {
        NetworkProtocol::Tcp | NetworkProtocol::Tcp4 | NetworkProtocol::Tcp6 => {
            let addr = config.lookup_addr().await?;
            let stream = TcpStream::connect(addr).await.map_err(dial_err)?;
            apply_hook(hook, SockRef::from(&stream));
            let local = Endpoint::from(stream.local_addr().map_err(dial_err)?);
            let remote = Endpoint::from(addr);

            match tls {
                Some(tls) => {
                    let stream = tls.connect(stream).await.map_err(ClientError::Tls)?;
                    Ok(Connection::from_stream(stream, ctx, network, local, remote, None))
                }
                None => Ok(Connection::from_stream(stream, ctx, network, local, remote, None)),
            }
        }
        NetworkProtocol::Udp | NetworkProtocol::Udp4 | NetworkProtocol::Udp6 => {
            let addr = config.lookup_addr().await?;
            let socket = UdpSocket::bind(unspecified(&addr))
                .await
                .map_err(dial_err)?;
            socket.connect(addr).await.map_err(dial_err)?;
            let socket = DatagramSocket::from(socket);
            apply_hook(hook, socket.sock_ref());
            Connection::from_datagram(socket, ctx, network, None).map_err(dial_err)
        }
        #[cfg(unix)]
        NetworkProtocol::Unix => {
            let path = config.unix_path()?;
            let stream = UnixStream::connect(&path).await.map_err(dial_err)?;
            apply_hook(hook, SockRef::from(&stream));
            let local = stream
                .local_addr()
                .map(|a| Endpoint::from_unix(&a))
                .map_err(dial_err)?;
            Ok(Connection::from_stream(
                stream,
                ctx,
                network,
                local,
                Endpoint::from(path),
                None,
            ))
        }
        #[cfg(unix)]
        NetworkProtocol::UnixGram => {
            let path = config.unix_path()?;
            let socket = UnixDatagram::unbound().map_err(dial_err)?;
            socket.connect(&path).map_err(dial_err)?;
            let socket = DatagramSocket::from(socket);
            apply_hook(hook, socket.sock_ref());
            Connection::from_datagram(socket, ctx, network, None).map_err(dial_err)
        }
        #[cfg(not(unix))]
        other => Err(crate::core::ConfigError::InvalidProtocol(format!(
            "{other} is not supported on this platform"
        ))
        .into()),
    }
}
