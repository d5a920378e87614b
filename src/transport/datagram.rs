//! Datagram socket wrapper shared by UDP and unix datagram transports.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use socket2::SockRef;
use tokio::net::UdpSocket;
#[cfg(unix)]
use tokio::net::UnixDatagram;

use crate::core::Endpoint;

/// Shared datagram socket. Cloning shares the same kernel socket.
#[derive(Debug, Clone)]
pub enum DatagramSocket {
    /// UDP socket.
    Udp(Arc<UdpSocket>),
    /// Unix datagram socket.
    #[cfg(unix)]
    Unix(Arc<UnixDatagram>),
}

impl DatagramSocket {
    /// Local address.
    pub fn local_endpoint(&self) -> io::Result<Endpoint> {
        match self {
            Self::Udp(s) => s.local_addr().map(Endpoint::from),
            #[cfg(unix)]
            Self::Unix(s) => s.local_addr().map(|a| Endpoint::from_unix(&a)),
        }
    }

    /// Connected peer address.
    pub fn peer_endpoint(&self) -> io::Result<Endpoint> {
        match self {
            Self::Udp(s) => s.peer_addr().map(Endpoint::from),
            #[cfg(unix)]
            Self::Unix(s) => s.peer_addr().map(|a| Endpoint::from_unix(&a)),
        }
    }

    /// Receive from the connected peer.
    pub async fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Udp(s) => s.recv(buf).await,
            #[cfg(unix)]
            Self::Unix(s) => s.recv(buf).await,
        }
    }

    /// Send to the connected peer.
    pub async fn send(&self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Udp(s) => s.send(buf).await,
            #[cfg(unix)]
            Self::Unix(s) => s.send(buf).await,
        }
    }

    /// Receive one datagram and its sender.
    pub async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, Endpoint)> {
        match self {
            Self::Udp(s) => {
                let (n, addr) = s.recv_from(buf).await?;
                Ok((n, Endpoint::from(addr)))
            }
            #[cfg(unix)]
            Self::Unix(s) => {
                let (n, addr) = s.recv_from(buf).await?;
                Ok((n, Endpoint::from_unix(&addr)))
            }
        }
    }

    /// Send one datagram to `peer`. Unnamed unix peers cannot be answered.
    pub async fn send_to(&self, buf: &[u8], peer: &Endpoint) -> io::Result<usize> {
        match (self, peer) {
            (Self::Udp(s), Endpoint::Inet(addr)) => s.send_to(buf, *addr).await,
            #[cfg(unix)]
            (Self::Unix(s), Endpoint::Unix(Some(path))) => s.send_to(buf, path).await,
            #[cfg(unix)]
            (Self::Unix(_), Endpoint::Unix(None)) => Err(io::Error::new(
                io::ErrorKind::AddrNotAvailable,
                "unnamed unix datagram peer",
            )),
            _ => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("peer {peer} does not match socket family"),
            )),
        }
    }

    /// Borrow the raw socket for customization.
    pub fn sock_ref(&self) -> SockRef<'_> {
        match self {
            Self::Udp(s) => SockRef::from(s.as_ref()),
            #[cfg(unix)]
            Self::Unix(s) => SockRef::from(s.as_ref()),
        }
    }

    pub(crate) async fn bind_udp(addr: SocketAddr) -> io::Result<Self> {
        UdpSocket::bind(addr).await.map(Self::from)
    }
}

impl From<UdpSocket> for DatagramSocket {
    fn from(socket: UdpSocket) -> Self {
        Self::Udp(Arc::new(socket))
    }
}

#[cfg(unix)]
impl From<UnixDatagram> for DatagramSocket {
    fn from(socket: UnixDatagram) -> Self {
        Self::Unix(Arc::new(socket))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_udp_send_to_recv_from() {
        let server = DatagramSocket::bind_udp("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        let client = DatagramSocket::bind_udp("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        let server_ep = server.local_endpoint().unwrap();

        client.send_to(b"hello", &server_ep).await.unwrap();
        let mut buf = [0u8; 64];
        let (n, from) = server.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"hello");
        assert_eq!(from, client.local_endpoint().unwrap());
    }

    #[tokio::test]
    async fn test_family_mismatch() {
        let socket = DatagramSocket::bind_udp("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        let err = socket
            .send_to(b"x", &Endpoint::from(std::path::PathBuf::from("/tmp/x")))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_unix_pair() {
        let (a, b) = UnixDatagram::pair().unwrap();
        let (a, b) = (DatagramSocket::from(a), DatagramSocket::from(b));
        a.send(b"ping").await.unwrap();
        let mut buf = [0u8; 8];
        let n = b.recv(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"ping");
        assert_eq!(a.local_endpoint().unwrap(), Endpoint::unnamed());
        assert!(a.send_to(b"x", &Endpoint::unnamed()).await.is_err());
    }
}
