//! Raw socket customization.
//!
//! A [`SocketHook`] receives a borrowed [`SockRef`] of the live socket before
//! the framework takes it over. Stream servers run it once per accepted
//! connection, datagram servers and all clients once at socket creation.

use std::io;
use std::sync::Arc;

use socket2::SockRef;
use tracing::debug;

use crate::core::constants::LARGE_SOCKET_BUFFER_SIZE;

/// Raw socket customization hook.
///
/// The framework ignores whatever the hook does with errors; surfacing them is
/// the caller's job.
pub type SocketHook = Arc<dyn Fn(SockRef<'_>) + Send + Sync>;

/// Wrap a closure as a [`SocketHook`].
pub fn hook_fn<F>(f: F) -> SocketHook
where
    F: Fn(SockRef<'_>) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Set both kernel buffers of `sock` to `size` bytes.
pub fn set_buffer_sizes(sock: &SockRef<'_>, size: usize) -> io::Result<()> {
    sock.set_recv_buffer_size(size)?;
    sock.set_send_buffer_size(size)
}

/// Hook enlarging read and write buffers to 1 MiB, for high-throughput
/// datagram workloads.
pub fn large_buffers() -> SocketHook {
    hook_fn(|sock| {
        if let Err(err) = set_buffer_sizes(&sock, LARGE_SOCKET_BUFFER_SIZE) {
            debug!(%err, "cannot enlarge socket buffers");
        }
    })
}

pub(crate) fn apply(hook: Option<&SocketHook>, sock: SockRef<'_>) {
    if let Some(hook) = hook {
        hook(sock);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::net::UdpSocket;

    #[tokio::test]
    async fn test_hook_sees_live_socket() {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        let expected = socket.local_addr().unwrap();

        let hook = hook_fn(move |sock| {
            let local = sock.local_addr().unwrap().as_socket().unwrap();
            assert_eq!(local, expected);
            c.fetch_add(1, Ordering::SeqCst);
        });
        apply(Some(&hook), SockRef::from(&socket));
        apply(None, SockRef::from(&socket));

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_large_buffers() {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        large_buffers()(SockRef::from(&socket));
        // Kernels clamp or double the request; only check it moved up.
        let size = SockRef::from(&socket).recv_buffer_size().unwrap();
        assert!(size > 0);
    }
}
