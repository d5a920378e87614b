//! UDP and unixgram servers, end to end.

mod common;

use std::time::Duration;

use sockcore::prelude::*;
use tokio::net::UdpSocket;

use common::{echo, start, wait_for};

fn udp_config() -> ServerConfig {
    ServerConfigBuilder::new()
        .network(NetworkProtocol::Udp)
        .address("127.0.0.1:0")
        .build()
}

#[tokio::test]
async fn test_udp_echo_through_client() {
    let running = start(udp_config(), echo()).await;
    let config = ClientConfigBuilder::new()
        .network(NetworkProtocol::Udp)
        .address(running.local.as_socket_addr().unwrap().to_string())
        .build();
    let client = SocketClient::new(None, config).unwrap();
    client.connect(&Context::background()).await.unwrap();

    for msg in [&b"one"[..], b"two", b"three"] {
        client.write(msg).await.unwrap();
        let mut buf = [0u8; 64];
        let n = tokio::time::timeout(Duration::from_secs(2), client.read(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(&buf[..n], msg);
    }

    // Every datagram from this peer went to the same flow.
    assert_eq!(running.server.open_connections(), 1);
    client.close().await.unwrap();
    running.server.close().await.unwrap();
}

#[tokio::test]
async fn test_udp_peers_get_separate_flows() {
    let running = start(udp_config(), echo()).await;
    let server_addr = running.local.as_socket_addr().unwrap();

    let a = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let b = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    a.send_to(b"from a", server_addr).await.unwrap();
    b.send_to(b"from b", server_addr).await.unwrap();

    let mut buf = [0u8; 64];
    let (n, from) = a.recv_from(&mut buf).await.unwrap();
    assert_eq!((&buf[..n], from), (&b"from a"[..], server_addr));
    let (n, _) = b.recv_from(&mut buf).await.unwrap();
    assert_eq!(&buf[..n], b"from b");
    assert_eq!(running.server.open_connections(), 2);

    let ctx = Context::background().with_timeout(Duration::from_secs(2));
    running.server.shutdown(&ctx).await.unwrap();
    assert_eq!(running.server.open_connections(), 0);
    running.task.await.unwrap().unwrap();
    assert!(running.server.is_gone());
}

#[tokio::test]
async fn test_udp_handler_sees_truncated_datagram() {
    let small = handler_fn(|conn| async move {
        let mut buf = [0u8; 4];
        if let Ok(n) = conn.read(&mut buf).await {
            let _ = conn.write_all(&buf[..n]).await;
        }
    });
    let running = start(udp_config(), small).await;

    let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    peer.send_to(b"truncated", running.local.as_socket_addr().unwrap())
        .await
        .unwrap();
    let mut buf = [0u8; 64];
    let (n, _) = peer.recv_from(&mut buf).await.unwrap();
    assert_eq!(&buf[..n], b"trun");

    wait_for(|| running.server.open_connections() == 0).await;
    running.server.close().await.unwrap();
}

#[cfg(unix)]
#[tokio::test]
async fn test_unixgram_server_receives() {
    use tokio::sync::mpsc;

    let path = std::env::temp_dir().join(format!("sockcore-dgram-{}.sock", std::process::id()));
    let (tx, mut rx) = mpsc::unbounded_channel::<Vec<u8>>();
    let handler = handler_fn(move |conn| {
        let tx = tx.clone();
        async move {
            let mut buf = [0u8; 64];
            while let Ok(n) = conn.read(&mut buf).await {
                if n == 0 || tx.send(buf[..n].to_vec()).is_err() {
                    break;
                }
            }
        }
    });
    let config = ServerConfigBuilder::new()
        .network(NetworkProtocol::UnixGram)
        .address(path.to_string_lossy())
        .build();
    let running = start(config, handler).await;

    let client = SocketClient::new(
        None,
        ClientConfigBuilder::new()
            .network(NetworkProtocol::UnixGram)
            .address(path.to_string_lossy())
            .build(),
    )
    .unwrap();
    client.connect(&Context::background()).await.unwrap();
    client.write(b"hello").await.unwrap();
    client.write(b"world").await.unwrap();

    assert_eq!(rx.recv().await.unwrap(), b"hello");
    assert_eq!(rx.recv().await.unwrap(), b"world");

    client.close().await.unwrap();
    running.server.close().await.unwrap();
    running.task.await.unwrap().unwrap();
    assert!(!path.exists());
}
