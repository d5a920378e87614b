//! TCP server lifecycle, end to end.

mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use sockcore::prelude::*;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use common::{echo, start, wait_for};

fn tcp_config() -> ServerConfig {
    ServerConfigBuilder::new()
        .network(NetworkProtocol::Tcp)
        .address("127.0.0.1:0")
        .build()
}

fn dial_config(local: &Endpoint) -> ClientConfig {
    ClientConfigBuilder::new()
        .address(local.as_socket_addr().unwrap().to_string())
        .build()
}

#[tokio::test]
async fn test_echo_then_cancel_listen_context() {
    let running = start(tcp_config(), echo()).await;

    let client = SocketClient::new(None, dial_config(&running.local)).unwrap();
    client.connect(&Context::background()).await.unwrap();
    client.write(b"ping").await.unwrap();
    let mut buf = [0u8; 4];
    let mut read = 0;
    while read < 4 {
        read += client.read(&mut buf[read..]).await.unwrap();
    }
    assert_eq!(&buf, b"ping");
    wait_for(|| running.server.open_connections() == 1).await;

    // Cancelling the listen context reaches the handler's connection too.
    running.ctx.cancel();
    running.task.await.unwrap().unwrap();
    tokio::time::timeout(Duration::from_secs(2), running.server.done())
        .await
        .unwrap();

    assert!(running.server.is_gone());
    assert!(!running.server.is_running());
    assert_eq!(running.server.open_connections(), 0);
    assert!(running.server.local_addr().is_none());

    let mut buf = [0u8; 1];
    assert!(client.read(&mut buf).await.map(|n| n == 0).unwrap_or(true));
}

#[tokio::test]
async fn test_shutdown_drains_open_connections() {
    let running = start(tcp_config(), echo()).await;
    let addr = running.local.as_socket_addr().unwrap();

    let mut peers = Vec::new();
    for _ in 0..3 {
        peers.push(TcpStream::connect(addr).await.unwrap());
    }
    wait_for(|| running.server.open_connections() == 3).await;

    let ctx = Context::background().with_timeout(Duration::from_secs(2));
    running.server.shutdown(&ctx).await.unwrap();

    assert_eq!(running.server.open_connections(), 0);
    assert!(!running.server.is_running());
    running.task.await.unwrap().unwrap();
    assert!(running.server.is_gone());

    for mut peer in peers {
        let mut buf = [0u8; 1];
        let n = peer.read(&mut buf).await.unwrap_or(0);
        assert_eq!(n, 0);
    }
}

#[tokio::test]
async fn test_shutdown_times_out_on_stuck_handler() {
    let stuck = handler_fn(|conn| async move {
        tokio::time::sleep(Duration::from_secs(30)).await;
        drop(conn);
    });
    let running = start(tcp_config(), stuck).await;
    let _peer = TcpStream::connect(running.local.as_socket_addr().unwrap())
        .await
        .unwrap();
    wait_for(|| running.server.open_connections() == 1).await;

    let ctx = Context::background().with_timeout(Duration::from_millis(100));
    let err = running.server.shutdown(&ctx).await.unwrap_err();
    assert!(matches!(err, ServerError::ShutdownTimeout));
    assert!(!running.server.is_running());
    assert!(!running.server.is_gone());
}

#[tokio::test]
async fn test_second_listen_is_rejected() {
    let running = start(tcp_config(), echo()).await;
    let err = running
        .server
        .listen(&Context::background())
        .await
        .unwrap_err();
    assert!(matches!(err, ServerError::AlreadyRunning));
    running.server.close().await.unwrap();
}

#[tokio::test]
async fn test_info_callback_sees_lifecycle() {
    let states = Arc::new(Mutex::new(Vec::new()));
    let messages = Arc::new(Mutex::new(Vec::new()));

    let server = Arc::new(SocketServer::new(None, echo(), tcp_config()).unwrap());
    let seen = states.clone();
    server.register_func_info(move |_, _, state| seen.lock().unwrap().push(state));
    let logged = messages.clone();
    server.register_func_info_server(move |msg| logged.lock().unwrap().push(msg.to_string()));

    let local = server.bind().await.unwrap();
    let ctx = Context::background().child();
    let task = {
        let (server, ctx) = (server.clone(), ctx.clone());
        tokio::spawn(async move { server.listen(&ctx).await })
    };
    wait_for(|| server.is_running()).await;

    let mut peer = TcpStream::connect(local.as_socket_addr().unwrap()).await.unwrap();
    peer.write_all(b"x").await.unwrap();
    let mut buf = [0u8; 1];
    peer.read_exact(&mut buf).await.unwrap();
    drop(peer);
    wait_for(|| server.open_connections() == 0 && states.lock().unwrap().len() >= 3).await;

    ctx.cancel();
    task.await.unwrap().unwrap();

    let states = states.lock().unwrap();
    assert_eq!(
        &states[..3],
        &[ConnState::New, ConnState::Handler, ConnState::Close]
    );
    let messages = messages.lock().unwrap();
    assert!(messages.iter().any(|m| m.starts_with("starting listening socket")));
    assert!(messages.iter().any(|m| m.starts_with("closing listening socket")));
}

#[tokio::test]
async fn test_idle_timeout_closes_silent_peer() {
    let config = ServerConfigBuilder::new()
        .address("127.0.0.1:0")
        .idle_timeout(Duration::from_secs(1))
        .build();
    let running = start(config, echo()).await;

    let mut peer = TcpStream::connect(running.local.as_socket_addr().unwrap())
        .await
        .unwrap();
    wait_for(|| running.server.open_connections() == 1).await;

    let mut buf = [0u8; 1];
    let n = tokio::time::timeout(Duration::from_secs(3), peer.read(&mut buf))
        .await
        .unwrap()
        .unwrap_or(0);
    assert_eq!(n, 0);
    wait_for(|| running.server.open_connections() == 0).await;
    running.server.close().await.unwrap();
}

#[tokio::test]
async fn test_bind_failure_is_fatal() {
    let first = start(tcp_config(), echo()).await;
    let taken = first.local.as_socket_addr().unwrap().to_string();

    let config = ServerConfigBuilder::new().address(taken).build();
    let server = SocketServer::new(None, echo(), config).unwrap();
    let errors = Arc::new(Mutex::new(0usize));
    let count = errors.clone();
    server.register_func_error(move |_| *count.lock().unwrap() += 1);

    let err = server.listen(&Context::background()).await.unwrap_err();
    assert!(matches!(err, ServerError::Bind { .. }));
    assert_eq!(*errors.lock().unwrap(), 1);
    assert!(!server.is_running());
    first.server.close().await.unwrap();
}
