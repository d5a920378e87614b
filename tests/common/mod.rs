//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use sockcore::prelude::*;
use tokio::task::JoinHandle;
use tracing_subscriber::EnvFilter;

/// Route crate logs to the test harness; `RUST_LOG` picks the level.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Handler writing back everything it reads until end of stream.
pub fn echo() -> Handler {
    handler_fn(|conn| async move {
        let mut buf = [0u8; 1024];
        loop {
            match conn.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    if conn.write_all(&buf[..n]).await.is_err() {
                        break;
                    }
                }
            }
        }
    })
}

pub struct Running {
    pub server: Arc<SocketServer>,
    pub local: Endpoint,
    pub ctx: Context,
    pub task: JoinHandle<Result<(), ServerError>>,
}

/// Bind, then run `listen` on its own task.
pub async fn start(config: ServerConfig, handler: Handler) -> Running {
    init_tracing();
    let server = Arc::new(SocketServer::new(None, handler, config).unwrap());
    let local = server.bind().await.unwrap();
    let ctx = Context::background().child();

    let task = {
        let server = server.clone();
        let ctx = ctx.clone();
        tokio::spawn(async move { server.listen(&ctx).await })
    };
    wait_for(|| server.is_running()).await;

    Running {
        server,
        local,
        ctx,
        task,
    }
}

/// Poll `cond` until it holds, failing after two seconds.
pub async fn wait_for(cond: impl Fn() -> bool) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

/// Self-signed `localhost` pair.
pub fn tls_configs() -> (Arc<rustls::ServerConfig>, Arc<rustls::ClientConfig>) {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let cert = rcgen::generate_simple_self_signed(vec!["localhost".into()]).unwrap();
    let cert_der = CertificateDer::from(cert.cert.der().to_vec());
    let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(cert.key_pair.serialize_der()));

    let server = rustls::ServerConfig::builder_with_provider(provider.clone())
        .with_safe_default_protocol_versions()
        .unwrap()
        .with_no_client_auth()
        .with_single_cert(vec![cert_der.clone()], key)
        .unwrap();

    let mut roots = rustls::RootCertStore::empty();
    roots.add(cert_der).unwrap();
    let client = rustls::ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .unwrap()
        .with_root_certificates(roots)
        .with_no_client_auth();

    (Arc::new(server), Arc::new(client))
}
