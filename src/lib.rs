//! # sockcore
//!
//! Protocol-agnostic socket server and client core.
//!
//! One lifecycle for every network kind:
//!
//! - **Streams**: TCP (optionally over TLS) and Unix-domain stream sockets
//! - **Datagrams**: UDP and Unix-domain datagram sockets, routed per peer
//! - **Connections**: context-aware, idle-bounded, idempotently closable
//! - **Shutdown**: stop accepting, cancel in-flight work, drain under a deadline
//! - **Observability**: error, per-connection and server callbacks
//!
//! ## Feature Flags
//!
//! - `server` (default): [`server::SocketServer`]
//! - `client` (default): [`client::SocketClient`]
//!
//! ## Modules
//!
//! - [`core`]: states, endpoints, protocols, errors, callbacks, constants
//! - [`config`]: validated server and client descriptors
//! - [`transport`]: contexts, the connection wrapper, sockets and TLS
//! - [`server`]: socket server (requires `server` feature)
//! - [`client`]: socket client (requires `client` feature)
//!
//! ## Example Usage
//!
//! ```no_run
//! use sockcore::prelude::*;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ServerConfigBuilder::new()
//!     .network(NetworkProtocol::Tcp)
//!     .address("127.0.0.1:7000")
//!     .build();
//!
//! let server = SocketServer::new(
//!     Some(large_buffers()),
//!     handler_fn(|conn| async move {
//!         let mut buf = [0u8; 512];
//!         while let Ok(n) = conn.read(&mut buf).await {
//!             if n == 0 || conn.write_all(&buf[..n]).await.is_err() {
//!                 break;
//!             }
//!         }
//!     }),
//!     config,
//! )?;
//! server.register_func_info(|local, remote, state| {
//!     println!("{local} <-> {remote}: {state}");
//! });
//!
//! let ctx = Context::background();
//! server.listen(&ctx).await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

// Core module (always included)
pub mod core;

pub mod config;
pub mod transport;

// Client API (feature-gated)
#[cfg(feature = "client")]
#[cfg_attr(docsrs, doc(cfg(feature = "client")))]
pub mod client;

// Server API (feature-gated)
#[cfg(feature = "server")]
#[cfg_attr(docsrs, doc(cfg(feature = "server")))]
pub mod server;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::core::*;

    pub use crate::config::{
        ClientConfig, ClientConfigBuilder, ServerConfig, ServerConfigBuilder,
    };
    pub use crate::transport::{
        ClientTls, Connection, Context, DatagramSocket, SocketHook, hook_fn, large_buffers,
    };

    #[cfg(feature = "client")]
    pub use crate::client::SocketClient;

    #[cfg(feature = "server")]
    pub use crate::server::{Handler, ListenerInfo, SocketServer, handler_fn};
}

// Re-export commonly used items at crate root
pub use core::{ConnState, Endpoint, NetworkProtocol, error_filter};
pub use transport::{Connection, Context};
