//! Transport layer.
//!
//! - **Context**: [`Context`], a cancellation tree with deadlines and values
//! - **Connection**: [`Connection`], the context-wrapping socket adapter handed
//!   to handlers
//! - **Datagram sockets**: [`DatagramSocket`] over UDP or unix datagrams
//! - **Socket hook**: [`SocketHook`] for raw socket tuning
//! - **TLS**: [`TlsSlot`] and [`ClientTls`] over rustls
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │         server / client                 │
//! ├─────────────────────────────────────────┤
//! │         Connection + Context            │  ← This module
//! │   closed flag, idle watchdog, TLS       │
//! ├─────────────────────────────────────────┤
//! │   TCP / UDP / unix / unixgram (tokio)   │
//! └─────────────────────────────────────────┘
//! ```

mod connection;
mod context;
mod datagram;
mod idle;
mod socket;
mod tls;

pub use connection::*;
pub use context::*;
pub use datagram::*;
pub use socket::{SocketHook, hook_fn, large_buffers, set_buffer_sizes};
pub use tls::{ClientTls, TlsSlot};

pub(crate) use socket::apply as apply_hook;
pub(crate) use tls::accept as tls_accept;

#[cfg(test)]
pub(crate) use tls::test_util;
