//! Socket client.
//!
//! [`SocketClient`] dials the configured network, optionally over TLS for
//! TCP, and exposes read, write and one-shot request/response on the held
//! connection.

#[allow(clippy::module_inception)]
mod client;
mod dialer;

pub use client::*;
