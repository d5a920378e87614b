//! Server and client configuration.
//!
//! Plain structs with a `Default`, a builder, and an explicit `validate()`
//! that fails before any socket operation.

mod client;
mod server;

pub use client::*;
pub use server::*;

use std::net::{SocketAddr, ToSocketAddrs};
use std::path::PathBuf;

use crate::core::{ConfigError, NetworkProtocol};

/// Resolve `address` to the first IP socket address acceptable for `protocol`.
/// Blocks on name resolution; async paths use [`lookup`].
///
/// An empty host (`":8080"`) means every local interface.
pub(crate) fn resolve(protocol: NetworkProtocol, address: &str) -> Result<SocketAddr, ConfigError> {
    let address = normalize(protocol, address)?;
    let addrs = address
        .to_socket_addrs()
        .map_err(|e| ConfigError::InvalidAddress(format!("{address}: {e}")))?;
    pick(protocol, &address, addrs)
}

/// [`resolve`] without blocking the runtime.
pub(crate) async fn lookup(protocol: NetworkProtocol, address: &str) -> Result<SocketAddr, ConfigError> {
    let address = normalize(protocol, address)?;
    let addrs = tokio::net::lookup_host(address.as_str())
        .await
        .map_err(|e| ConfigError::InvalidAddress(format!("{address}: {e}")))?;
    pick(protocol, &address, addrs)
}

fn normalize(protocol: NetworkProtocol, address: &str) -> Result<String, ConfigError> {
    let address = address.trim();
    if address.is_empty() {
        return Err(ConfigError::InvalidAddress("empty address".into()));
    }
    if protocol.is_unix() {
        return Err(ConfigError::InvalidAddress(format!(
            "{address} is not an IP address for {protocol}"
        )));
    }
    if !address.starts_with(':') {
        return Ok(address.to_string());
    }
    let any = if matches!(protocol, NetworkProtocol::Tcp6 | NetworkProtocol::Udp6) {
        "[::]"
    } else {
        "0.0.0.0"
    };
    Ok(format!("{any}{address}"))
}

fn pick(
    protocol: NetworkProtocol,
    address: &str,
    mut addrs: impl Iterator<Item = SocketAddr>,
) -> Result<SocketAddr, ConfigError> {
    addrs
        .find(|addr| protocol.accepts_ip(&addr.ip()))
        .ok_or_else(|| ConfigError::InvalidAddress(format!("{address} has no {protocol} address")))
}

/// Unix socket path for `address`.
pub(crate) fn unix_path(protocol: NetworkProtocol, address: &str) -> Result<PathBuf, ConfigError> {
    if !protocol.is_supported() {
        return Err(ConfigError::InvalidProtocol(format!(
            "{protocol} is not supported on this platform"
        )));
    }
    let address = address.trim();
    if address.is_empty() {
        return Err(ConfigError::InvalidAddress("empty address".into()));
    }
    Ok(PathBuf::from(address))
}

/// Validate `address` for `protocol` without binding.
pub(crate) fn check_address(protocol: NetworkProtocol, address: &str) -> Result<(), ConfigError> {
    if protocol.is_unix() {
        unix_path(protocol, address).map(drop)
    } else {
        resolve(protocol, address).map(drop)
    }
}
