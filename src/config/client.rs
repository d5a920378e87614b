//! Client configuration.

use std::net::SocketAddr;
use std::path::PathBuf;

use crate::core::{ConfigError, NetworkProtocol};
use crate::transport::ClientTls;

/// Client configuration, kept across reconnects.
#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    /// Network kind.
    pub network: NetworkProtocol,

    /// Dial address: `host:port` for IP kinds, a filesystem path for unix kinds.
    pub address: String,

    /// TLS settings (TCP kinds only).
    pub tls: Option<ClientTls>,
}

impl ClientConfig {
    /// Check the configuration without touching the network.
    pub fn validate(&self) -> Result<(), ConfigError> {
        super::check_address(self.network, &self.address)?;
        if self.tls.is_some() && !self.network.is_tcp() {
            return Err(ConfigError::InvalidTls(format!(
                "TLS is not available over {}",
                self.network
            )));
        }
        Ok(())
    }

    /// Resolved dial address for IP kinds. Blocks on name resolution.
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        super::resolve(self.network, &self.address)
    }

    /// Resolved dial address for IP kinds, without blocking the runtime.
    pub async fn lookup_addr(&self) -> Result<SocketAddr, ConfigError> {
        super::lookup(self.network, &self.address).await
    }

    /// Socket file path for unix kinds.
    pub fn unix_path(&self) -> Result<PathBuf, ConfigError> {
        super::unix_path(self.network, &self.address)
    }
}

/// Builder for [`ClientConfig`].
#[derive(Debug, Default)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    /// Start from defaults (TCP, no address).
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the network kind.
    pub fn network(mut self, network: NetworkProtocol) -> Self {
        self.config.network = network;
        self
    }

    /// Set the dial address.
    pub fn address(mut self, address: impl Into<String>) -> Self {
        self.config.address = address.into();
        self
    }

    /// Enable TLS.
    pub fn tls(mut self, tls: ClientTls) -> Self {
        self.config.tls = Some(tls);
        self
    }

    /// Build the configuration.
    pub fn build(self) -> ClientConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::test_util;

    #[test]
    fn test_addresses() {
        for (network, address, ok) in [
            (NetworkProtocol::Tcp, "localhost:8080", true),
            (NetworkProtocol::Tcp4, "127.0.0.1:8080", true),
            (NetworkProtocol::Tcp6, "[::1]:8080", true),
            (NetworkProtocol::Udp, "localhost:9000", true),
            (NetworkProtocol::Tcp, "invalid-address", false),
            (NetworkProtocol::Tcp, "", false),
        ] {
            let config = ClientConfigBuilder::new()
                .network(network)
                .address(address)
                .build();
            assert_eq!(config.validate().is_ok(), ok, "{network} {address:?}");
        }
    }

    #[test]
    fn test_tls_rejected_over_unix() {
        let (_, client) = test_util::configs();
        let config = ClientConfigBuilder::new()
            .network(NetworkProtocol::Unix)
            .address("/tmp/x.sock")
            .tls(ClientTls::new(client, "localhost").unwrap())
            .build();
        assert!(config.validate().is_err());
    }
}
