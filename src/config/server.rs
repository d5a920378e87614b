//! Server configuration.

use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::core::constants::{MAX_GID, MIN_IDLE_TIMEOUT};
use crate::core::{ConfigError, NetworkProtocol};

/// Server configuration.
#[derive(Clone, Default)]
pub struct ServerConfig {
    /// Network kind.
    pub network: NetworkProtocol,

    /// Bind address: `host:port` for IP kinds, a filesystem path for unix kinds.
    pub address: String,

    /// Permission bits of the unix socket file (unix kinds only).
    pub perm_file: Option<u32>,

    /// Group owning the unix socket file (unix kinds only).
    pub group_perm: Option<u32>,

    /// Close connections idle for this long. Values under one second
    /// disable idle tracking.
    pub idle_timeout: Option<Duration>,

    /// TLS settings (TCP kinds only).
    pub tls: Option<Arc<rustls::ServerConfig>>,
}

impl ServerConfig {
    /// Check the configuration without touching the network.
    pub fn validate(&self) -> Result<(), ConfigError> {
        super::check_address(self.network, &self.address)?;

        if let Some(gid) = self.group_perm {
            if gid > MAX_GID {
                return Err(ConfigError::InvalidGroup(gid));
            }
        }
        if self.tls.is_some() && !self.network.is_tcp() {
            return Err(ConfigError::InvalidTls(format!(
                "TLS is not available over {}",
                self.network
            )));
        }
        Ok(())
    }

    /// Resolved bind address for IP kinds. Blocks on name resolution.
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        super::resolve(self.network, &self.address)
    }

    /// Resolved bind address for IP kinds, without blocking the runtime.
    pub async fn lookup_addr(&self) -> Result<SocketAddr, ConfigError> {
        super::lookup(self.network, &self.address).await
    }

    /// Socket file path for unix kinds.
    pub fn unix_path(&self) -> Result<PathBuf, ConfigError> {
        super::unix_path(self.network, &self.address)
    }

    /// Idle timeout actually applied to connections.
    pub fn effective_idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout.filter(|t| *t >= MIN_IDLE_TIMEOUT)
    }
}

impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("network", &self.network)
            .field("address", &self.address)
            .field("perm_file", &self.perm_file.map(|m| format!("{m:o}")))
            .field("group_perm", &self.group_perm)
            .field("idle_timeout", &self.idle_timeout)
            .field("tls", &self.tls.is_some())
            .finish()
    }
}

/// Builder for [`ServerConfig`].
#[derive(Debug, Default)]
pub struct ServerConfigBuilder {
    config: ServerConfig,
}

impl ServerConfigBuilder {
    /// Start from defaults (TCP, no address).
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the network kind.
    pub fn network(mut self, network: NetworkProtocol) -> Self {
        self.config.network = network;
        self
    }

    /// Set the bind address.
    pub fn address(mut self, address: impl Into<String>) -> Self {
        self.config.address = address.into();
        self
    }

    /// Set the unix socket file mode.
    pub fn perm_file(mut self, mode: u32) -> Self {
        self.config.perm_file = Some(mode);
        self
    }

    /// Set the unix socket file group.
    pub fn group_perm(mut self, gid: u32) -> Self {
        self.config.group_perm = Some(gid);
        self
    }

    /// Set the idle timeout.
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.config.idle_timeout = Some(timeout);
        self
    }

    /// Enable TLS.
    pub fn tls(mut self, tls: Arc<rustls::ServerConfig>) -> Self {
        self.config.tls = Some(tls);
        self
    }

    /// Build the configuration. Call [`ServerConfig::validate`] or let the
    /// server constructor do it.
    pub fn build(self) -> ServerConfig {
        self.config
    }
}
