//! TLS adaptation over rustls.
//!
//! Certificates and keys are produced elsewhere; this module only consumes
//! the finished `rustls` configurations.

use std::fmt;
use std::io;
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use rustls::pki_types::ServerName;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_rustls::{TlsAcceptor, TlsConnector, client, server};

use crate::core::ConfigError;

/// Server-side TLS slot. Replacing the configuration affects only handshakes
/// started afterwards; established sessions keep their snapshot.
#[derive(Default)]
pub struct TlsSlot {
    acceptor: ArcSwapOption<TlsAcceptor>,
}

impl TlsSlot {
    /// Slot holding `config`, or empty.
    pub fn new(config: Option<Arc<rustls::ServerConfig>>) -> Self {
        Self {
            acceptor: ArcSwapOption::from(config.map(|c| Arc::new(TlsAcceptor::from(c)))),
        }
    }

    /// Enable with `config`, or disable. Enabling without a configuration is
    /// a configuration error and leaves the slot unchanged.
    pub fn set(
        &self,
        enable: bool,
        config: Option<Arc<rustls::ServerConfig>>,
    ) -> Result<(), ConfigError> {
        match (enable, config) {
            (false, _) => self.acceptor.store(None),
            (true, Some(config)) => self
                .acceptor
                .store(Some(Arc::new(TlsAcceptor::from(config)))),
            (true, None) => {
                return Err(ConfigError::InvalidTls(
                    "TLS enabled without configuration".into(),
                ));
            }
        }
        Ok(())
    }

    /// Whether TLS is currently enabled.
    pub fn is_enabled(&self) -> bool {
        self.acceptor.load().is_some()
    }

    /// Current acceptor snapshot.
    pub(crate) fn current(&self) -> Option<Arc<TlsAcceptor>> {
        self.acceptor.load_full()
    }
}

impl fmt::Debug for TlsSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsSlot")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

/// Run the server handshake on `stream`.
pub(crate) async fn accept<IO>(acceptor: &TlsAcceptor, stream: IO) -> io::Result<server::TlsStream<IO>>
where
    IO: AsyncRead + AsyncWrite + Unpin,
{
    acceptor.accept(stream).await
}

/// Client TLS settings.
#[derive(Clone)]
pub struct ClientTls {
    /// rustls client configuration.
    pub config: Arc<rustls::ClientConfig>,
    /// Name presented for SNI and checked against the certificate.
    pub server_name: String,
}

impl ClientTls {
    /// Validate the server name up front.
    pub fn new(
        config: Arc<rustls::ClientConfig>,
        server_name: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let tls = Self {
            config,
            server_name: server_name.into(),
        };
        tls.server_name()?;
        Ok(tls)
    }

    fn server_name(&self) -> Result<ServerName<'static>, ConfigError> {
        ServerName::try_from(self.server_name.clone())
            .map_err(|e| ConfigError::InvalidTls(format!("server name {:?}: {e}", self.server_name)))
    }

    /// Run the client handshake on `stream`.
    pub(crate) async fn connect<IO>(&self, stream: IO) -> io::Result<client::TlsStream<IO>>
    where
        IO: AsyncRead + AsyncWrite + Unpin,
    {
        let name = self
            .server_name()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        TlsConnector::from(Arc::clone(&self.config))
            .connect(name, stream)
            .await
    }
}

impl fmt::Debug for ClientTls {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientTls")
            .field("server_name", &self.server_name)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) mod test_util {
    use std::sync::Arc;

    use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};

    /// Self-signed pair for `localhost`.
    pub(crate) fn configs() -> (Arc<rustls::ServerConfig>, Arc<rustls::ClientConfig>) {
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
}
