//! sockcore echo demo
//!
//! Environment variables:
//! - ECHO_MODE: "server" or "client" (default server)
//! - ECHO_NETWORK: tcp|tcp4|tcp6|udp|udp4|udp6|unix|unixgram (default tcp)
//! - ECHO_ADDR: bind or dial address (default 127.0.0.1:19999)
//! - ECHO_IDLE_SECS: server idle timeout in seconds (optional)
//! - ECHO_MESSAGE: payload sent by the client (default "ping")
//! - ECHO_LOG_LEVEL: tracing filter (default info)

mod client;
mod server;

use std::time::Duration;

use sockcore::core::{ClientError, ConfigError, NetworkProtocol, ServerError};
use thiserror::Error;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Error)]
pub(crate) enum EchoError {
    #[error("unknown ECHO_MODE {0:?}")]
    Mode(String),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Server(#[from] ServerError),
    #[error(transparent)]
    Client(#[from] ClientError),
}

pub(crate) struct Settings {
    pub network: NetworkProtocol,
    pub address: String,
    pub idle: Option<Duration>,
    pub message: String,
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

impl Settings {
    fn from_env() -> Result<Self, EchoError> {
        Ok(Self {
            network: env_or("ECHO_NETWORK", "tcp").parse()?,
            address: env_or("ECHO_ADDR", "127.0.0.1:19999"),
            idle: std::env::var("ECHO_IDLE_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs),
            message: env_or("ECHO_MESSAGE", "ping"),
        })
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(env_or("ECHO_LOG_LEVEL", "info")))
        .init();

    if let Err(err) = run().await {
        tracing::error!(%err, "echo failed");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), EchoError> {
    let settings = Settings::from_env()?;
    match env_or("ECHO_MODE", "server").as_str() {
        "server" => server::run(settings).await,
        "client" => client::run(settings).await,
        other => Err(EchoError::Mode(other.to_string())),
    }
}
