//! Echo client: one request, one reply.

use std::time::Duration;

use sockcore::prelude::*;
use tracing::info;

use crate::{EchoError, Settings};

pub(crate) async fn run(settings: Settings) -> Result<(), EchoError> {
    let config = ClientConfigBuilder::new()
        .network(settings.network)
        .address(settings.address)
        .build();
    let client = SocketClient::new(None, config)?;
    client.register_func_info(|local, remote, state| {
        info!(%local, %remote, %state, "connection");
    });

    let ctx = Context::background().with_timeout(Duration::from_secs(5));
    let reply = client
        .once(&ctx, settings.message.as_bytes(), |conn| async move {
            let mut buf = vec![0u8; sockcore::core::constants::DEFAULT_BUFFER_SIZE];
            let n = conn.read(&mut buf).await?;
            buf.truncate(n);
            Ok::<_, ConnectionError>(buf)
        })
        .await?;

    info!(reply = %String::from_utf8_lossy(&reply), "echoed");
    Ok(())
}
