//! Echo server: writes back whatever each connection sends.

use sockcore::prelude::*;
use tracing::{info, warn};

use crate::{EchoError, Settings};

pub(crate) async fn run(settings: Settings) -> Result<(), EchoError> {
    let mut builder = ServerConfigBuilder::new()
        .network(settings.network)
        .address(settings.address);
    if let Some(idle) = settings.idle {
        builder = builder.idle_timeout(idle);
    }

    let hook = settings.network.is_datagram().then(large_buffers);
    let server = SocketServer::new(hook, handler_fn(echo), builder.build())?;

    server.register_func_error(|errors| {
        for err in errors {
            warn!(%err, "server error");
        }
    });
    server.register_func_info(|local, remote, state| {
        info!(%local, %remote, %state, "connection");
    });
    server.register_func_info_server(|msg| info!("{msg}"));

    let ctx = Context::background();
    let stop = ctx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            stop.cancel();
        }
    });

    server.listen(&ctx).await?;
    server.close().await?;
    Ok(())
}

async fn echo(conn: Connection) {
    let mut buf = vec![0u8; sockcore::core::constants::DEFAULT_BUFFER_SIZE];
    loop {
        match conn.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                if conn.write_all(&buf[..n]).await.is_err() {
                    break;
                }
            }
            Err(err) => {
                if let Some(err) = error_filter(Some(err)) {
                    warn!(remote = %conn.remote_host(), %err, "read failed");
                }
                break;
            }
        }
    }
}
