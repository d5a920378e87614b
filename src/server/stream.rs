//! Accept loop for stream servers (TCP and unix).

use std::io;
use std::sync::Arc;

use tracing::{error, trace, warn};

use super::lifecycle::ServerCore;
use super::listener::{Accepted, AcceptedStream, StreamListener};
use crate::core::constants::ACCEPT_RETRY_DELAY;
use crate::core::{ConnState, PeerGone, ServerError};
use crate::transport::{Connection, Context, apply_hook, tls_accept};

/// Accept until `run` is done. Only listener failures end the loop early.
pub(super) async fn accept_loop(
    core: &Arc<ServerCore>,
    listener: StreamListener,
    run: &Context,
) -> Result<(), ServerError> {
    loop {
        let accepted = tokio::select! {
            _ = run.done() => break,
            res = listener.accept() => res,
        };

        match accepted {
            Ok(accepted) => dispatch(core, accepted, run),
            Err(err) if is_fatal(&err) => {
                error!(%err, "listener failed");
                let err = ServerError::Accept(err);
                core.callbacks.error(&[&err]);
                return Err(err);
            }
            Err(err) => {
                if !err.is_peer_gone() {
                    warn!(%err, "accept failed");
                    core.callbacks.error(&[&ServerError::Accept(err)]);
                }
                tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
            }
        }
    }
    Ok(())
}

/// Errors meaning the listening socket itself is unusable.
fn is_fatal(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::InvalidInput | io::ErrorKind::NotConnected
    )
}

/// Hand `accepted` to the handler on its own task. The TLS handshake runs
/// there too, so a slow peer never stalls the accept loop.
fn dispatch(core: &Arc<ServerCore>, accepted: Accepted, run: &Context) {
    let task_core = Arc::clone(core);
    let parent = run.clone();

    core.spawn(async move {
        let core = task_core;
        let Accepted {
            stream,
            local,
            remote,
        } = accepted;
        apply_hook(core.hook.as_ref(), stream.sock_ref());

        let network = core.config.network;
        let idle = core.config.effective_idle_timeout();

        let conn = match (stream, core.tls.current()) {
            (AcceptedStream::Tcp(stream), Some(acceptor)) => {
                let handshake = tokio::select! {
                    _ = parent.done() => return,
                    res = tls_accept(&acceptor, stream) => res,
                };
                match handshake {
                    Ok(tls) => Connection::from_stream(tls, &parent, network, local, remote, idle),
                    Err(err) => {
                        trace!(%remote, %err, "TLS handshake failed");
                        core.callbacks.info(&local, &remote, ConnState::Error);
                        if !err.is_peer_gone() {
                            core.callbacks.error(&[&ServerError::Tls(err)]);
                        }
                        return;
                    }
                }
            }
            (AcceptedStream::Tcp(stream), None) => {
                Connection::from_stream(stream, &parent, network, local, remote, idle)
            }
            #[cfg(unix)]
            (AcceptedStream::Unix(stream), _) => {
                Connection::from_stream(stream, &parent, network, local, remote, idle)
            }
        };

        core.track(&conn);
        core.serve(conn).await;
    });
}
