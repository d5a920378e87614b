//! Receive loop for datagram servers (UDP and unixgram).
//!
//! One socket serves every peer. Datagrams are routed by sender into peer
//! flows; each flow is a [`Connection`] with its own handler task and idle
//! timer. A flow ends when its handler closes it or it goes idle, and the
//! next datagram from that peer opens a new one.
//!
//! Unnamed unix peers all share one flow and cannot be answered.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{trace, warn};

use super::lifecycle::ServerCore;
use crate::core::constants::{
    ACCEPT_RETRY_DELAY, DATAGRAM_BUFFER_SIZE, FLOW_PRUNE_THRESHOLD, FLOW_QUEUE_DEPTH,
};
use crate::core::{Endpoint, PeerGone, ServerError};
use crate::transport::{Connection, Context, DatagramSocket};

type Flows = HashMap<Endpoint, mpsc::Sender<Bytes>>;

/// Receive until `run` is done. Dropping the peer map on exit ends every
/// flow with an end of stream.
pub(super) async fn receive_loop(
    core: &Arc<ServerCore>,
    socket: DatagramSocket,
    run: &Context,
) -> Result<(), ServerError> {
    let local = socket.local_endpoint()?;
    let mut flows = Flows::new();
    let mut buf = vec![0u8; DATAGRAM_BUFFER_SIZE];

    loop {
        let received = tokio::select! {
            _ = run.done() => break,
            res = socket.recv_from(&mut buf) => res,
        };

        let (n, peer) = match received {
            Ok(received) => received,
            Err(err) => {
                // ICMP errors from earlier sends surface here; the socket is fine.
                if !err.is_peer_gone() {
                    warn!(%err, "receive failed");
                    core.callbacks.error(&[&ServerError::Accept(err)]);
                }
                tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
                continue;
            }
        };

        if n == 0 {
            trace!(%peer, "empty datagram dropped");
            continue;
        }
        route(
            core,
            &socket,
            &local,
            run,
            &mut flows,
            peer,
            Bytes::copy_from_slice(&buf[..n]),
        );
    }
    Ok(())
}

fn route(
    core: &Arc<ServerCore>,
    socket: &DatagramSocket,
    local: &Endpoint,
    run: &Context,
    flows: &mut Flows,
    peer: Endpoint,
    data: Bytes,
) {
    match flows.get(&peer).map(|tx| tx.try_send(data.clone())) {
        None => {}
        Some(Ok(())) => return,
        Some(Err(TrySendError::Full(_))) => {
            warn!(%peer, "peer flow queue full, datagram dropped");
            return;
        }
        Some(Err(TrySendError::Closed(_))) => {
            flows.remove(&peer);
        }
    }

    if flows.len() >= FLOW_PRUNE_THRESHOLD {
        flows.retain(|_, tx| !tx.is_closed());
    }

    let (tx, rx) = mpsc::channel(FLOW_QUEUE_DEPTH);
    if tx.try_send(data).is_err() {
        return;
    }
    flows.insert(peer.clone(), tx);

    let conn = Connection::from_flow(
        socket.clone(),
        peer,
        rx,
        run,
        core.config.network,
        local.clone(),
        core.config.effective_idle_timeout(),
    );
    core.track(&conn);

    let task_core = Arc::clone(core);
    core.spawn(async move { task_core.serve(conn).await });
}
