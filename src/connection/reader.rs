//! Per-connection inbound read loop.
//!
//! One task per connection owns the read half of the socket and the decode
//! state. It reports decoded messages, violations, and failures upward
//! through a weak reference to the owning connection; it never touches the
//! write half and never invokes listeners directly.

use std::sync::{Arc, Weak};

use futures::StreamExt;
use tokio::net::tcp::OwnedReadHalf;
use tokio_util::codec::FramedRead;

use crate::config::ConnectionConfig;
use crate::connection::shared::SharedState;
use crate::connection::{CloseReason, Connection};
use crate::error::ConnectionError;
use crate::protocol::{FrameCodec, Inbound, WireMessage};

/// Run the read loop until the connection stops or the stream fails.
///
/// A blocked read is not interrupted by the stop flag alone; shutdown
/// aborts this task, which drops and closes the read half.
pub(crate) async fn read_loop<M: WireMessage>(
    mut framed: FramedRead<OwnedReadHalf, FrameCodec<M>>,
    shared: Arc<SharedState>,
    connection: Weak<Connection<M>>,
    config: Arc<ConnectionConfig>,
) {
    while !shared.is_stopped() {
        let next = tokio::time::timeout(config.read_timeout, framed.next()).await;

        match next {
            Err(_elapsed) => {
                fail(&shared, &connection, ConnectionError::ReadTimeout).await;
                break;
            }

            // Clean end of stream: the peer hung up.
            Ok(None) => {
                shared.record_reason(CloseReason::PeerDisconnected);
                force_shutdown(&connection).await;
                break;
            }

            Ok(Some(Err(e))) => {
                fail(&shared, &connection, e).await;
                break;
            }

            Ok(Some(Ok(Inbound::Violation(violation)))) => {
                // Tolerance policy decides whether this closes the
                // connection; a single violation never does.
                if let Some(conn) = connection.upgrade() {
                    conn.handle_violation(violation).await;
                }
                if shared.is_stopped() {
                    break;
                }
            }

            Ok(Some(Ok(Inbound::Close))) => {
                tracing::debug!("Peer requested cooperative close");
                shared.touch();
                shared.set_stopped();
                // Cooperative path: no close frame is echoed back.
                if let Some(conn) = connection.upgrade() {
                    conn.shut_down(false, None).await;
                }
                break;
            }

            Ok(Some(Ok(Inbound::Message(message)))) => {
                shared.touch();
                if !shared.is_stopped() {
                    if let Some(conn) = connection.upgrade() {
                        tracing::trace!(id = %conn.id(), "Message received");
                        conn.deliver(message);
                    }
                }
            }
        }
    }
}

/// Classify a stream failure and force the connection down.
async fn fail<M: WireMessage>(
    shared: &Arc<SharedState>,
    connection: &Weak<Connection<M>>,
    err: ConnectionError,
) {
    let locally_closed = connection
        .upgrade()
        .map(|c| c.is_shutdown_started())
        .unwrap_or(true);

    let reason = shared.classify_failure(&err, locally_closed);
    tracing::debug!(error = %err, reason = %reason, "Read loop terminating");
    force_shutdown(connection).await;
}

async fn force_shutdown<M: WireMessage>(connection: &Weak<Connection<M>>) {
    if let Some(conn) = connection.upgrade() {
        conn.shut_down(false, None).await;
    }
}
