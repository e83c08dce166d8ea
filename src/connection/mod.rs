//! Peer connection lifecycle.
//!
//! A [`Connection`] owns the write half of the socket, the peer's identity
//! and authentication state, and shutdown authority. Its reader task owns
//! the read half and the decode loop. The two communicate only through the
//! shared state and the idempotent shutdown procedure.

pub mod listener;
pub(crate) mod reader;
pub mod reason;
pub(crate) mod shared;
pub mod violation;

pub use listener::{ConnectionListener, MessageListener};
pub use reason::CloseReason;
pub use violation::Violation;

use std::fmt;
use std::hash::{Hash, Hasher};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Instant;

use futures::SinkExt;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite};

use crate::config::ConnectionConfig;
use crate::dispatch::Dispatcher;
use crate::error::ConnectionError;
use crate::protocol::{FrameCodec, Outbound, WireMessage};
use shared::SharedState;

/// Process-local unique identifier for a connection, stable for its
/// lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Callback invoked through the dispatch queue once shutdown has fully
/// completed.
pub type CompletionHandler = Box<dyn FnOnce() + Send>;

/// One peer session over a duplex byte stream.
pub struct Connection<M> {
    id: ConnectionId,
    config: Arc<ConnectionConfig>,
    /// Write mutual exclusion covers the whole encode-and-write sequence;
    /// interleaved writers would corrupt the framing.
    writer: tokio::sync::Mutex<FramedWrite<OwnedWriteHalf, FrameCodec<M>>>,
    shared: Arc<SharedState>,
    dispatcher: Dispatcher,
    message_listener: Arc<dyn MessageListener<M>>,
    connection_listener: Arc<dyn ConnectionListener<M>>,
    peer_addr: StdMutex<Option<SocketAddr>>,
    authenticated: AtomicBool,
    shutdown_started: AtomicBool,
    reader_handle: StdMutex<Option<JoinHandle<()>>>,
}

impl<M: WireMessage> Connection<M> {
    /// Wrap an established stream into a managed connection.
    ///
    /// The write side is constructed before the read side, the reader task
    /// is spawned, and `on_connection` is dispatched. Socket option
    /// failures are logged, not raised; stream failures after this point
    /// surface through failure classification and the disconnect
    /// notification.
    pub fn new(
        stream: TcpStream,
        message_listener: Arc<dyn MessageListener<M>>,
        connection_listener: Arc<dyn ConnectionListener<M>>,
        config: ConnectionConfig,
        dispatcher: Dispatcher,
    ) -> Arc<Self> {
        if let Err(e) = stream.set_nodelay(true) {
            tracing::warn!(error = %e, "Failed to set TCP_NODELAY");
        }

        let config = Arc::new(config);
        let (read_half, write_half) = stream.into_split();
        let writer = FramedWrite::new(write_half, FrameCodec::new(config.max_message_size));
        let framed_read = FramedRead::new(read_half, FrameCodec::new(config.max_message_size));

        let shared = Arc::new(SharedState::new());
        let connection = Arc::new(Self {
            id: ConnectionId::next(),
            config: config.clone(),
            writer: tokio::sync::Mutex::new(writer),
            shared: shared.clone(),
            dispatcher,
            message_listener,
            connection_listener,
            peer_addr: StdMutex::new(None),
            authenticated: AtomicBool::new(false),
            shutdown_started: AtomicBool::new(false),
            reader_handle: StdMutex::new(None),
        });

        let handle = tokio::spawn(reader::read_loop(
            framed_read,
            shared,
            Arc::downgrade(&connection),
            config,
        ));
        *connection
            .reader_handle
            .lock()
            .expect("reader handle lock") = Some(handle);

        connection.shared.touch();
        tracing::debug!(id = %connection.id, "New connection created");

        let listener = connection.connection_listener.clone();
        let conn = connection.clone();
        connection
            .dispatcher
            .execute(move || listener.on_connection(conn));

        connection
    }

    /// Mark the peer's address as authenticated. Callable once per
    /// connection; dispatches `on_peer_authenticated` unless the
    /// connection is already stopped.
    pub fn set_authenticated(self: &Arc<Self>, addr: SocketAddr) {
        if self.authenticated.swap(true, Ordering::SeqCst) {
            tracing::warn!(id = %self.id, "set_authenticated called twice");
            return;
        }

        *self.peer_addr.lock().expect("peer addr lock") = Some(addr);

        if !self.shared.is_stopped() {
            let listener = self.connection_listener.clone();
            let conn = self.clone();
            self.dispatcher
                .execute(move || listener.on_peer_authenticated(addr, conn));
        }
    }

    /// Send a message to the peer. Fire-and-forget: a stopped connection
    /// ignores the call, and I/O failures surface asynchronously through
    /// the disconnect notification, never to the caller.
    pub async fn send_message(self: &Arc<Self>, message: M) {
        if self.shared.is_stopped() {
            tracing::debug!(id = %self.id, "send_message called but connection already stopped");
            return;
        }

        let mut writer = self.writer.lock().await;
        if self.shared.is_stopped() {
            return;
        }

        // Every write is bounded: an unbounded write under TCP
        // backpressure would hold the lock forever and make shutdown
        // unreachable.
        let sent =
            tokio::time::timeout(self.config.send_timeout, writer.send(Outbound::Message(message)))
                .await;
        match sent {
            Ok(Ok(())) => self.shared.touch(),
            Ok(Err(ConnectionError::MessageTooLarge { size, max })) => {
                // A local bug, not peer hostility; the session survives.
                tracing::warn!(id = %self.id, size, max, "Dropping oversized outbound message");
            }
            Ok(Err(e)) => {
                drop(writer);
                self.handle_failure(e).await;
            }
            Err(_elapsed) => {
                drop(writer);
                self.handle_failure(ConnectionError::SendTimeout).await;
            }
        }
    }

    /// Report a protocol violation by the peer. Exceeding the tolerance
    /// for the category force-closes the connection without a close frame.
    pub async fn report_illegal_request(self: &Arc<Self>, violation: Violation) {
        self.handle_violation(violation).await;
    }

    pub(crate) async fn handle_violation(self: &Arc<Self>, violation: Violation) {
        if self
            .shared
            .report_violation(violation, self.config.illegal_request_tolerance)
        {
            tracing::warn!(
                id = %self.id,
                category = %violation,
                "Illegal request tolerance exceeded, closing connection"
            );
            self.shared.record_reason(CloseReason::IllegalRequest);
            self.shut_down(false, None).await;
        }
    }

    /// Classify a failure and force the connection down. Idempotent with
    /// respect to the recorded reason: only the first classification
    /// sticks.
    pub(crate) async fn handle_failure(self: &Arc<Self>, err: ConnectionError) {
        let reason = self
            .shared
            .classify_failure(&err, self.is_shutdown_started());
        tracing::debug!(id = %self.id, error = %err, reason = %reason, "Connection failure");
        self.shut_down(false, None).await;
    }

    /// Forward an inbound message to the listener via the dispatch queue.
    pub(crate) fn deliver(self: &Arc<Self>, message: M) {
        let listener = self.message_listener.clone();
        let conn = self.clone();
        self.dispatcher
            .execute(move || listener.on_message(message, conn));
    }

    /// Shut the connection down. Idempotent: only the first call has any
    /// effect, and `on_disconnect` fires exactly once.
    ///
    /// With `send_close`, a close frame is written best-effort and teardown
    /// proceeds after a fixed grace period regardless of the write's
    /// outcome. Without it, teardown is immediate. The completion handler,
    /// if any, runs on the dispatch queue after the socket is closed; no
    /// listener notification follows it.
    pub async fn shut_down(
        self: &Arc<Self>,
        send_close: bool,
        completion: Option<CompletionHandler>,
    ) {
        if self.shutdown_started.swap(true, Ordering::SeqCst) {
            tracing::trace!(id = %self.id, "shut_down called but already shutting down");
            return;
        }

        tracing::info!(
            id = %self.id,
            peer = ?self.peer_address(),
            authenticated = self.is_authenticated(),
            send_close,
            "Shutting down connection"
        );

        // Resolve the reason now. Failures classified before this call keep
        // precedence; an EOF raced by the remote tearing down during the
        // grace period must not.
        self.shared.record_reason(CloseReason::ShutDown);

        if send_close && !self.shared.is_stopped() {
            let conn = self.clone();
            tokio::spawn(async move {
                conn.send_close_frame().await;
                tokio::time::sleep(conn.config.close_grace_period).await;
                conn.continue_shutdown(completion).await;
            });
        } else {
            self.continue_shutdown(completion).await;
        }
    }

    /// Best-effort close frame; a failed write is logged and ignored since
    /// teardown follows either way.
    async fn send_close_frame(&self) {
        let mut writer = self.writer.lock().await;
        let sent =
            tokio::time::timeout(self.config.send_timeout, writer.send(Outbound::Close)).await;
        match sent {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::debug!(id = %self.id, error = %e, "Close frame not delivered");
            }
            Err(_elapsed) => {
                tracing::debug!(id = %self.id, "Close frame send timed out");
            }
        }
    }

    async fn continue_shutdown(self: &Arc<Self>, completion: Option<CompletionHandler>) {
        self.shared.set_stopped();

        let reason = self.shared.close_reason().unwrap_or(CloseReason::ShutDown);

        let listener = self.connection_listener.clone();
        let conn = self.clone();
        self.dispatcher
            .execute(move || listener.on_disconnect(reason, conn));

        // Close the write half; errors here are expected when the failure
        // originated on the socket itself.
        {
            let mut writer = self.writer.lock().await;
            if let Err(e) = writer.get_mut().shutdown().await {
                tracing::trace!(id = %self.id, error = %e, "Socket close failed during shutdown");
            }
        }

        // A blocked read only ends when the read half is dropped, so abort
        // the reader task and give it a bounded wait. Aborting is safe when
        // this runs on the reader task itself: everything above has already
        // happened, and the abort lands at the next await point.
        let handle = self
            .reader_handle
            .lock()
            .expect("reader handle lock")
            .take();
        if let Some(handle) = handle {
            handle.abort();
            let _ = tokio::time::timeout(self.config.reader_join_timeout, handle).await;
        }

        tracing::debug!(id = %self.id, reason = %reason, "Connection shutdown complete");

        if let Some(completion) = completion {
            self.dispatcher.execute(completion);
        }
    }
}

// Accessors touch no message-typed data, so they carry no bound on `M`.
impl<M> Connection<M> {
    /// The connection's process-local identifier.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// The authenticated peer address, if any.
    pub fn peer_address(&self) -> Option<SocketAddr> {
        *self.peer_addr.lock().expect("peer addr lock")
    }

    /// Whether the peer's address has been authenticated.
    pub fn is_authenticated(&self) -> bool {
        self.authenticated.load(Ordering::SeqCst)
    }

    /// Whether the connection has been stopped. Monotonic; never resets.
    pub fn is_stopped(&self) -> bool {
        self.shared.is_stopped()
    }

    /// Time of the last successful send or receive.
    pub fn last_activity(&self) -> Instant {
        self.shared.last_activity()
    }

    pub(crate) fn is_shutdown_started(&self) -> bool {
        self.shutdown_started.load(Ordering::SeqCst)
    }
}

impl<M> PartialEq for Connection<M> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<M> Eq for Connection<M> {}

impl<M> Hash for Connection<M> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl<M> fmt::Debug for Connection<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("peer_addr", &self.peer_address())
            .field("authenticated", &self.is_authenticated())
            .field("stopped", &self.shared.is_stopped())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_ids_are_unique() {
        let a = ConnectionId::next();
        let b = ConnectionId::next();
        assert_ne!(a, b);
    }

    #[test]
    fn test_connection_id_display() {
        let id = ConnectionId(7);
        assert_eq!(id.to_string(), "conn-7");
    }
}
