//! Listener contracts implemented by the layers above.
//!
//! Every method is invoked through the [`Dispatcher`](crate::Dispatcher),
//! never concurrently and never on a reader or caller task, so
//! implementations need no synchronization of their own.

use std::net::SocketAddr;
use std::sync::Arc;

use crate::connection::{CloseReason, Connection};

/// Receives application messages from a connection.
pub trait MessageListener<M>: Send + Sync {
    /// A well-formed message arrived on `connection`.
    fn on_message(&self, message: M, connection: Arc<Connection<M>>);
}

/// Observes connection lifecycle events.
pub trait ConnectionListener<M>: Send + Sync {
    /// A connection was established.
    fn on_connection(&self, connection: Arc<Connection<M>>);

    /// The peer's network address was authenticated.
    fn on_peer_authenticated(&self, addr: SocketAddr, connection: Arc<Connection<M>>);

    /// The connection terminated. Fired exactly once per connection; no
    /// further notifications follow it.
    fn on_disconnect(&self, reason: CloseReason, connection: Arc<Connection<M>>);
}
