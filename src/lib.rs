//! Peer connection layer for the Bazaar decentralized trading network.
//!
//! This crate owns the lifecycle of a single duplex connection to one peer:
//! it frames and exchanges application messages, tolerates malformed or
//! hostile input up to a configured threshold, and tears the connection
//! down cooperatively or forcibly while classifying the reason.
//!
//! # Architecture
//!
//! Each connection runs a dedicated reader task that owns the read half of
//! the socket; the [`Connection`] object owns the write half and shutdown
//! authority, and the two share only a guarded state struct. All listener
//! callbacks from every connection are marshalled through one
//! [`Dispatcher`], so listener code executes strictly sequentially.
//!
//! ```text
//! Caller tasks ──send_message──▶ Connection ──▶ write half
//! read half ──▶ Reader task ──decode/validate──▶ Connection
//!                                                    │
//!            Dispatcher (single FIFO worker) ◀───────┘
//!                    │
//!            MessageListener / ConnectionListener
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use bazaar_p2p::{Connection, ConnectionConfig, Dispatcher};
//! use std::sync::Arc;
//!
//! let dispatcher = Dispatcher::new();
//! let conn = Connection::<MyMessage>::new(
//!     stream,
//!     message_listener,
//!     connection_listener,
//!     ConnectionConfig::default(),
//!     dispatcher,
//! );
//! conn.send_message(MyMessage::Hello).await;
//! conn.shut_down(true, None).await;
//! ```

pub mod config;
pub mod connection;
pub mod dispatch;
pub mod error;
pub mod protocol;
pub mod serialization;

// Re-export main types
pub use config::{ConnectionConfig, DEFAULT_MAX_MESSAGE_SIZE, NETWORK_MAGIC};
pub use connection::{
    CloseReason, CompletionHandler, Connection, ConnectionId, ConnectionListener,
    MessageListener, Violation,
};
pub use dispatch::Dispatcher;
pub use error::{ConnectionError, ConnectionResult};
pub use protocol::WireMessage;
