//! Termination reason taxonomy.

use std::fmt;

/// Why a connection ended.
///
/// Assigned once per connection: the first classification recorded is the
/// one reported to listeners, regardless of later failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The peer closed the stream cleanly.
    PeerDisconnected,
    /// The connection was reset by the peer or the network.
    Reset,
    /// The read timeout elapsed with no traffic.
    Timeout,
    /// The socket was already closed on our side when the failure surfaced.
    SocketClosed,
    /// Ordinary, locally requested shutdown.
    ShutDown,
    /// The peer exceeded the illegal-request tolerance.
    IllegalRequest,
    /// Unanticipated failure; details are in the log.
    Unknown,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::PeerDisconnected => write!(f, "peer_disconnected"),
            CloseReason::Reset => write!(f, "reset"),
            CloseReason::Timeout => write!(f, "timeout"),
            CloseReason::SocketClosed => write!(f, "socket_closed"),
            CloseReason::ShutDown => write!(f, "shut_down"),
            CloseReason::IllegalRequest => write!(f, "illegal_request"),
            CloseReason::Unknown => write!(f, "unknown"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(CloseReason::PeerDisconnected.to_string(), "peer_disconnected");
        assert_eq!(CloseReason::ShutDown.to_string(), "shut_down");
        assert_eq!(CloseReason::IllegalRequest.to_string(), "illegal_request");
    }
}
