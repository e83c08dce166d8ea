//! Connection configuration.

use std::time::Duration;

/// Network magic bytes identifying the Bazaar protocol.
pub const NETWORK_MAGIC: [u8; 4] = [0x42, 0x5A, 0x41, 0x52]; // "BZAR"

/// Default maximum message size in bytes (5 MiB).
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 5 * 1024 * 1024;

/// Default number of illegal requests tolerated per category before the
/// connection is force-closed.
pub const DEFAULT_ILLEGAL_REQUEST_TOLERANCE: usize = 5;

/// Default socket read timeout.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Default bound on a single framed write.
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// Default grace period after sending a close frame before teardown.
pub const DEFAULT_CLOSE_GRACE_PERIOD: Duration = Duration::from_millis(200);

/// Default bounded wait for the reader task to finish during teardown.
pub const DEFAULT_READER_JOIN_TIMEOUT: Duration = Duration::from_millis(500);

/// Configuration for a single peer connection.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Maximum size of a single framed message, enforced on receipt.
    pub max_message_size: usize,

    /// Illegal requests tolerated per category before forced shutdown.
    pub illegal_request_tolerance: usize,

    /// How long a read may block before the connection is considered dead.
    pub read_timeout: Duration,

    /// How long a single write may block before the peer is considered
    /// dead. A peer that stops reading wedges writes through TCP
    /// backpressure; this bound keeps shutdown reachable.
    pub send_timeout: Duration,

    /// How long to wait after a best-effort close frame before teardown.
    pub close_grace_period: Duration,

    /// Bounded wait for the reader task during teardown.
    pub reader_join_timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            illegal_request_tolerance: DEFAULT_ILLEGAL_REQUEST_TOLERANCE,
            read_timeout: DEFAULT_READ_TIMEOUT,
            send_timeout: DEFAULT_SEND_TIMEOUT,
            close_grace_period: DEFAULT_CLOSE_GRACE_PERIOD,
            reader_join_timeout: DEFAULT_READER_JOIN_TIMEOUT,
        }
    }
}

impl ConnectionConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum message size.
    pub fn with_max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    /// Set the per-category illegal request tolerance.
    pub fn with_illegal_request_tolerance(mut self, tolerance: usize) -> Self {
        self.illegal_request_tolerance = tolerance;
        self
    }

    /// Set the socket read timeout.
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Set the per-write send timeout.
    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    /// Set the close-frame grace period.
    pub fn with_close_grace_period(mut self, period: Duration) -> Self {
        self.close_grace_period = period;
        self
    }

    /// Set the bounded reader join wait.
    pub fn with_reader_join_timeout(mut self, timeout: Duration) -> Self {
        self.reader_join_timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ConnectionConfig::default();
        assert_eq!(config.max_message_size, DEFAULT_MAX_MESSAGE_SIZE);
        assert_eq!(config.illegal_request_tolerance, DEFAULT_ILLEGAL_REQUEST_TOLERANCE);
        assert_eq!(config.read_timeout, DEFAULT_READ_TIMEOUT);
        assert_eq!(config.send_timeout, DEFAULT_SEND_TIMEOUT);
        assert_eq!(config.close_grace_period, DEFAULT_CLOSE_GRACE_PERIOD);
    }

    #[test]
    fn test_config_builder() {
        let config = ConnectionConfig::new()
            .with_max_message_size(1024)
            .with_illegal_request_tolerance(2)
            .with_read_timeout(Duration::from_secs(5))
            .with_send_timeout(Duration::from_secs(1))
            .with_close_grace_period(Duration::from_millis(50));

        assert_eq!(config.max_message_size, 1024);
        assert_eq!(config.illegal_request_tolerance, 2);
        assert_eq!(config.read_timeout, Duration::from_secs(5));
        assert_eq!(config.send_timeout, Duration::from_secs(1));
        assert_eq!(config.close_grace_period, Duration::from_millis(50));
    }
}
