//! Illegal-request taxonomy.

use std::fmt;

/// A category of protocol violation by the peer.
///
/// Individual violations are tolerated and counted per category; a
/// connection is force-closed only once a category's count exceeds the
/// configured tolerance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Violation {
    /// A frame whose declared or actual payload size exceeds the maximum.
    MaxSizeExceeded,
    /// A frame that is not a recognized message (unknown kind byte, or a
    /// payload that does not decode as the expected message type).
    InvalidDataType,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::MaxSizeExceeded => write!(f, "max_size_exceeded"),
            Violation::InvalidDataType => write!(f, "invalid_data_type"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(Violation::MaxSizeExceeded.to_string(), "max_size_exceeded");
        assert_eq!(Violation::InvalidDataType.to_string(), "invalid_data_type");
    }
}
