//! Wire protocol: frame layout and codec.

pub mod framing;

pub use framing::{FrameCodec, Inbound, Outbound, FRAME_KIND_CLOSE, FRAME_KIND_MESSAGE};

use serde::{de::DeserializeOwned, Serialize};

/// Bound for application message types carried over a connection.
///
/// The connection layer treats messages as opaque: anything serde can move
/// across a task boundary qualifies. Blanket-implemented; never implement
/// it by hand.
pub trait WireMessage: Serialize + DeserializeOwned + Send + 'static {}

impl<T: Serialize + DeserializeOwned + Send + 'static> WireMessage for T {}
