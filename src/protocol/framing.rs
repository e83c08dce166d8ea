//! Length-prefixed message framing codec.
//!
//! Frames are laid out as:
//! - 4 bytes: network magic
//! - 1 byte: frame kind (application message or close request)
//! - 4 bytes: big-endian payload length
//! - N bytes: bincode-serialized payload
//!
//! Frames that violate the protocol (oversized, unknown kind, undecodable
//! payload) are consumed and surfaced as [`Inbound::Violation`] items so the
//! read loop can apply the tolerance policy instead of failing outright.
//! Only a bad magic is fatal: the stream cannot be resynchronized after it.

use std::marker::PhantomData;

use bytes::{Buf, BufMut, BytesMut};
use serde::{de::DeserializeOwned, Serialize};
use tokio_util::codec::{Decoder, Encoder};

use crate::config::NETWORK_MAGIC;
use crate::connection::Violation;
use crate::error::{ConnectionError, ConnectionResult};
use crate::serialization;

/// Header size: 4 bytes magic + 1 byte kind + 4 bytes length.
const HEADER_SIZE: usize = 9;

/// Frame kind for an application message.
pub const FRAME_KIND_MESSAGE: u8 = 0x01;

/// Frame kind for a cooperative close request.
pub const FRAME_KIND_CLOSE: u8 = 0x02;

/// A decoded inbound item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound<M> {
    /// A well-formed application message.
    Message(M),
    /// The peer requests a cooperative close.
    Close,
    /// A malformed frame was consumed and discarded.
    Violation(Violation),
}

/// An outbound item to encode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound<M> {
    /// An application message.
    Message(M),
    /// A cooperative close request.
    Close,
}

#[derive(Debug)]
enum DecodeState {
    /// Waiting for a complete header.
    Header,
    /// Header read and accepted; waiting for the payload.
    Body { kind: u8, length: usize },
    /// Discarding the payload of a rejected frame.
    Skip { violation: Violation, remaining: usize },
}

/// Codec for Bazaar connection frames, generic over the application
/// message type.
#[derive(Debug)]
pub struct FrameCodec<M> {
    /// Maximum accepted payload length.
    max_message_size: usize,
    state: DecodeState,
    _marker: PhantomData<fn() -> M>,
}

impl<M> FrameCodec<M> {
    /// Create a codec enforcing the given payload size bound.
    pub fn new(max_message_size: usize) -> Self {
        Self {
            max_message_size,
            state: DecodeState::Header,
            _marker: PhantomData,
        }
    }

    /// Consume bytes of a rejected frame. Returns the violation once the
    /// whole payload has been discarded.
    fn consume_skip(&mut self, src: &mut BytesMut) -> Option<Violation> {
        if let DecodeState::Skip { violation, remaining } = &mut self.state {
            let take = (*remaining).min(src.len());
            src.advance(take);
            *remaining -= take;
            if *remaining == 0 {
                let violation = *violation;
                self.state = DecodeState::Header;
                return Some(violation);
            }
        }
        None
    }
}

impl<M: DeserializeOwned> Decoder for FrameCodec<M> {
    type Item = Inbound<M>;
    type Error = ConnectionError;

    fn decode(&mut self, src: &mut BytesMut) -> ConnectionResult<Option<Self::Item>> {
        loop {
            match self.state {
                DecodeState::Skip { .. } => {
                    return Ok(self.consume_skip(src).map(Inbound::Violation));
                }

                DecodeState::Header => {
                    if src.len() < HEADER_SIZE {
                        return Ok(None);
                    }

                    let magic: [u8; 4] = src[0..4].try_into().expect("slice is 4 bytes");
                    if magic != NETWORK_MAGIC {
                        return Err(ConnectionError::InvalidMagic {
                            expected: NETWORK_MAGIC,
                            actual: magic,
                        });
                    }

                    let kind = src[4];
                    let length = u32::from_be_bytes(
                        src[5..9].try_into().expect("slice is 4 bytes"),
                    ) as usize;

                    // Size is checked before the kind: an oversized frame is
                    // rejected as oversized no matter what it claims to be.
                    if length > self.max_message_size {
                        src.advance(HEADER_SIZE);
                        self.state = DecodeState::Skip {
                            violation: Violation::MaxSizeExceeded,
                            remaining: length,
                        };
                        continue;
                    }

                    if kind != FRAME_KIND_MESSAGE && kind != FRAME_KIND_CLOSE {
                        src.advance(HEADER_SIZE);
                        self.state = DecodeState::Skip {
                            violation: Violation::InvalidDataType,
                            remaining: length,
                        };
                        continue;
                    }

                    self.state = DecodeState::Body { kind, length };
                }

                DecodeState::Body { kind, length } => {
                    if src.len() < HEADER_SIZE + length {
                        // Reserve space for the full frame to avoid reallocations
                        src.reserve(HEADER_SIZE + length - src.len());
                        return Ok(None);
                    }

                    src.advance(HEADER_SIZE);
                    let payload = src.split_to(length);
                    self.state = DecodeState::Header;

                    if kind == FRAME_KIND_CLOSE {
                        return Ok(Some(Inbound::Close));
                    }

                    // A payload that does not decode as the expected message
                    // type is a tolerated violation, not a stream failure.
                    return match serialization::deserialize::<M>(&payload) {
                        Ok(message) => Ok(Some(Inbound::Message(message))),
                        Err(e) => {
                            tracing::debug!(error = %e, "Undecodable payload discarded");
                            Ok(Some(Inbound::Violation(Violation::InvalidDataType)))
                        }
                    };
                }
            }
        }
    }
}

impl<M: Serialize> Encoder<Outbound<M>> for FrameCodec<M> {
    type Error = ConnectionError;

    fn encode(&mut self, item: Outbound<M>, dst: &mut BytesMut) -> ConnectionResult<()> {
        match item {
            Outbound::Message(message) => {
                let payload = serialization::serialize(&message)?;
                let length = payload.len();

                if length > self.max_message_size {
                    return Err(ConnectionError::MessageTooLarge {
                        size: length,
                        max: self.max_message_size,
                    });
                }

                dst.reserve(HEADER_SIZE + length);
                dst.put_slice(&NETWORK_MAGIC);
                dst.put_u8(FRAME_KIND_MESSAGE);
                dst.put_u32(length as u32);
                dst.put_slice(&payload);
            }
            Outbound::Close => {
                dst.reserve(HEADER_SIZE);
                dst.put_slice(&NETWORK_MAGIC);
                dst.put_u8(FRAME_KIND_CLOSE);
                dst.put_u32(0);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    enum TestMsg {
        Offer(u64),
        Text(String),
    }

    const MAX: usize = 1024;

    fn codec() -> FrameCodec<TestMsg> {
        FrameCodec::new(MAX)
    }

    #[test]
    fn test_roundtrip_message() {
        let mut codec = codec();
        let original = Outbound::Message(TestMsg::Offer(42));

        let mut buf = BytesMut::new();
        codec.encode(original, &mut buf).unwrap();

        let decoded = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded, Inbound::Message(TestMsg::Offer(42)));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_roundtrip_close() {
        let mut codec = codec();

        let mut buf = BytesMut::new();
        codec.encode(Outbound::<TestMsg>::Close, &mut buf).unwrap();

        let decoded = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded, Inbound::Close);
    }

    #[test]
    fn test_partial_header() {
        let mut codec = codec();
        let mut buf = BytesMut::new();
        buf.put_slice(&NETWORK_MAGIC);
        // Only 4 bytes, not enough for a header

        let result = codec.decode(&mut buf).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_partial_message() {
        let mut codec = codec();
        let mut buf = BytesMut::new();

        buf.put_slice(&NETWORK_MAGIC);
        buf.put_u8(FRAME_KIND_MESSAGE);
        buf.put_u32(100); // 100 bytes expected
        buf.put_slice(&[0u8; 50]); // Only 50 bytes

        let result = codec.decode(&mut buf).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_invalid_magic_is_fatal() {
        let mut codec = codec();
        let mut buf = BytesMut::new();

        buf.put_slice(&[0xFF, 0xFF, 0xFF, 0xFF]);
        buf.put_u8(FRAME_KIND_MESSAGE);
        buf.put_u32(10);
        buf.put_slice(&[0u8; 10]);

        let result = codec.decode(&mut buf);
        assert!(matches!(result, Err(ConnectionError::InvalidMagic { .. })));
    }

    #[test]
    fn test_oversized_frame_is_skipped_not_fatal() {
        let mut codec = codec();
        let mut buf = BytesMut::new();

        buf.put_slice(&NETWORK_MAGIC);
        buf.put_u8(FRAME_KIND_MESSAGE);
        buf.put_u32((MAX + 1) as u32);
        buf.put_slice(&vec![0u8; MAX + 1]);

        let decoded = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded, Inbound::Violation(Violation::MaxSizeExceeded));

        // The stream recovers: a valid frame after it decodes normally.
        codec
            .encode(Outbound::Message(TestMsg::Offer(7)), &mut buf)
            .unwrap();
        let decoded = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded, Inbound::Message(TestMsg::Offer(7)));
    }

    #[test]
    fn test_oversized_frame_skipped_across_partial_reads() {
        let mut codec = codec();
        let mut buf = BytesMut::new();

        buf.put_slice(&NETWORK_MAGIC);
        buf.put_u8(FRAME_KIND_MESSAGE);
        buf.put_u32((MAX + 100) as u32);
        buf.put_slice(&vec![0u8; 60]);

        // Payload still arriving: no item yet.
        assert!(codec.decode(&mut buf).unwrap().is_none());
        assert!(buf.is_empty());

        buf.put_slice(&vec![0u8; MAX + 40]);
        let decoded = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded, Inbound::Violation(Violation::MaxSizeExceeded));
    }

    #[test]
    fn test_unknown_kind_is_violation() {
        let mut codec = codec();
        let mut buf = BytesMut::new();

        buf.put_slice(&NETWORK_MAGIC);
        buf.put_u8(0x7F);
        buf.put_u32(3);
        buf.put_slice(&[1, 2, 3]);

        let decoded = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded, Inbound::Violation(Violation::InvalidDataType));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_undecodable_payload_is_violation() {
        let mut codec = codec();
        let mut buf = BytesMut::new();

        buf.put_slice(&NETWORK_MAGIC);
        buf.put_u8(FRAME_KIND_MESSAGE);
        buf.put_u32(3);
        buf.put_slice(&[0xFF, 0xFF, 0xFF]);

        let decoded = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded, Inbound::Violation(Violation::InvalidDataType));
    }

    #[test]
    fn test_multiple_messages() {
        let mut codec = codec();
        let mut buf = BytesMut::new();

        codec
            .encode(Outbound::Message(TestMsg::Offer(1)), &mut buf)
            .unwrap();
        codec
            .encode(Outbound::Message(TestMsg::Text("hi".into())), &mut buf)
            .unwrap();

        let first = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(first, Inbound::Message(TestMsg::Offer(1)));

        let second = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(second, Inbound::Message(TestMsg::Text("hi".into())));

        assert!(buf.is_empty());
    }

    #[test]
    fn test_encode_rejects_oversized_message() {
        let mut codec = codec();
        let mut buf = BytesMut::new();

        let result = codec.encode(
            Outbound::Message(TestMsg::Text("x".repeat(MAX + 1))),
            &mut buf,
        );
        assert!(matches!(result, Err(ConnectionError::MessageTooLarge { .. })));
    }
}
