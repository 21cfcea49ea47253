//! Stat Event Envelope Codec
//!
//! This module defines the wire format for a single view/like interaction
//! travelling through the durable log.
//!
//! ## Format
//!
//! Events are protobuf messages so that producers written in other languages
//! (the gateway) can emit them with stock tooling, and so the schema can
//! evolve by adding field numbers:
//!
//! ```text
//! message TPostStats {
//!     uint64 post_id = 1;
//!     uint64 viewed  = 2;   // 0 or 1
//!     uint64 liked   = 3;   // 0 or 1
//! }
//! ```
//!
//! ## Decoding Rules
//!
//! - Empty payload → [`DecodeError::Empty`]
//! - Truncated/invalid protobuf framing → [`DecodeError::Malformed`]
//! - `viewed`/`liked` outside `{0, 1}` → [`DecodeError::FieldOutOfRange`]
//! - Unknown field numbers are skipped
//!
//! Decoding never panics; a bad message is a value the caller can log and
//! skip.
//!
//! ## Example
//! ```ignore
//! use poststats_core::codec::{decode, encode, StatEvent};
//!
//! let bytes = encode(&StatEvent::like(42));
//! let event = decode(&bytes)?;
//! assert_eq!(event.post_id, 42);
//! ```

use bytes::Bytes;
use prost::Message;

use crate::error::DecodeError;

/// A single view/like interaction, in transit.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Message)]
pub struct StatEvent {
    #[prost(uint64, tag = "1")]
    pub post_id: u64,

    /// View increment (0 or 1).
    #[prost(uint64, tag = "2")]
    pub viewed: u64,

    /// Like increment (0 or 1).
    #[prost(uint64, tag = "3")]
    pub liked: u64,
}

impl StatEvent {
    pub fn new(post_id: u64, viewed: u64, liked: u64) -> Self {
        Self {
            post_id,
            viewed,
            liked,
        }
    }

    /// Event recording one view of `post_id`.
    pub fn view(post_id: u64) -> Self {
        Self::new(post_id, 1, 0)
    }

    /// Event recording one like of `post_id`.
    pub fn like(post_id: u64) -> Self {
        Self::new(post_id, 0, 1)
    }

    fn validate(self) -> Result<Self, DecodeError> {
        if self.viewed > 1 {
            return Err(DecodeError::FieldOutOfRange {
                field: "viewed",
                value: self.viewed,
            });
        }
        if self.liked > 1 {
            return Err(DecodeError::FieldOutOfRange {
                field: "liked",
                value: self.liked,
            });
        }
        Ok(self)
    }
}

/// Encode an event into its binary envelope.
pub fn encode(event: &StatEvent) -> Bytes {
    Bytes::from(event.encode_to_vec())
}

/// Number of bytes [`encode`] will produce for `event`.
pub fn encoded_len(event: &StatEvent) -> usize {
    event.encoded_len()
}

/// Decode a binary envelope into a validated event.
pub fn decode(payload: &[u8]) -> Result<StatEvent, DecodeError> {
    if payload.is_empty() {
        return Err(DecodeError::Empty);
    }

    let event = StatEvent::decode(payload)?;
    event.validate()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_view_and_like_constructors() {
        assert_eq!(StatEvent::view(7), StatEvent::new(7, 1, 0));
        assert_eq!(StatEvent::like(7), StatEvent::new(7, 0, 1));
    }

    #[test]
    fn test_decode_like_event() {
        let bytes = encode(&StatEvent::like(1234));
        let event = decode(&bytes).unwrap();
        assert_eq!(event.post_id, 1234);
        assert_eq!(event.viewed, 0);
        assert_eq!(event.liked, 1);
    }

    #[test]
    fn test_encoded_len_matches_output() {
        let event = StatEvent::new(u64::MAX, 1, 1);
        assert_eq!(encoded_len(&event), encode(&event).len());
    }

    #[test]
    fn test_decode_empty_payload() {
        assert!(matches!(decode(&[]), Err(DecodeError::Empty)));
    }

    #[test]
    fn test_decode_truncated_payload() {
        let bytes = encode(&StatEvent::view(u64::MAX));
        // cut inside the post_id varint
        let truncated = &bytes[..5];
        assert!(matches!(decode(truncated), Err(DecodeError::Malformed(_))));
    }

    #[test]
    fn test_decode_rejects_out_of_range_viewed() {
        let bytes = StatEvent::new(1, 5, 0).encode_to_vec();
        match decode(&bytes) {
            Err(DecodeError::FieldOutOfRange { field, value }) => {
                assert_eq!(field, "viewed");
                assert_eq!(value, 5);
            }
            other => panic!("expected FieldOutOfRange, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_rejects_out_of_range_liked() {
        let bytes = StatEvent::new(1, 0, 2).encode_to_vec();
        assert!(matches!(
            decode(&bytes),
            Err(DecodeError::FieldOutOfRange { field: "liked", value: 2 })
        ));
    }

    #[test]
    fn test_decode_skips_unknown_fields() {
        let mut bytes = encode(&StatEvent::view(9)).to_vec();
        // field 15, varint wire type, value 1
        bytes.extend_from_slice(&[0x78, 0x01]);
        let event = decode(&bytes).unwrap();
        assert_eq!(event, StatEvent::view(9));
    }
}
