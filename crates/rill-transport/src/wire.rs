//! # Rill Wire Format
//!
//! One datagram carries exactly one segment or one acknowledgment.
//!
//! ## Data Segment (8-byte header + payload)
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                   Sequence Number (32, BE)                     |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                     Checksum (32, BE)                          |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                  Payload (0..MAX_SEGMENT_PAYLOAD)              |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! The checksum is an additive sum over the big-endian sequence-number bytes
//! followed by the payload, truncated to 32 bits. The reserved sequence
//! `0xFFFF_FFFF` marks end-of-stream and carries an empty payload.
//!
//! ## Acknowledgment (4 bytes)
//!
//! A bare big-endian sequence number naming the segment being acknowledged.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::WireError;

// ─── Constants ───────────────────────────────────────────────────────────────

/// Largest datagram the channel will carry.
pub const MAX_DATAGRAM: usize = 1400;

/// Segment header: 4 (sequence) + 4 (checksum).
pub const HEADER_LEN: usize = 8;

/// Maximum payload per segment.
pub const MAX_SEGMENT_PAYLOAD: usize = MAX_DATAGRAM - HEADER_LEN;

/// Reserved sequence number signalling end-of-stream.
pub const END_MARKER_SEQ: u32 = 0xFFFF_FFFF;

// ─── Checksum ───────────────────────────────────────────────────────────────

/// Additive checksum over `seq_bytes || payload`, wrapping at 32 bits.
pub fn checksum(sequence: u32, payload: &[u8]) -> u32 {
    let seq_bytes = sequence.to_be_bytes();
    seq_bytes
        .iter()
        .chain(payload.iter())
        .fold(0u32, |sum, &b| sum.wrapping_add(b as u32))
}

// ─── Segment ────────────────────────────────────────────────────────────────

/// A decoded transport segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// Monotonically increasing per chunk; `END_MARKER_SEQ` is reserved.
    pub sequence: u32,
    /// Checksum as carried on the wire (not necessarily valid).
    pub checksum: u32,
    /// Payload bytes (empty for the end marker).
    pub payload: Bytes,
}

impl Segment {
    /// Build a data segment, computing the checksum.
    pub fn data(sequence: u32, payload: Bytes) -> Self {
        debug_assert!(payload.len() <= MAX_SEGMENT_PAYLOAD);
        Segment {
            sequence,
            checksum: checksum(sequence, &payload),
            payload,
        }
    }

    /// Build the end-of-stream marker.
    pub fn end_marker() -> Self {
        Segment {
            sequence: END_MARKER_SEQ,
            checksum: checksum(END_MARKER_SEQ, &[]),
            payload: Bytes::new(),
        }
    }

    /// Whether this segment is the end-of-stream marker.
    pub fn is_end_marker(&self) -> bool {
        self.sequence == END_MARKER_SEQ
    }

    /// Serialize into wire bytes: `[seq][checksum][payload]`.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(HEADER_LEN + self.payload.len());
        buf.put_u32(self.sequence);
        buf.put_u32(self.checksum);
        buf.extend_from_slice(&self.payload);
        buf.freeze()
    }

    /// Decode a segment from a raw datagram.
    ///
    /// Fails with [`WireError::MalformedSegment`] if the datagram is shorter
    /// than the 8-byte header. The checksum is carried through undecoded for
    /// the caller to [`verify`](Segment::verify).
    pub fn decode(datagram: &[u8]) -> Result<Self, WireError> {
        if datagram.len() < HEADER_LEN {
            return Err(WireError::MalformedSegment(datagram.len()));
        }
        let mut buf = datagram;
        let sequence = buf.get_u32();
        let cksum = buf.get_u32();
        Ok(Segment {
            sequence,
            checksum: cksum,
            payload: Bytes::copy_from_slice(buf),
        })
    }

    /// Recompute the checksum and compare with the carried one.
    ///
    /// A mismatch means the datagram was corrupted in flight; the receiver
    /// treats that identically to a lost datagram.
    pub fn verify(&self) -> bool {
        checksum(self.sequence, &self.payload) == self.checksum
    }
}

// ─── Acknowledgment ─────────────────────────────────────────────────────────

/// An acknowledgment naming one accepted segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ack {
    pub sequence: u32,
}

impl Ack {
    /// ACK length on the wire.
    pub const ENCODED_LEN: usize = 4;

    pub fn new(sequence: u32) -> Self {
        Ack { sequence }
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(Self::ENCODED_LEN);
        buf.put_u32(self.sequence);
        buf.freeze()
    }

    /// Decode from a raw datagram; fails if fewer than 4 bytes are present.
    pub fn decode(datagram: &[u8]) -> Result<Self, WireError> {
        if datagram.len() < Self::ENCODED_LEN {
            return Err(WireError::MalformedSegment(datagram.len()));
        }
        let mut buf = datagram;
        Ok(Ack {
            sequence: buf.get_u32(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn segment_roundtrip() {
        let seg = Segment::data(7, Bytes::from_static(b"hello rill"));
        let decoded = Segment::decode(&seg.encode()).unwrap();
        assert_eq!(decoded, seg);
        assert!(decoded.verify());
    }

    #[test]
    fn empty_payload_segment() {
        let seg = Segment::data(0, Bytes::new());
        let wire = seg.encode();
        assert_eq!(wire.len(), HEADER_LEN);
        assert!(Segment::decode(&wire).unwrap().verify());
    }

    #[test]
    fn decode_too_short_is_malformed() {
        for len in 0..HEADER_LEN {
            let err = Segment::decode(&vec![0u8; len]).unwrap_err();
            assert!(matches!(err, WireError::MalformedSegment(l) if l == len));
        }
    }

    #[test]
    fn end_marker_shape() {
        let end = Segment::end_marker();
        assert!(end.is_end_marker());
        assert!(end.payload.is_empty());
        let decoded = Segment::decode(&end.encode()).unwrap();
        assert_eq!(decoded.sequence, END_MARKER_SEQ);
        assert!(decoded.verify());
    }

    #[test]
    fn checksum_covers_sequence_bytes() {
        // Same payload, different sequence → different checksum.
        let payload = Bytes::from_static(b"xyz");
        assert_ne!(checksum(1, &payload), checksum(2, &payload));
    }

    #[test]
    fn single_bit_flip_in_payload_fails_verify() {
        let seg = Segment::data(3, Bytes::from_static(b"corruptible"));
        let wire = seg.encode().to_vec();
        for bit in 0..8 {
            let mut flipped = wire.clone();
            flipped[HEADER_LEN + 2] ^= 1 << bit;
            let decoded = Segment::decode(&flipped).unwrap();
            assert!(!decoded.verify(), "bit {bit} flip should break checksum");
        }
        // Untouched copy still verifies.
        assert!(Segment::decode(&wire).unwrap().verify());
    }

    #[test]
    fn ack_roundtrip() {
        let ack = Ack::new(42);
        let decoded = Ack::decode(&ack.encode()).unwrap();
        assert_eq!(decoded.sequence, 42);
    }

    #[test]
    fn ack_too_short() {
        assert!(Ack::decode(&[0, 1]).is_err());
    }

    proptest! {
        #[test]
        fn proptest_segment_roundtrip(
            seq in 0u32..END_MARKER_SEQ,
            payload in proptest::collection::vec(any::<u8>(), 0..MAX_SEGMENT_PAYLOAD),
        ) {
            let seg = Segment::data(seq, Bytes::from(payload));
            let decoded = Segment::decode(&seg.encode()).unwrap();
            prop_assert_eq!(&decoded, &seg);
            prop_assert!(decoded.verify());
        }

        #[test]
        fn proptest_header_bit_flip_detected(
            seq in 0u32..END_MARKER_SEQ,
            payload in proptest::collection::vec(any::<u8>(), 1..64),
            bit in 0usize..(HEADER_LEN * 8),
        ) {
            // Flipping any single header bit changes either the carried
            // checksum or the additive sum, so verify must fail.
            let seg = Segment::data(seq, Bytes::from(payload));
            let mut wire = seg.encode().to_vec();
            wire[bit / 8] ^= 1 << (bit % 8);
            let decoded = Segment::decode(&wire).unwrap();
            prop_assert!(!decoded.verify());
        }
    }
}
