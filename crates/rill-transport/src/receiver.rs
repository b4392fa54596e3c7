//! # Receiver State Machine
//!
//! Per-arrival loop: decode, verify, buffer out-of-order segments, flush the
//! contiguous in-order prefix to the sink, answer every accepted segment
//! (and every duplicate) with an ACK.
//!
//! Policy corners, fixed deliberately:
//!
//! - A checksum mismatch is indistinguishable from loss at this layer: the
//!   segment is dropped silently and never acknowledged.
//! - Duplicates ARE re-ACKed — the sender discards its acknowledgment state
//!   on timeout, so duplicate ACKs are how it rebuilds window state.
//! - The end marker is acknowledged before terminating, so the sender's
//!   end-marker retry loop can stop.
//!
//! [`ReceiverSession`] is pure logic emitting [`ReceiverEvent`]s; [`recv`]
//! is the blocking driver that owns the channel and the sink.

use bytes::Bytes;
use std::collections::BTreeMap;
use std::io::{self, Write};
use std::time::Duration;

use crate::channel::Channel;
use crate::error::{ChannelError, WireError};
use crate::stats::ReceiverStats;
use crate::wire::{Ack, Segment};

// ─── Configuration ──────────────────────────────────────────────────────────

/// Receiver tuning knobs.
#[derive(Debug, Clone)]
pub struct ReceiverConfig {
    /// Channel read timeout; expiry re-arms the read rather than
    /// terminating the transfer.
    pub read_timeout: Duration,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        ReceiverConfig {
            read_timeout: Duration::from_millis(500),
        }
    }
}

// ─── Events ─────────────────────────────────────────────────────────────────

/// What the driver must do in response to one arrival.
#[derive(Debug)]
pub enum ReceiverEvent {
    /// Send this acknowledgment back over the channel.
    SendAck(Ack),
    /// Write this payload to the sink (and flush, so partial progress is
    /// observable).
    Deliver(Bytes),
    /// End marker seen — terminate after processing the other events.
    Finished,
}

// ─── Session ────────────────────────────────────────────────────────────────

/// All mutable receiver state, owned exclusively by the driver loop.
pub struct ReceiverSession {
    /// Next sequence number owed to the sink.
    expected_seq: u32,
    /// Out-of-order arrivals awaiting the gap fill. Keys are always
    /// `>= expected_seq`.
    buffer: BTreeMap<u32, Bytes>,
    events: Vec<ReceiverEvent>,
    finished: bool,
    stats: ReceiverStats,
}

impl Default for ReceiverSession {
    fn default() -> Self {
        Self::new()
    }
}

impl ReceiverSession {
    pub fn new() -> Self {
        ReceiverSession {
            expected_seq: 0,
            buffer: BTreeMap::new(),
            events: Vec::new(),
            finished: false,
            stats: ReceiverStats::default(),
        }
    }

    /// Process one raw datagram, queueing the resulting events.
    pub fn handle_datagram(&mut self, datagram: &[u8]) {
        self.stats.datagrams_received += 1;

        let segment = match Segment::decode(datagram) {
            Ok(s) => s,
            Err(WireError::MalformedSegment(len)) => {
                tracing::debug!(len, "dropping malformed datagram");
                self.stats.malformed += 1;
                return;
            }
        };

        if !segment.verify() {
            // Corruption is loss: no ACK, or the sender would take a
            // mangled segment for a delivered one. Checked before the
            // end-marker test so a bit-flipped sequence cannot fake
            // end-of-stream.
            tracing::debug!(seq = segment.sequence, "checksum mismatch, dropping");
            self.stats.checksum_failures += 1;
            return;
        }

        if segment.is_end_marker() {
            tracing::debug!("end marker received");
            self.push_ack(Ack::new(segment.sequence));
            self.finished = true;
            self.events.push(ReceiverEvent::Finished);
            return;
        }

        let seq = segment.sequence;
        if seq < self.expected_seq || self.buffer.contains_key(&seq) {
            tracing::trace!(seq, "duplicate segment, re-acking");
            self.stats.duplicates += 1;
            self.push_ack(Ack::new(seq));
            return;
        }

        self.buffer.insert(seq, segment.payload);
        self.push_ack(Ack::new(seq));
        self.flush();
    }

    /// Emit Deliver events for the contiguous prefix now available.
    fn flush(&mut self) {
        while let Some(payload) = self.buffer.remove(&self.expected_seq) {
            self.expected_seq += 1;
            self.stats.segments_delivered += 1;
            self.stats.bytes_delivered += payload.len() as u64;
            self.events.push(ReceiverEvent::Deliver(payload));
        }
    }

    fn push_ack(&mut self, ack: Ack) {
        self.stats.acks_sent += 1;
        self.events.push(ReceiverEvent::SendAck(ack));
    }

    /// Drain queued events in arrival order.
    pub fn drain_events(&mut self) -> impl Iterator<Item = ReceiverEvent> + '_ {
        self.events.drain(..)
    }

    /// Whether the end marker has been seen.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Next sequence number owed to the sink.
    pub fn expected_seq(&self) -> u32 {
        self.expected_seq
    }

    /// Out-of-order segments currently buffered.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn stats(&self) -> &ReceiverStats {
        &self.stats
    }
}

// ─── Driver ─────────────────────────────────────────────────────────────────

/// Receive a transfer from `channel`, writing in-order payload to `sink`.
///
/// Blocks until the end marker arrives or the channel closes; read timeouts
/// just re-arm the loop. Returns the transfer counters; `bytes_delivered`
/// is the number of payload bytes written. The sink is flushed after every
/// write so partial progress is observable, and once more on exit.
pub fn recv<C: Channel, W: Write>(
    channel: &mut C,
    sink: &mut W,
    config: ReceiverConfig,
) -> io::Result<ReceiverStats> {
    let mut session = ReceiverSession::new();
    tracing::debug!("receiver listening");

    'listen: loop {
        let datagram = match channel.recv_timeout(config.read_timeout) {
            Ok(d) => d,
            Err(ChannelError::Timeout) => {
                tracing::trace!("read timeout, still listening");
                continue;
            }
            Err(ChannelError::Closed) => {
                tracing::debug!("channel closed");
                break;
            }
        };

        session.handle_datagram(&datagram);
        for event in session.drain_events() {
            match event {
                ReceiverEvent::SendAck(ack) => {
                    tracing::trace!(seq = ack.sequence, "sending ack");
                    // A dead channel here also surfaces on the next read.
                    let _ = channel.send(&ack.encode());
                }
                ReceiverEvent::Deliver(payload) => {
                    sink.write_all(&payload)?;
                    sink.flush()?;
                }
                ReceiverEvent::Finished => break 'listen,
            }
        }
    }

    sink.flush()?;
    tracing::debug!(
        bytes = session.stats().bytes_delivered,
        duplicates = session.stats().duplicates,
        checksum_failures = session.stats().checksum_failures,
        "receiver finished"
    );
    Ok(session.stats().clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::{checksum, END_MARKER_SEQ};
    use bytes::{BufMut, BytesMut};

    fn wire_segment(seq: u32, payload: &[u8]) -> Bytes {
        Segment::data(seq, Bytes::copy_from_slice(payload)).encode()
    }

    fn corrupted_segment(seq: u32, payload: &[u8]) -> Bytes {
        let mut buf = BytesMut::new();
        buf.put_u32(seq);
        buf.put_u32(checksum(seq, payload).wrapping_add(1));
        buf.extend_from_slice(payload);
        buf.freeze()
    }

    fn deliveries(session: &mut ReceiverSession) -> Vec<Bytes> {
        session
            .drain_events()
            .filter_map(|e| match e {
                ReceiverEvent::Deliver(p) => Some(p),
                _ => None,
            })
            .collect()
    }

    fn acks(session: &mut ReceiverSession) -> Vec<u32> {
        session
            .drain_events()
            .filter_map(|e| match e {
                ReceiverEvent::SendAck(a) => Some(a.sequence),
                _ => None,
            })
            .collect()
    }

    // ─── In-Order Delivery ──────────────────────────────────────────────

    #[test]
    fn in_order_segments_deliver_immediately() {
        let mut rx = ReceiverSession::new();
        rx.handle_datagram(&wire_segment(0, b"aa"));
        rx.handle_datagram(&wire_segment(1, b"bb"));

        let out = deliveries(&mut rx);
        assert_eq!(out, vec![&b"aa"[..], &b"bb"[..]]);
        assert_eq!(rx.expected_seq(), 2);
        assert_eq!(rx.stats().bytes_delivered, 4);
    }

    #[test]
    fn every_accepted_segment_is_acked() {
        let mut rx = ReceiverSession::new();
        rx.handle_datagram(&wire_segment(0, b"aa"));
        rx.handle_datagram(&wire_segment(1, b"bb"));
        assert_eq!(acks(&mut rx), vec![0, 1]);
    }

    // ─── Out-of-Order Buffering ─────────────────────────────────────────

    #[test]
    fn gap_holds_delivery_until_filled() {
        let mut rx = ReceiverSession::new();
        rx.handle_datagram(&wire_segment(0, b"aa"));
        deliveries(&mut rx);

        rx.handle_datagram(&wire_segment(2, b"cc"));
        assert!(deliveries(&mut rx).is_empty(), "seq 2 must wait for 1");
        assert_eq!(rx.buffered(), 1);

        rx.handle_datagram(&wire_segment(1, b"bb"));
        let out = deliveries(&mut rx);
        assert_eq!(out, vec![&b"bb"[..], &b"cc"[..]]);
        assert_eq!(rx.buffered(), 0);
    }

    #[test]
    fn out_of_order_segment_still_acked() {
        let mut rx = ReceiverSession::new();
        rx.handle_datagram(&wire_segment(2, b"cc"));
        assert_eq!(acks(&mut rx), vec![2]);
    }

    // ─── Duplicates ─────────────────────────────────────────────────────

    #[test]
    fn delivered_duplicate_reacked_not_redelivered() {
        let mut rx = ReceiverSession::new();
        rx.handle_datagram(&wire_segment(0, b"aa"));
        rx.drain_events().for_each(drop);

        rx.handle_datagram(&wire_segment(0, b"aa"));
        let events: Vec<_> = rx.drain_events().collect();
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], ReceiverEvent::SendAck(a) if a.sequence == 0));
        assert_eq!(rx.stats().duplicates, 1);
        assert_eq!(rx.stats().bytes_delivered, 2, "payload not re-delivered");
    }

    #[test]
    fn buffered_duplicate_reacked_not_rebuffered() {
        let mut rx = ReceiverSession::new();
        rx.handle_datagram(&wire_segment(2, b"cc"));
        rx.handle_datagram(&wire_segment(2, b"cc"));
        assert_eq!(rx.buffered(), 1);
        assert_eq!(rx.stats().duplicates, 1);
        assert_eq!(acks(&mut rx), vec![2, 2]);
    }

    // ─── Corruption / Malformed ─────────────────────────────────────────

    #[test]
    fn corrupted_segment_dropped_without_ack() {
        let mut rx = ReceiverSession::new();
        rx.handle_datagram(&corrupted_segment(0, b"aa"));
        assert!(rx.drain_events().next().is_none(), "no ACK for corruption");
        assert_eq!(rx.stats().checksum_failures, 1);
        assert_eq!(rx.expected_seq(), 0);
    }

    #[test]
    fn malformed_datagram_dropped() {
        let mut rx = ReceiverSession::new();
        rx.handle_datagram(&[1, 2, 3]);
        assert!(rx.drain_events().next().is_none());
        assert_eq!(rx.stats().malformed, 1);
    }

    // ─── End Marker ─────────────────────────────────────────────────────

    #[test]
    fn end_marker_acked_and_finishes() {
        let mut rx = ReceiverSession::new();
        rx.handle_datagram(&Segment::end_marker().encode());
        assert!(rx.is_finished());

        let events: Vec<_> = rx.drain_events().collect();
        assert!(matches!(
            events[0],
            ReceiverEvent::SendAck(a) if a.sequence == END_MARKER_SEQ
        ));
        assert!(matches!(events[1], ReceiverEvent::Finished));
    }

    #[test]
    fn corrupted_sequence_cannot_fake_end_marker() {
        // Data segment whose sequence bytes were flipped to the reserved
        // value in flight: the carried checksum no longer matches, so the
        // stream must not terminate.
        let mut rx = ReceiverSession::new();
        let mut buf = BytesMut::new();
        buf.put_u32(END_MARKER_SEQ);
        buf.put_u32(checksum(0, b"aa"));
        buf.extend_from_slice(b"aa");
        rx.handle_datagram(&buf.freeze());

        assert!(!rx.is_finished());
        assert_eq!(rx.stats().checksum_failures, 1);
        assert!(rx.drain_events().next().is_none());
    }

    // ─── Driver ─────────────────────────────────────────────────────────

    /// Channel replaying a scripted arrival sequence.
    struct ScriptedChannel {
        incoming: std::collections::VecDeque<Vec<u8>>,
        acks: Vec<Vec<u8>>,
    }

    impl Channel for ScriptedChannel {
        fn send(&mut self, datagram: &[u8]) -> Result<(), ChannelError> {
            self.acks.push(datagram.to_vec());
            Ok(())
        }

        fn recv_timeout(&mut self, _t: Duration) -> Result<Vec<u8>, ChannelError> {
            self.incoming.pop_front().ok_or(ChannelError::Closed)
        }
    }

    #[test]
    fn driver_writes_in_order_and_stops_at_end_marker() {
        let mut ch = ScriptedChannel {
            incoming: vec![
                wire_segment(1, b"bb").to_vec(), // reordered
                wire_segment(0, b"aa").to_vec(),
                Segment::end_marker().encode().to_vec(),
            ]
            .into(),
            acks: Vec::new(),
        };

        let mut sink = Vec::new();
        let stats = recv(&mut ch, &mut sink, ReceiverConfig::default()).unwrap();
        assert_eq!(stats.bytes_delivered, 4);
        assert_eq!(sink, b"aabb");
        // ACKs for 1, 0, and the end marker went out.
        assert_eq!(ch.acks.len(), 3);
    }

    #[test]
    fn driver_returns_on_channel_close() {
        let mut ch = ScriptedChannel {
            incoming: vec![wire_segment(0, b"aa").to_vec()].into(),
            acks: Vec::new(),
        };
        let mut sink = Vec::new();
        let stats = recv(&mut ch, &mut sink, ReceiverConfig::default()).unwrap();
        assert_eq!(stats.bytes_delivered, 2, "bytes so far reported on close");
        assert_eq!(sink, b"aa");
    }
}
