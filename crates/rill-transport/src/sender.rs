//! # Sender State Machine
//!
//! Segments the input payload once, then drives a send / await-ACK /
//! retransmit loop against the channel until everything is acknowledged.
//!
//! ```text
//!   SEGMENTING ──▶ TRANSMITTING ──(base == count)──▶ DRAINING ──▶ DONE
//!                    │      ▲
//!                  timeout  │
//!                    └──────┘  (go-back-N: next_seq = base)
//! ```
//!
//! ## Responsibilities
//!
//! 1. **Segmentation**: split the payload into `MAX_SEGMENT_PAYLOAD` chunks
//!    with increasing sequence numbers; segments are immutable afterwards
//!    and re-sent verbatim.
//! 2. **Sliding window**: keep at most `window_size` segments outstanding,
//!    cumulative-contiguous base advance, no advancing past a gap.
//! 3. **Adaptive retransmission**: RTO from the RTT estimator; on expiry
//!    reset `next_seq` to `base` and discard acknowledgment state above it.
//! 4. **End-of-stream**: once all data is acknowledged, retransmit the end
//!    marker on the RTO timer until it is acknowledged or a small retry
//!    budget runs out.
//!
//! [`SenderSession`] is pure bookkeeping — no I/O — so the window logic is
//! unit-testable; [`send`] is the blocking driver loop that owns the session
//! exclusively, per the single-sequential-loop concurrency model.

use bytes::Bytes;
use std::collections::{BTreeSet, HashMap};
use std::time::Instant;

use crate::channel::Channel;
use crate::error::ChannelError;
use crate::rtt::RttEstimator;
use crate::stats::SenderStats;
use crate::wire::{Ack, Segment, END_MARKER_SEQ, MAX_SEGMENT_PAYLOAD};

// ─── Configuration ──────────────────────────────────────────────────────────

/// Sender tuning knobs.
#[derive(Debug, Clone)]
pub struct SenderConfig {
    /// Maximum unacknowledged segments in flight.
    pub window_size: u32,
    /// Payload bytes per segment.
    pub segment_payload: usize,
    /// End-marker transmissions before giving up on its ACK.
    pub end_marker_budget: u32,
    /// A-priori RTT estimate seeding the estimator.
    pub initial_rtt: std::time::Duration,
    /// A-priori RTT deviation.
    pub initial_dev: std::time::Duration,
}

impl Default for SenderConfig {
    fn default() -> Self {
        SenderConfig {
            window_size: 2,
            segment_payload: MAX_SEGMENT_PAYLOAD,
            end_marker_budget: 8,
            initial_rtt: std::time::Duration::from_millis(100),
            initial_dev: std::time::Duration::from_millis(10),
        }
    }
}

// ─── State ──────────────────────────────────────────────────────────────────

/// Sender lifecycle state. Segmentation happens in [`SenderSession::new`],
/// so a constructed session is already past SEGMENTING.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SenderState {
    /// Data segments outstanding.
    Transmitting,
    /// All data acknowledged; end marker not yet confirmed.
    Draining,
    /// Transfer complete.
    Done,
}

/// Per-segment transmission bookkeeping.
#[derive(Debug, Clone, Copy)]
struct SendRecord {
    sent_at: Instant,
    /// Set once the segment is sent a second time; ACKs for it are then
    /// ambiguous and yield no RTT sample (Karn's rule).
    retransmitted: bool,
}

// ─── Session ────────────────────────────────────────────────────────────────

/// All mutable sender state, owned exclusively by the driver loop.
pub struct SenderSession {
    config: SenderConfig,
    /// Immutable segment list created at segmentation time.
    segments: Vec<Segment>,
    /// Oldest unacknowledged sequence number.
    base: u32,
    /// Next sequence number eligible to be sent.
    next_seq: u32,
    /// Acknowledged sequences at or above `base` (cleared on timeout).
    acked: BTreeSet<u32>,
    /// Send timestamps for outstanding segments.
    sent: HashMap<u32, SendRecord>,
    rtt: RttEstimator,
    state: SenderState,
    end_marker_sends: u32,
    bytes_acked: u64,
    stats: SenderStats,
}

impl SenderSession {
    /// Segment `data` and enter TRANSMITTING (or DRAINING for empty input —
    /// the end marker is still owed).
    pub fn new(data: Bytes, config: SenderConfig) -> Self {
        let chunk = config.segment_payload.min(MAX_SEGMENT_PAYLOAD).max(1);
        let mut segments = Vec::with_capacity(data.len().div_ceil(chunk));
        let mut offset = 0;
        while offset < data.len() {
            let end = (offset + chunk).min(data.len());
            segments.push(Segment::data(segments.len() as u32, data.slice(offset..end)));
            offset = end;
        }

        let state = if segments.is_empty() {
            SenderState::Draining
        } else {
            SenderState::Transmitting
        };
        let rtt = RttEstimator::new(config.initial_rtt, config.initial_dev);

        SenderSession {
            config,
            segments,
            base: 0,
            next_seq: 0,
            acked: BTreeSet::new(),
            sent: HashMap::new(),
            rtt,
            state,
            end_marker_sends: 0,
            bytes_acked: 0,
            stats: SenderStats::default(),
        }
    }

    /// Produce the wire bytes for every segment the window permits sending
    /// now, advancing `next_seq`. Segments already acknowledged (recorded
    /// out-of-order ACKs) are skipped rather than re-sent.
    pub fn fill_window(&mut self, now: Instant) -> Vec<Bytes> {
        let mut out = Vec::new();
        let count = self.segment_count();
        while self.next_seq < self.base.saturating_add(self.config.window_size)
            && self.next_seq < count
        {
            let seq = self.next_seq;
            self.next_seq += 1;
            if self.acked.contains(&seq) {
                continue;
            }
            match self.sent.get_mut(&seq) {
                Some(record) => {
                    record.sent_at = now;
                    record.retransmitted = true;
                    self.stats.retransmissions += 1;
                }
                None => {
                    self.sent.insert(
                        seq,
                        SendRecord {
                            sent_at: now,
                            retransmitted: false,
                        },
                    );
                }
            }
            self.stats.segments_sent += 1;
            out.push(self.segments[seq as usize].encode());
        }
        out
    }

    /// Consume one acknowledgment.
    pub fn handle_ack(&mut self, ack: Ack, now: Instant) {
        self.stats.acks_received += 1;
        let seq = ack.sequence;

        if seq == END_MARKER_SEQ {
            if self.state == SenderState::Draining {
                tracing::debug!("end marker acknowledged");
                self.state = SenderState::Done;
            }
            return;
        }

        if self.state != SenderState::Transmitting || seq >= self.segment_count() {
            // Straggler data ACK while draining, or nonsense.
            self.stats.duplicate_acks += 1;
            return;
        }
        if seq < self.base || self.acked.contains(&seq) {
            // The receiver re-ACKs duplicates so we can recover window
            // state; an already-recorded sequence needs nothing more.
            self.stats.duplicate_acks += 1;
            return;
        }

        // ACKs carry no checksum, so an in-range sequence we never sent can
        // still arrive off a corrupted wire. Recording it would make
        // `fill_window` skip the segment forever; a send record is the proof
        // of transmission.
        let Some(record) = self.sent.get(&seq) else {
            self.stats.duplicate_acks += 1;
            return;
        };
        // Send records outlive out-of-order ACKs so a post-timeout resend of
        // this sequence still counts as a retransmission.
        if !record.retransmitted {
            self.rtt.sample(now.saturating_duration_since(record.sent_at));
        }

        self.acked.insert(seq);

        // Cumulative advance: base moves only across a contiguous run of
        // acknowledged sequences, never past a gap.
        while self.acked.remove(&self.base) {
            self.sent.remove(&self.base);
            self.bytes_acked += self.segments[self.base as usize].payload.len() as u64;
            self.base += 1;
        }
        // After a timeout rewind, a stale in-flight ACK can push base past
        // next_seq; keep next_seq >= base so the window math holds and the
        // acknowledged segment is not re-sent.
        self.next_seq = self.next_seq.max(self.base);
        self.stats.bytes_acked = self.bytes_acked;

        if self.base == self.segment_count() {
            tracing::debug!(segments = self.segments.len(), "window drained");
            self.state = SenderState::Draining;
        }
    }

    /// React to an expired ACK wait: go-back-N. The whole outstanding window
    /// will be re-sent, so acknowledgment state above `base` is discarded.
    pub fn on_timeout(&mut self) {
        if self.state != SenderState::Transmitting {
            return;
        }
        self.stats.timeouts += 1;
        self.next_seq = self.base;
        self.acked.clear();
    }

    /// Next end-marker transmission, or `None` once the retry budget is
    /// spent (the payload itself is fully acknowledged, so completing
    /// without the final ACK only risks the receiver lingering until its
    /// own channel-close path fires).
    pub fn next_end_marker(&mut self) -> Option<Bytes> {
        debug_assert_eq!(self.state, SenderState::Draining);
        if self.end_marker_sends >= self.config.end_marker_budget {
            tracing::warn!(
                attempts = self.end_marker_sends,
                "end marker never acknowledged; completing anyway"
            );
            self.state = SenderState::Done;
            return None;
        }
        self.end_marker_sends += 1;
        self.stats.end_marker_sends = self.end_marker_sends as u64;
        Some(Segment::end_marker().encode())
    }

    /// Current ACK-wait timeout.
    pub fn rto(&self) -> std::time::Duration {
        self.rtt.rto()
    }

    pub fn state(&self) -> SenderState {
        self.state
    }

    /// Segments currently outstanding (sent, not yet covered by `base`).
    pub fn in_flight(&self) -> u32 {
        self.next_seq - self.base
    }

    pub fn segment_count(&self) -> u32 {
        self.segments.len() as u32
    }

    /// Payload bytes confirmed delivered (contiguous below `base`).
    pub fn bytes_acked(&self) -> u64 {
        self.bytes_acked
    }

    pub fn stats(&self) -> &SenderStats {
        &self.stats
    }

    pub fn rtt(&self) -> &RttEstimator {
        &self.rtt
    }
}

// ─── Driver ─────────────────────────────────────────────────────────────────

/// Send `data` over `channel`, blocking until the transfer completes or the
/// channel closes. Returns the transfer counters; `bytes_acked` equals
/// `data.len()` on a completed transfer.
pub fn send<C: Channel>(channel: &mut C, data: Bytes, config: SenderConfig) -> SenderStats {
    let mut session = SenderSession::new(data, config);
    tracing::debug!(
        segments = session.segment_count(),
        "sender starting transfer"
    );

    'transfer: while session.state() == SenderState::Transmitting {
        for wire in session.fill_window(Instant::now()) {
            tracing::trace!(len = wire.len(), "sending segment");
            if channel.send(&wire).is_err() {
                tracing::warn!("channel closed mid-transfer");
                break 'transfer;
            }
        }

        match channel.recv_timeout(session.rto()) {
            Ok(datagram) => match Ack::decode(&datagram) {
                Ok(ack) => {
                    tracing::trace!(seq = ack.sequence, "ack received");
                    session.handle_ack(ack, Instant::now());
                }
                Err(_) => tracing::trace!("dropping undecodable ack datagram"),
            },
            Err(ChannelError::Timeout) => {
                tracing::warn!(
                    in_flight = session.in_flight(),
                    "ack wait timed out, retransmitting window"
                );
                session.on_timeout();
            }
            Err(ChannelError::Closed) => break 'transfer,
        }
    }

    'drain: while session.state() == SenderState::Draining {
        let Some(wire) = session.next_end_marker() else {
            break;
        };
        if channel.send(&wire).is_err() {
            break;
        }
        // Wait out one RTO for the final ACK, ignoring straggler data ACKs.
        loop {
            match channel.recv_timeout(session.rto()) {
                Ok(datagram) => {
                    if let Ok(ack) = Ack::decode(&datagram) {
                        session.handle_ack(ack, Instant::now());
                        if session.state() == SenderState::Done {
                            break 'drain;
                        }
                    }
                }
                Err(ChannelError::Timeout) => break,
                Err(ChannelError::Closed) => break 'drain,
            }
        }
    }

    tracing::debug!(
        bytes = session.bytes_acked(),
        retransmissions = session.stats().retransmissions,
        timeouts = session.stats().timeouts,
        "sender finished"
    );
    session.stats().clone()
}
