//! # Transfer Statistics
//!
//! Per-endpoint counters, serializable so the binaries can emit a JSON
//! summary after a transfer.

use serde::Serialize;

// ─── Sender Stats ───────────────────────────────────────────────────────────

/// Sender-side counters for one transfer.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SenderStats {
    /// Data segments sent, including retransmissions.
    pub segments_sent: u64,
    /// Segments re-sent after a go-back-N reset.
    pub retransmissions: u64,
    /// ACK-wait timeouts that fired.
    pub timeouts: u64,
    /// ACK datagrams consumed.
    pub acks_received: u64,
    /// ACKs naming a sequence already below the window base.
    pub duplicate_acks: u64,
    /// Payload bytes covered by the advanced window base.
    pub bytes_acked: u64,
    /// End-marker transmissions (first send plus retries).
    pub end_marker_sends: u64,
}

impl SenderStats {
    /// Retransmission overhead ratio.
    pub fn retransmit_ratio(&self) -> f64 {
        if self.segments_sent == 0 {
            0.0
        } else {
            self.retransmissions as f64 / self.segments_sent as f64
        }
    }
}

// ─── Receiver Stats ─────────────────────────────────────────────────────────

/// Receiver-side counters for one transfer.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReceiverStats {
    /// Datagrams read off the channel, valid or not.
    pub datagrams_received: u64,
    /// Segments flushed in order to the sink.
    pub segments_delivered: u64,
    /// Duplicate arrivals (already delivered or already buffered).
    pub duplicates: u64,
    /// Segments dropped for a checksum mismatch.
    pub checksum_failures: u64,
    /// Datagrams too short to decode.
    pub malformed: u64,
    /// ACK datagrams sent (including duplicate ACKs).
    pub acks_sent: u64,
    /// Payload bytes written to the sink.
    pub bytes_delivered: u64,
}

impl ReceiverStats {
    /// Unique in-order deliveries vs everything that arrived.
    pub fn goodput_ratio(&self) -> f64 {
        if self.datagrams_received == 0 {
            0.0
        } else {
            self.segments_delivered as f64 / self.datagrams_received as f64
        }
    }
}
