//! # rill-transport
//!
//! Reliable, in-order byte-stream delivery over an unreliable, lossy,
//! MTU-bounded datagram channel.
//!
//! A miniature ARQ transport: segmentation, 32-bit sequence numbers, an
//! additive checksum, cumulative per-segment acknowledgments, a small
//! sliding send window with go-back-N retransmission, an adaptive RTO from
//! smoothed RTT statistics, and out-of-order reassembly on the receiving
//! side. Both endpoints are single sequential control loops; the only
//! blocking operation is the bounded channel read.
//!
//! ## Crate structure
//!
//! - [`wire`] — segment/ACK framing, checksum, end-of-stream marker
//! - [`channel`] — datagram channel trait + UDP implementation
//! - [`rtt`] — smoothed RTT estimate and retransmission timeout
//! - [`sender`] — sender state machine and blocking `send` driver
//! - [`receiver`] — receiver state machine and blocking `recv` driver
//! - [`stats`] — per-endpoint transfer counters
//! - [`error`] — wire and channel error taxonomy

pub mod channel;
pub mod error;
pub mod receiver;
pub mod rtt;
pub mod sender;
pub mod stats;
pub mod wire;
