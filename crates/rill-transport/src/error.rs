//! # Error Taxonomy
//!
//! Every failure inside the transfer loops is either absorbed (malformed,
//! corrupt, duplicate, out-of-order arrivals) or resolved by retransmission;
//! only a closed channel terminates an endpoint, and it does so orderly.

use thiserror::Error;

/// Wire-format decode failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WireError {
    /// Datagram too short to contain the fixed header. Fatal only to that
    /// read; the datagram is dropped.
    #[error("malformed segment: {0} bytes is shorter than the header")]
    MalformedSegment(usize),
}

/// Channel-level failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChannelError {
    /// No datagram arrived within the receive timeout. Drives
    /// retransmission on the sender; a benign continue on the receiver.
    #[error("channel receive timed out")]
    Timeout,
    /// The peer or the underlying socket went away. Terminal — both ends
    /// shut down orderly and report bytes transferred so far.
    #[error("channel closed")]
    Closed,
}
