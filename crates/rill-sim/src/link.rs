//! In-memory datagram link with configurable impairment.
//!
//! Responsibilities:
//! - Provide a [`SimChannel`] pair connected by two unbounded queues,
//!   one per direction, carrying whole datagrams.
//! - Apply the endpoint's [`ImpairmentConfig`] on the send path: drop,
//!   duplicate, corrupt, or hold a datagram back one slot.
//! - Map queue disconnection to [`ChannelError::Closed`] so drivers
//!   terminate the same way they would on a closed socket.

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;
use tracing::trace;

use rill_transport::channel::Channel;
use rill_transport::error::ChannelError;

use crate::impairment::{Fault, Impairment, ImpairmentConfig};

/// One endpoint of an in-memory impaired link.
pub struct SimChannel {
    tx: Sender<Vec<u8>>,
    rx: Receiver<Vec<u8>>,
    impairment: Impairment,
    /// Datagram held back for reordering, released after the next send.
    held: Option<Vec<u8>>,
}

impl SimChannel {
    /// Build a connected pair. Datagrams sent on one endpoint arrive at the
    /// other, subject to that endpoint's impairment. The second endpoint
    /// seeds its RNG with `config.seed + 1` so the directions fault
    /// independently.
    pub fn pair(config: ImpairmentConfig) -> (SimChannel, SimChannel) {
        let (a_tx, b_rx) = unbounded();
        let (b_tx, a_rx) = unbounded();
        let mut reverse = config;
        reverse.seed = config.seed.wrapping_add(1);
        let a = SimChannel {
            tx: a_tx,
            rx: a_rx,
            impairment: Impairment::new(config),
            held: None,
        };
        let b = SimChannel {
            tx: b_tx,
            rx: b_rx,
            impairment: Impairment::new(reverse),
            held: None,
        };
        (a, b)
    }

    /// Total faults injected on this endpoint's send path so far.
    pub fn faults_injected(&self) -> u64 {
        self.impairment.faults_injected
    }

    fn enqueue(&mut self, datagram: Vec<u8>) -> Result<(), ChannelError> {
        self.tx.send(datagram).map_err(|_| ChannelError::Closed)
    }
}

impl Channel for SimChannel {
    fn send(&mut self, datagram: &[u8]) -> Result<(), ChannelError> {
        let fault = self.impairment.decide(self.held.is_none());
        trace!(len = datagram.len(), ?fault, "sim send");
        match fault {
            Fault::Drop => {}
            Fault::HoldBack => {
                self.held = Some(datagram.to_vec());
            }
            Fault::Corrupt => {
                let mut corrupted = datagram.to_vec();
                self.impairment.flip_random_bit(&mut corrupted);
                self.enqueue(corrupted)?;
            }
            Fault::Duplicate => {
                self.enqueue(datagram.to_vec())?;
                self.enqueue(datagram.to_vec())?;
            }
            Fault::Deliver => {
                self.enqueue(datagram.to_vec())?;
            }
        }
        // A held datagram rides out behind whatever was just sent.
        if fault != Fault::HoldBack {
            if let Some(delayed) = self.held.take() {
                self.enqueue(delayed)?;
            }
        }
        Ok(())
    }

    fn recv_timeout(&mut self, timeout: Duration) -> Result<Vec<u8>, ChannelError> {
        match self.rx.recv_timeout(timeout) {
            Ok(datagram) => Ok(datagram),
            Err(RecvTimeoutError::Timeout) => Err(ChannelError::Timeout),
            Err(RecvTimeoutError::Disconnected) => Err(ChannelError::Closed),
        }
    }
}

// ─────────────────────────────── Tests ───────────────────────────────
