//! Seeded datagram impairment: loss, duplication, single-bit corruption,
//! and one-slot reordering, each with an independent probability.
//!
//! Given a seed, the fault sequence is reproducible, so end-to-end tests
//! over an impaired channel are deterministic.

use rand::rngs::StdRng;
use rand::RngExt as _;
use rand::SeedableRng;

/// Per-direction impairment probabilities (each 0.0–1.0).
#[derive(Debug, Clone, Copy)]
pub struct ImpairmentConfig {
    pub seed: u64,
    /// Probability a datagram is silently dropped.
    pub loss: f64,
    /// Probability a delivered datagram is delivered twice.
    pub duplicate: f64,
    /// Probability a delivered datagram has one random bit flipped.
    pub corrupt: f64,
    /// Probability a datagram is held back one slot (swapped with the next).
    pub reorder: f64,
}

impl ImpairmentConfig {
    /// A channel with no faults.
    pub fn perfect(seed: u64) -> Self {
        ImpairmentConfig {
            seed,
            loss: 0.0,
            duplicate: 0.0,
            corrupt: 0.0,
            reorder: 0.0,
        }
    }
}

/// What the channel decided to do with one datagram.
#[derive(Debug, PartialEq, Eq)]
pub enum Fault {
    Deliver,
    Drop,
    Duplicate,
    Corrupt,
    HoldBack,
}

/// Applies [`ImpairmentConfig`] decisions with a seeded RNG.
pub struct Impairment {
    config: ImpairmentConfig,
    rng: StdRng,
    pub faults_injected: u64,
}

impl Impairment {
    pub fn new(config: ImpairmentConfig) -> Self {
        Impairment {
            rng: StdRng::seed_from_u64(config.seed),
            config,
            faults_injected: 0,
        }
    }

    /// Decide the fate of one datagram. `can_hold` is false while another
    /// datagram already occupies the reorder slot.
    pub fn decide(&mut self, can_hold: bool) -> Fault {
        if self.rng.random::<f64>() < self.config.loss {
            self.faults_injected += 1;
            return Fault::Drop;
        }
        if can_hold && self.rng.random::<f64>() < self.config.reorder {
            self.faults_injected += 1;
            return Fault::HoldBack;
        }
        if self.rng.random::<f64>() < self.config.corrupt {
            self.faults_injected += 1;
            return Fault::Corrupt;
        }
        if self.rng.random::<f64>() < self.config.duplicate {
            self.faults_injected += 1;
            return Fault::Duplicate;
        }
        Fault::Deliver
    }

    /// Flip one random bit in place.
    pub fn flip_random_bit(&mut self, datagram: &mut [u8]) {
        if datagram.is_empty() {
            return;
        }
        let byte = self.rng.random_range(0..datagram.len());
        let bit = self.rng.random_range(0..8u32);
        datagram[byte] ^= 1 << bit;
    }
}
