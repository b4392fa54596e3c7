//! # RTT Estimation
//!
//! Smoothed round-trip time and deviation, RFC 6298 style, used to size the
//! sender's retransmission timeout. Samples may only come from segments that
//! were never retransmitted (Karn's rule) — an ACK for a retransmitted
//! segment is ambiguous about which copy it answers.

use std::time::Duration;

/// Smoothing factor for the RTT estimate (α = 1/8).
const ALPHA: f64 = 0.125;

/// Smoothing factor for the deviation (β = 1/4).
const BETA: f64 = 0.25;

/// Smoothed RTT state.
#[derive(Debug, Clone)]
pub struct RttEstimator {
    /// Smoothed round-trip time, seconds.
    srtt: f64,
    /// Smoothed deviation, seconds.
    rttvar: f64,
    /// Samples applied so far.
    samples: u64,
    /// RTO clamp bounds.
    min_rto: Duration,
    max_rto: Duration,
}

impl RttEstimator {
    /// Create an estimator seeded with an a-priori estimate.
    ///
    /// The seed stands in for the first sample, so every real sample is
    /// smoothed in rather than replacing the state wholesale.
    pub fn new(initial_rtt: Duration, initial_dev: Duration) -> Self {
        RttEstimator {
            srtt: initial_rtt.as_secs_f64(),
            rttvar: initial_dev.as_secs_f64(),
            samples: 0,
            min_rto: Duration::from_millis(10),
            max_rto: Duration::from_secs(60),
        }
    }

    /// Fold in one unambiguous round-trip sample.
    ///
    /// RFC 6298 order: the deviation update uses the pre-update smoothed
    /// estimate.
    pub fn sample(&mut self, rtt: Duration) {
        let rtt = rtt.as_secs_f64();
        self.rttvar = (1.0 - BETA) * self.rttvar + BETA * (self.srtt - rtt).abs();
        self.srtt = (1.0 - ALPHA) * self.srtt + ALPHA * rtt;
        self.samples += 1;
    }

    /// Retransmission timeout: `srtt + 4·rttvar`, clamped.
    pub fn rto(&self) -> Duration {
        let rto = self.srtt + 4.0 * self.rttvar;
        Duration::from_secs_f64(rto).clamp(self.min_rto, self.max_rto)
    }

    /// Smoothed RTT, seconds.
    pub fn srtt(&self) -> f64 {
        self.srtt
    }

    /// Smoothed deviation, seconds.
    pub fn rttvar(&self) -> f64 {
        self.rttvar
    }

    /// Number of samples applied.
    pub fn sample_count(&self) -> u64 {
        self.samples
    }
}

impl Default for RttEstimator {
    /// Seeded at 100 ms / 10 ms, the a-priori guess for the simulated
    /// network this transport was written against.
    fn default() -> Self {
        Self::new(Duration::from_millis(100), Duration::from_millis(10))
    }
}
