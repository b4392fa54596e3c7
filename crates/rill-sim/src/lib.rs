//! Impaired-channel simulation toolkit for integration testing.
//!
//! Provides an in-memory datagram channel pair with seeded loss,
//! duplication, corruption, and reordering, for exercising transfers
//! under controlled fault conditions without touching the network.

pub mod impairment;
pub mod link;
