//! Device discovery module.
//!
//! Provides sweep target parsing, UDP broadcast probing and the bounded
//! unicast fan-out used for CIDR sweeps.

pub mod service;
pub mod target;

pub use service::{broadcast_probe, fan_out, observation_from_reply, ObservationStream};
pub use target::SweepTarget;
