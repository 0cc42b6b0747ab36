//! Ephemeral port allocation
//!
//! Finds locally-unused TCP ports for a release backend session via
//! probe-bind-release: draw a random port in the registered/dynamic band,
//! try to bind it, release the listener and hand the port out on success.
//! This is a probe, not a reservation: a window exists between the probe
//! and the backend's own bind, which is acceptable only because allocation
//! happens immediately before the process launch.

use crate::error::HelmError;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::net::TcpListener;

/// Lowest port in the draw range (start of the dynamic band)
const BASE: u16 = 32768;
/// Highest port in the draw range
const END: u16 = 61000;
/// Probe attempts before the allocator reports exhaustion instead of
/// spinning forever on a saturated host.
const MAX_ATTEMPTS: u32 = 10_000;

/// Draws random ports and probes them for availability.
///
/// Each allocator owns its own seeded RNG; nothing is shared process-wide,
/// so concurrent reconciliations never contend on a global random source.
#[derive(Debug)]
pub struct PortAllocator {
    rng: StdRng,
}

impl PortAllocator {
    /// Creates an allocator seeded from the OS entropy source.
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Creates an allocator with a caller-supplied RNG, for deterministic tests.
    pub fn with_rng(rng: StdRng) -> Self {
        Self { rng }
    }

    /// Returns a port that no other local listener held at the instant of
    /// return. Redraws on bind failure.
    pub fn allocate(&mut self) -> Result<u16, HelmError> {
        for _ in 0..MAX_ATTEMPTS {
            let port = self.rng.gen_range(BASE..=END);
            match TcpListener::bind(("0.0.0.0", port)) {
                Ok(listener) => {
                    drop(listener);
                    return Ok(port);
                }
                Err(_) => continue,
            }
        }
        Err(HelmError::PortExhausted {
            attempts: MAX_ATTEMPTS,
        })
    }
}

impl Default for PortAllocator {
    fn default() -> Self {
        Self::new()
    }
}
