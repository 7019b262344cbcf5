//! Random fault injection.
//!
//! Strictly opt-in: the simulator only carries an injector when the
//! configuration enables one. When a fault fires, the reply status is a
//! uniformly random nonzero error status regardless of request validity,
//! which exercises client error paths.

use netdio_protocol::Status;
use parking_lot::Mutex;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

/// Shared random fault source. Safe to call from concurrent connections.
#[derive(Debug)]
pub struct FaultInjector {
    probability: f64,
    rng: Mutex<SmallRng>,
}

impl FaultInjector {
    /// Creates an injector firing with the given probability. A seed makes
    /// runs reproducible.
    pub fn new(probability: f64, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_os_rng(),
        };
        Self {
            probability,
            rng: Mutex::new(rng),
        }
    }

    /// Whether the next reply should be replaced by an injected fault.
    pub fn fire(&self) -> bool {
        self.rng.lock().random_bool(self.probability)
    }

    /// A uniformly random nonzero error status.
    pub fn random_status(&self) -> Status {
        let raw = self.rng.lock().random_range(1u8..=6);
        Status::try_from(raw).unwrap_or(Status::Other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_injector_is_deterministic() {
        let a = FaultInjector::new(0.5, Some(7));
        let b = FaultInjector::new(0.5, Some(7));
        let fires_a: Vec<bool> = (0..64).map(|_| a.fire()).collect();
        let fires_b: Vec<bool> = (0..64).map(|_| b.fire()).collect();
        assert_eq!(fires_a, fires_b);
    }

    #[test]
    fn test_statuses_are_nonzero_errors() {
        let injector = FaultInjector::new(1.0, Some(1));
        for _ in 0..128 {
            let status = injector.random_status();
            assert!(!status.is_success());
        }
    }

    #[test]
    fn test_extreme_probabilities() {
        let never = FaultInjector::new(0.0, Some(1));
        assert!((0..32).all(|_| !never.fire()));

        let always = FaultInjector::new(1.0, Some(1));
        assert!((0..32).all(|_| always.fire()));
    }
}
