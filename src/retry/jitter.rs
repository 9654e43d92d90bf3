//! Randomness for jittered delays.

use std::fmt;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Lower bound of the jitter window, as a fraction of the delay.
pub const JITTER_LOW: f64 = 0.75;
/// Upper bound of the jitter window, as a fraction of the delay.
pub const JITTER_HIGH: f64 = 1.25;

/// Source of uniform randomness used to spread retry delays.
///
/// Inject a seeded source to make jittered delays reproducible in tests.
pub trait RandomSource: Send + Sync {
    /// Return a value uniformly distributed in `[0, 1)`.
    fn next_unit(&self) -> f64;
}

/// [`RandomSource`] backed by [`StdRng`].
pub struct StdRandom {
    rng: Mutex<StdRng>,
}

impl StdRandom {
    /// Seed from operating system entropy.
    pub fn from_entropy() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_os_rng()),
        }
    }

    /// Deterministic source for reproducible sequences.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl Default for StdRandom {
    fn default() -> Self {
        Self::from_entropy()
    }
}

impl fmt::Debug for StdRandom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StdRandom").finish_non_exhaustive()
    }
}

impl RandomSource for StdRandom {
    fn next_unit(&self) -> f64 {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        rng.random::<f64>()
    }
}

/// Replace `delay` with a value drawn uniformly from `[0.75 * delay, 1.25 * delay]`.
pub fn apply(delay: Duration, rng: &dyn RandomSource) -> Duration {
    let nanos = delay.as_nanos() as f64;
    let low = nanos * JITTER_LOW;
    let high = nanos * JITTER_HIGH;

    let unit = rng.next_unit().clamp(0.0, 1.0);
    let jittered = (low + (high - low) * unit)
        .round()
        .max(low.ceil())
        .min(high.floor());

    if jittered < u64::MAX as f64 {
        Duration::from_nanos(jittered as u64)
    } else {
        Duration::try_from_secs_f64(jittered / 1e9).unwrap_or(Duration::MAX)
    }
}
