//! Virtual-time environment for deterministic tests.

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use driftline_core::Environment;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Wall-clock base for [`Environment::unix_millis`], so simulated records
/// carry plausible timestamps.
const UNIX_BASE_MS: i64 = 1_700_000_000_000;

/// Virtual instant: elapsed simulation time since harness start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct SimInstant(Duration);

impl std::ops::Add<Duration> for SimInstant {
    type Output = Self;

    fn add(self, rhs: Duration) -> Self {
        Self(self.0 + rhs)
    }
}

impl std::ops::Sub for SimInstant {
    type Output = Duration;

    fn sub(self, rhs: Self) -> Duration {
        self.0.saturating_sub(rhs.0)
    }
}

#[derive(Debug)]
struct Shared {
    clock: Duration,
    rng: ChaCha8Rng,
}

/// [`Environment`] with a virtual clock and a seeded RNG.
///
/// Time only moves through [`SimEnv::advance`] or through `sleep`, which
/// advances the clock by the requested duration and resolves immediately.
/// Same seed, same event order - same run.
#[derive(Debug, Clone)]
pub struct SimEnv {
    shared: Arc<Mutex<Shared>>,
}

impl SimEnv {
    /// Create an environment with a deterministic seed.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            shared: Arc::new(Mutex::new(Shared {
                clock: Duration::ZERO,
                rng: ChaCha8Rng::seed_from_u64(seed),
            })),
        }
    }

    /// Move the virtual clock forward.
    pub fn advance(&self, duration: Duration) {
        self.lock().clock += duration;
    }

    /// Elapsed simulation time since start.
    pub fn elapsed(&self) -> Duration {
        self.lock().clock
    }

    #[allow(clippy::unwrap_used, reason = "clock lock is never poisoned")]
    fn lock(&self) -> std::sync::MutexGuard<'_, Shared> {
        self.shared.lock().unwrap()
    }
}

impl Default for SimEnv {
    fn default() -> Self {
        Self::with_seed(42)
    }
}

impl Environment for SimEnv {
    type Instant = SimInstant;

    fn now(&self) -> SimInstant {
        SimInstant(self.lock().clock)
    }

    fn unix_millis(&self) -> i64 {
        UNIX_BASE_MS + self.lock().clock.as_millis() as i64
    }

    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        self.advance(duration);
        std::future::ready(())
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        self.lock().rng.fill_bytes(buffer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_only_moves_when_advanced() {
        let env = SimEnv::with_seed(1);
        let t0 = env.now();
        assert_eq!(env.now(), t0);

        env.advance(Duration::from_millis(250));
        assert_eq!(env.now() - t0, Duration::from_millis(250));
        assert_eq!(env.unix_millis(), UNIX_BASE_MS + 250);
    }

    #[test]
    fn same_seed_same_randomness() {
        let a = SimEnv::with_seed(7);
        let b = SimEnv::with_seed(7);
        assert_eq!(a.random_u64(), b.random_u64());
        assert_eq!(a.random_u64(), b.random_u64());
    }

    #[tokio::test]
    async fn sleep_advances_virtual_time_immediately() {
        let env = SimEnv::with_seed(1);
        env.sleep(Duration::from_secs(30)).await;
        assert_eq!(env.elapsed(), Duration::from_secs(30));
    }
}
