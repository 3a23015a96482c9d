//! Production environment backed by the system clock and OS entropy.

use std::time::{Duration, Instant};

use driftline_core::Environment;
use rand::RngCore;

/// [`Environment`] implementation for production use.
///
/// `now` is the monotonic system clock, `sleep` is a tokio timer, and
/// `random_bytes` draws from the OS CSPRNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemEnv;

impl Environment for SystemEnv {
    type Instant = Instant;

    fn now(&self) -> Instant {
        Instant::now()
    }

    fn unix_millis(&self) -> i64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map_or(0, |d| d.as_millis() as i64)
    }

    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        rand::rngs::OsRng.fill_bytes(buffer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_is_monotonic() {
        let env = SystemEnv;
        let a = env.now();
        let b = env.now();
        assert!(b >= a);
    }

    #[test]
    fn random_u64_varies() {
        let env = SystemEnv;
        assert_ne!(env.random_u64(), env.random_u64());
    }
}
