//! Environment abstraction for time and randomness.
//!
//! State machines take `Instant`s as arguments; the drivers that own them ask
//! the environment for the current time, for sleeps between retries and for
//! seed bytes. Production uses [`SystemEnv`]; the simulation harness supplies
//! a seeded, virtual-time implementation.

use std::{
    future::Future,
    time::{Duration, Instant},
};

use hoststream_proto::signon::{SEED_LEN, Seed};
use rand::RngCore;

/// Source of time and randomness.
pub trait Environment: Clone + Send + Sync + 'static {
    /// Current time.
    fn now(&self) -> Instant;

    /// Wait for `duration`.
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send;

    /// Fill `buffer` with random bytes.
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Fresh 8-byte client seed for the password substitute.
    fn random_seed(&self) -> Seed {
        let mut seed = [0u8; SEED_LEN];
        self.random_bytes(&mut seed);
        seed
    }
}

/// Wall clock, Tokio timers and the thread-local CSPRNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemEnv;

impl Environment for SystemEnv {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        rand::thread_rng().fill_bytes(buffer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeds_differ() {
        let env = SystemEnv;
        assert_ne!(env.random_seed(), env.random_seed());
    }

    #[tokio::test(start_paused = true)]
    async fn sleep_uses_tokio_timer() {
        let start = tokio::time::Instant::now();
        SystemEnv.sleep(Duration::from_secs(5)).await;
        assert!(start.elapsed() >= Duration::from_secs(5));
    }
}
