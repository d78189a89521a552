//! Exponential backoff before each remote application attempt.

use std::time::Duration;

/// Default delay before the first attempt.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(1000);

/// Computes `base * 2^retry_count`.
///
/// There is no jitter and no cap. The delay is applied before every attempt,
/// including the first, so a pass over N records takes at least `N * base`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    base: Duration,
}

impl Backoff {
    /// Create a scheduler with the given base delay.
    pub fn new(base: Duration) -> Self {
        Self { base }
    }

    /// The base delay.
    pub fn base(&self) -> Duration {
        self.base
    }

    /// Delay before an attempt for a record that already failed `retry_count` times.
    pub fn delay(&self, retry_count: u32) -> Duration {
        let factor = 1u32.checked_shl(retry_count).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor)
    }

    /// Sleep for the delay that belongs to `retry_count`.
    pub async fn wait(&self, retry_count: u32) {
        let delay = self.delay(retry_count);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_DELAY)
    }
}
