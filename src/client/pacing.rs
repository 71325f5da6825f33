// src/client/pacing.rs

use std::time::Duration;

use rand::Rng;

/// Default upper bound for [`PacingPolicy::RandomDelay`].
pub const DEFAULT_RANDOM_CEILING: Duration = Duration::from_secs(2);

/// Default bound on how long to wait for the master's acknowledgement.
pub const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_secs(30);

/// What the orchestration loop waits for between two execute requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacingPolicy {
    /// Wait until the master acknowledges the request it was just sent,
    /// failing the run if that takes longer than `timeout`.
    MasterAck { timeout: Duration },
    /// Sleep a random interval in `[0, ceiling)`.
    ///
    /// Gives a freshly started master time to settle, with no guarantee that
    /// it actually has. Only kept for masters that never send `Ack`.
    RandomDelay { ceiling: Duration },
}

impl Default for PacingPolicy {
    fn default() -> Self {
        PacingPolicy::MasterAck {
            timeout: DEFAULT_ACK_TIMEOUT,
        }
    }
}

impl PacingPolicy {
    /// Draw the delay for one [`PacingPolicy::RandomDelay`] wait.
    pub fn random_delay(ceiling: Duration) -> Duration {
        let ceiling_ms = ceiling.as_millis() as u64;
        if ceiling_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::rng().random_range(0..ceiling_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_delay_stays_below_ceiling() {
        let ceiling = Duration::from_millis(50);
        for _ in 0..200 {
            assert!(PacingPolicy::random_delay(ceiling) < ceiling);
        }
    }

    #[test]
    fn zero_ceiling_means_no_delay() {
        assert_eq!(PacingPolicy::random_delay(Duration::ZERO), Duration::ZERO);
    }
}
