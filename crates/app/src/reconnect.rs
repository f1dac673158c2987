//! Reconnect policy — what a session does after its link drops.

use std::time::Duration;

/// Decides whether, and after how long, a lost session tries again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectPolicy {
    /// Give up on the first link loss.
    Terminate,
    /// Retry with exponential backoff, at most `max_attempts` times in a row.
    ///
    /// The delay starts at `initial_backoff`, doubles on every failed
    /// attempt and never exceeds `max_backoff`. A successful reconnect resets
    /// the count.
    Bounded {
        max_attempts: u32,
        initial_backoff: Duration,
        max_backoff: Duration,
    },
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::Bounded {
            max_attempts: 5,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
        }
    }
}

impl ReconnectPolicy {
    /// Delay before reconnect attempt number `attempt` (1-based), or `None`
    /// when the policy gives up.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        match *self {
            Self::Terminate => None,
            Self::Bounded {
                max_attempts,
                initial_backoff,
                max_backoff,
            } => {
                if attempt == 0 || attempt > max_attempts {
                    return None;
                }
                let factor = 1_u32.checked_shl(attempt - 1).unwrap_or(u32::MAX);
                Some(initial_backoff.saturating_mul(factor).min(max_backoff))
            }
        }
    }

    /// Whether the policy ever retries.
    #[must_use]
    pub fn retries(&self) -> bool {
        self.delay_for(1).is_some()
    }
}
