//! Reconnect rate limiting

use std::time::{Duration, Instant};

/// Minimum time between two physical connects
pub const DEFAULT_RECONNECT_INTERVAL: Duration = Duration::from_millis(1000);

/// Allows at most one connect attempt per interval
///
/// Every granted attempt counts, whether or not the socket then opens.
#[derive(Debug, Clone)]
pub struct ReconnectLimiter {
    interval: Duration,
    last_attempt: Option<Instant>,
}

impl ReconnectLimiter {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_attempt: None,
        }
    }

    /// Claim the attempt slot at `now`
    pub fn try_acquire(&mut self, now: Instant) -> bool {
        if let Some(last) = self.last_attempt {
            if now.saturating_duration_since(last) < self.interval {
                return false;
            }
        }
        self.last_attempt = Some(now);
        true
    }
}

impl Default for ReconnectLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_RECONNECT_INTERVAL)
    }
}
