//! Configuration knobs for the sync core.

use std::time::Duration;

/// Configuration for session refresh, channel reconnection and
/// notification polling.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Tokens whose expiry is closer than this margin are refreshed
    /// before use.
    pub refresh_margin_secs: i64,
    /// First reconnect delay after a transport drop.
    pub reconnect_base_delay: Duration,
    /// Multiplier applied to the delay on each further attempt.
    pub reconnect_multiplier: u32,
    /// Upper bound on any single reconnect delay.
    pub reconnect_max_delay: Duration,
    /// Reconnect attempts before giving up and surfacing a terminal
    /// connectivity-lost signal.
    pub reconnect_max_attempts: u8,
    /// Fixed interval between periodic notification pulls.
    pub notification_poll_interval: Duration,
    /// Page size used when the engine re-fetches its current page.
    pub notification_page_size: usize,
    /// Cap on bookings retained by the dispatcher (LRU by last event).
    pub max_tracked_bookings: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            refresh_margin_secs: 10,
            reconnect_base_delay: Duration::from_secs(1),
            reconnect_multiplier: 2,
            reconnect_max_delay: Duration::from_secs(30),
            reconnect_max_attempts: 5,
            notification_poll_interval: Duration::from_secs(60),
            notification_page_size: 20,
            max_tracked_bookings: 512,
        }
    }
}

impl SyncConfig {
    /// Delay before reconnect attempt `attempt` (1-based), exponential
    /// and capped at `reconnect_max_delay`.
    pub fn reconnect_delay(&self, attempt: u8) -> Duration {
        let exp = self
            .reconnect_multiplier
            .saturating_pow(attempt.saturating_sub(1) as u32);
        self.reconnect_base_delay
            .saturating_mul(exp)
            .min(self.reconnect_max_delay)
    }
}
