//! Backoff schedule for re-reading execution history.
//!
//! ComfyUI can announce that a node executed slightly before the
//! history endpoint records it. After a completion event the executor
//! re-reads history a bounded number of times, sleeping with
//! exponentially growing delays in between.

use std::time::Duration;

/// Tunable parameters for the history re-poll.
#[derive(Debug, Clone)]
pub struct HistoryPollConfig {
    /// Total history reads per completion event (at least one).
    pub attempts: u32,
    /// Delay after the first pending read.
    pub initial_delay: Duration,
    /// Upper bound on the delay between reads.
    pub max_delay: Duration,
    /// Factor by which the delay grows after each pending read.
    pub multiplier: f64,
}

impl Default for HistoryPollConfig {
    fn default() -> Self {
        Self {
            attempts: 5,
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(2),
            multiplier: 2.0,
        }
    }
}

/// Calculate the next backoff delay from the current delay and config.
///
/// The result is clamped to [`HistoryPollConfig::max_delay`].
pub fn next_delay(current: Duration, config: &HistoryPollConfig) -> Duration {
    let next_ms = (current.as_millis() as f64 * config.multiplier) as u64;
    Duration::from_millis(next_ms).min(config.max_delay)
}
