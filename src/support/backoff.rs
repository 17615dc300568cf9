//! Reconnect backoff policy
//!
//! Exponential backoff used by the connectivity manager between
//! websocket connection attempts: `delay = min(initial · 2^attempt, max)`.
//! The counter resets on a successful connection and reports exhaustion
//! after a configured number of attempts so the caller can rotate to the
//! next network connection profile.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Delay before the first retry.
    pub initial: Duration,
    /// Cap applied to the computed delay.
    pub max: Duration,
    /// Attempts on one profile before rotating to the next.
    pub max_attempts: u32,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(120),
            max_attempts: 5,
        }
    }
}

/// Mutable retry state for a single network connection profile.
#[derive(Debug, Clone)]
pub struct ReconnectBackoff {
    config: BackoffConfig,
    attempt: u32,
}

impl ReconnectBackoff {
    pub fn new(config: BackoffConfig) -> Self {
        Self { config, attempt: 0 }
    }

    /// Delay to wait before the next attempt, advancing the counter.
    pub fn next_delay(&mut self) -> Duration {
        let exp = self.attempt.min(31);
        let delay = self
            .config
            .initial
            .saturating_mul(1u32.checked_shl(exp).unwrap_or(u32::MAX))
            .min(self.config.max);
        self.attempt = self.attempt.saturating_add(1);
        delay
    }

    /// True once the profile has used up its attempts and the caller
    /// should advance to the next configuration slot.
    pub fn exhausted(&self) -> bool {
        self.attempt >= self.config.max_attempts
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Reset after a successful connection or a profile rotation.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}
