//! Reconnect delay policy
//!
//! A fixed table of delays indexed by retry attempt. The attempt is clamped to
//! `max_retries` and then to the last table entry, so once the clamp is hit the
//! stream keeps retrying at the longest delay for as long as it is running.

use std::time::Duration;

use crate::config::StreamConfig;

/// Maps a retry attempt to the delay before the next connect
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffPolicy {
    schedule: Vec<Duration>,
    max_retries: u32,
}

impl BackoffPolicy {
    /// Build a policy from an explicit schedule.
    ///
    /// An empty schedule yields a zero delay for every attempt; a validated
    /// [`StreamConfig`] never produces one.
    pub fn new(schedule: Vec<Duration>, max_retries: u32) -> Self {
        Self {
            schedule,
            max_retries,
        }
    }

    /// Policy described by a stream configuration
    pub fn from_config(config: &StreamConfig) -> Self {
        Self::new(config.backoff_schedule.clone(), config.max_retries)
    }

    /// Delay before reconnecting after `attempt` consecutive failures
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let Some(last) = self.schedule.len().checked_sub(1) else {
            return Duration::ZERO;
        };
        let index = (attempt.min(self.max_retries) as usize).min(last);
        self.schedule[index]
    }

    /// Attempt number to use after another failure, saturating at the clamp
    pub fn next_attempt(&self, attempt: u32) -> u32 {
        attempt.saturating_add(1).min(self.max_retries)
    }

    /// The configured retry clamp
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// The delay table
    pub fn schedule(&self) -> &[Duration] {
        &self.schedule
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::from_config(&StreamConfig::default())
    }
}
