//! Retry logic.
//!
//! # Responsibilities
//! - Decide whether a failed attempt is re-attempted
//! - Compute the jittered backoff before the next attempt
//!
//! # Design Decisions
//! - Only transient failures are retried; terminal failures and admission
//!   rejections end the sequence
//! - `max_attempts` counts retries after the first attempt
//! - Jitter is drawn independently for every retry

use std::time::Duration;

use crate::config::RetryConfig;
use crate::resilience::backoff::calculate_backoff;
use crate::resilience::classifier::CallOutcome;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Retries allowed after the first attempt.
    pub fn max_attempts(&self) -> u32 {
        self.config.max_attempts
    }

    /// Jittered delay before retry number `retry` (1-based).
    pub fn backoff(&self, retry: u32) -> Duration {
        calculate_backoff(retry, self.config.min_backoff, self.config.jitter)
    }

    /// Delay before the next attempt, or `None` when the sequence ends with `outcome`.
    pub fn next_delay(&self, retries_done: u32, outcome: &CallOutcome) -> Option<Duration> {
        match outcome {
            CallOutcome::TransientFailure(_) if retries_done < self.config.max_attempts => {
                Some(self.backoff(retries_done + 1))
            }
            _ => None,
        }
    }
}
