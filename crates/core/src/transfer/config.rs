//! Configuration for the transfer layer.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for streaming transfers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferConfig {
    /// Accept a remote object that streams zero bytes.
    #[serde(default)]
    pub allow_empty_input: bool,

    /// Read/write buffer size in bytes.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Retry policy for transient remote failures.
    #[serde(default)]
    pub retry: RetryPolicy,
}

/// Bounded exponential backoff for retryable transfer errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum attempts, the first one included.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry in milliseconds.
    #[serde(default = "default_initial_delay")]
    pub initial_delay_ms: u64,

    /// Upper bound for any single delay in milliseconds.
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,

    /// Exponential backoff multiplier.
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

fn default_chunk_size() -> usize {
    64 * 1024
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay() -> u64 {
    500
}

fn default_max_delay() -> u64 {
    30_000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay(),
            max_delay_ms: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            allow_empty_input: false,
            chunk_size: default_chunk_size(),
            retry: RetryPolicy::default(),
        }
    }
}

impl RetryPolicy {
    /// A policy that makes a single attempt.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    /// Sets the maximum attempts.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Sets the initial and maximum delays in milliseconds.
    pub fn with_delays(mut self, initial_delay_ms: u64, max_delay_ms: u64) -> Self {
        self.initial_delay_ms = initial_delay_ms;
        self.max_delay_ms = max_delay_ms;
        self
    }

    /// Delay to wait after failed attempt number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let delay = self.initial_delay_ms as f64 * self.backoff_multiplier.powi(exponent);
        Duration::from_millis(delay.min(self.max_delay_ms as f64) as u64)
    }
}

impl TransferConfig {
    /// Accepts or rejects zero-byte inputs.
    pub fn with_allow_empty_input(mut self, allow: bool) -> Self {
        self.allow_empty_input = allow;
        self
    }

    /// Sets the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}
