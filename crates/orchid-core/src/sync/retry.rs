//! Capped exponential backoff for rejected pushes

use std::time::Duration;

use crate::config::SyncConfig;
use crate::remote::ErrorClass;

use super::result::CycleMode;

/// Retry bookkeeping to store after a failed remote write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryState {
    pub attempts: u32,
    pub next_retry_at: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub auth_multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&SyncConfig::default())
    }
}

impl RetryPolicy {
    pub const fn from_config(config: &SyncConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base_delay: config.retry_base_delay(),
            max_delay: config.retry_max_delay(),
            auth_multiplier: config.auth_retry_multiplier,
        }
    }

    /// Backoff after the `attempts`-th consecutive failure:
    /// `base * 2^(attempts - 1)`, scaled for authorization failures, capped.
    pub fn delay_for(&self, attempts: u32, class: ErrorClass) -> Duration {
        let exponent = attempts.saturating_sub(1).min(20);
        let mut delay = self.base_delay.saturating_mul(1_u32 << exponent);
        if class == ErrorClass::Authorization {
            delay = delay.saturating_mul(self.auth_multiplier);
        }
        delay.min(self.max_delay)
    }

    pub const fn is_exhausted(&self, attempts: u32) -> bool {
        attempts >= self.max_attempts
    }

    /// Whether a background cycle may retry now
    pub const fn is_due(&self, attempts: u32, next_retry_at: Option<i64>, now: i64) -> bool {
        if self.is_exhausted(attempts) {
            return false;
        }
        match next_retry_at {
            Some(at) => at <= now,
            None => true,
        }
    }

    /// Forced cycles retry everything; background cycles honour backoff and the cap.
    pub const fn should_attempt(
        &self,
        mode: CycleMode,
        attempts: u32,
        next_retry_at: Option<i64>,
        now: i64,
    ) -> bool {
        match mode {
            CycleMode::Full => true,
            CycleMode::Background => self.is_due(attempts, next_retry_at, now),
        }
    }

    /// Next retry state. Transport failures do not consume an attempt.
    pub fn after_failure(&self, attempts: u32, class: ErrorClass, now: i64) -> RetryState {
        if class == ErrorClass::Transport {
            return RetryState {
                attempts,
                next_retry_at: None,
            };
        }
        let attempts = attempts.saturating_add(1);
        let delay = i64::try_from(self.delay_for(attempts, class).as_millis()).unwrap_or(i64::MAX);
        RetryState {
            attempts,
            next_retry_at: Some(now.saturating_add(delay)),
        }
    }
}
