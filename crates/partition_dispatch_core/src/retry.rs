use std::time::Duration;

use crate::contract::ValidationError;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_BASE_DELAY_MS: u64 = 1_000;
pub const MAX_ATTEMPTS_LIMIT: u32 = 10;

/// Progress of one dispatch through its attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptState {
    Attempting(u32),
    Succeeded { attempts: u32 },
    Exhausted { attempts: u32 },
}

impl AttemptState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Attempting(_))
    }
}

/// Bounded exponential backoff without jitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: Duration::from_millis(DEFAULT_BASE_DELAY_MS),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Result<Self, ValidationError> {
        if max_attempts == 0 {
            return Err(ValidationError::new(
                "max_attempts must be a positive integer",
            ));
        }
        if max_attempts > MAX_ATTEMPTS_LIMIT {
            return Err(ValidationError::new(format!(
                "max_attempts exceeds MAX_ATTEMPTS_LIMIT={MAX_ATTEMPTS_LIMIT}"
            )));
        }

        Ok(Self {
            max_attempts,
            base_delay,
        })
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    pub fn start(&self) -> AttemptState {
        AttemptState::Attempting(1)
    }

    pub fn on_success(&self, attempt: u32) -> AttemptState {
        AttemptState::Succeeded { attempts: attempt }
    }

    pub fn on_failure(&self, attempt: u32) -> AttemptState {
        if attempt >= self.max_attempts {
            AttemptState::Exhausted { attempts: attempt }
        } else {
            AttemptState::Attempting(attempt + 1)
        }
    }

    /// Wait after failed attempt `attempt` (1-based): `base * 2^(attempt-1)`.
    pub fn backoff_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let factor = 2u32.checked_pow(exponent).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }
}
