//! Retry policy for handlers that report transient failures.

use std::time::Duration;

use crate::task::TaskError;

/// How often, and how patiently, a retryable handler failure is re-run.
///
/// Only [`TaskError::Retryable`] failures are retried. The count excludes the
/// first attempt: `fixed(2, ..)` runs a handler at most three times.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum RetryPolicy {
    /// Record the first failure.
    #[default]
    None,

    /// Same delay before every retry.
    Fixed {
        retries: u32,
        delay: Duration,
    },

    /// Delay doubles before every retry, up to `max_delay`.
    Exponential {
        retries: u32,
        initial_delay: Duration,
        max_delay: Duration,
    },
}

impl RetryPolicy {
    /// Exponential backoff starting at one second, capped at one minute.
    pub fn exponential(retries: u32) -> Self {
        Self::Exponential {
            retries,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
        }
    }

    /// Fixed delay between retries.
    pub fn fixed(retries: u32, delay: Duration) -> Self {
        Self::Fixed { retries, delay }
    }

    /// Delay before retry number `retry` (1-indexed), or `None` once exhausted.
    pub fn delay_for_retry(&self, retry: u32) -> Option<Duration> {
        match self {
            Self::None => None,
            Self::Fixed { retries, delay } => (retry <= *retries).then_some(*delay),
            Self::Exponential {
                retries,
                initial_delay,
                max_delay,
            } => {
                if retry > *retries {
                    return None;
                }
                let factor = 1u32.checked_shl(retry.saturating_sub(1)).unwrap_or(u32::MAX);
                Some(initial_delay.saturating_mul(factor).min(*max_delay))
            }
        }
    }

    /// Delay before re-running after `err` on attempt `attempt`, if any.
    pub fn next_delay(&self, attempt: u32, err: &TaskError) -> Option<Duration> {
        if err.is_retryable() {
            self.delay_for_retry(attempt)
        } else {
            None
        }
    }

    /// Maximum number of retries after the first attempt.
    pub fn retries(&self) -> u32 {
        match self {
            Self::None => 0,
            Self::Fixed { retries, .. } | Self::Exponential { retries, .. } => *retries,
        }
    }
}
