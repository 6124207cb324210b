//! Ingestion settings.

use std::time::Duration;

use pricefeed_core::DEFAULT_LOOKBACK_DAYS;

/// Bounded retry for transient provider failures.
///
/// `max_attempts` counts the first call, so `1` disables retries. The delay
/// before attempt `n + 1` is `backoff * n`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of calls allowed per fetch, at least 1.
    pub max_attempts: u32,
    /// Base delay between attempts.
    pub backoff: Duration,
}

impl RetryPolicy {
    /// A single attempt with no retries.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            max_attempts: 1,
            backoff: Duration::from_millis(500),
        }
    }

    /// Retry up to `max_attempts` calls in total with linear backoff.
    #[must_use]
    pub const fn attempts(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts,
            backoff,
        }
    }

    /// Delay to wait after the given failed attempt (1-based).
    #[must_use]
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.backoff.saturating_mul(attempt)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::none()
    }
}

/// Settings shared by every ingestion run of an [`Ingestor`](crate::Ingestor).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IngestConfig {
    /// Lookback used when a caller passes `None`.
    pub default_lookback_days: u32,
    /// Maximum number of symbols ingested at the same time in a batch.
    pub concurrency: usize,
    /// Deadline for one provider call.
    pub fetch_timeout: Duration,
    /// Deadline for one registry or store call.
    pub store_timeout: Duration,
    /// Retry policy for transient provider failures.
    pub retry: RetryPolicy,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            default_lookback_days: DEFAULT_LOOKBACK_DAYS,
            concurrency: 4,
            fetch_timeout: Duration::from_secs(30),
            store_timeout: Duration::from_secs(10),
            retry: RetryPolicy::none(),
        }
    }
}
