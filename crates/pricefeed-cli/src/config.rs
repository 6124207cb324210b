//! Environment-based settings for the `pricefeed` binary.

use std::{error::Error, path::PathBuf, str::FromStr, time::Duration};

use anyhow::{Context, ensure};
use pricefeed::{DEFAULT_LOOKBACK_DAYS, IngestConfig, RetryPolicy};

/// Settings read from `PRICEFEED_*` variables.
#[derive(Debug, Clone)]
pub(crate) struct AppConfig {
    /// SQLite database file.
    pub(crate) db_path: PathBuf,
    /// Pipeline settings.
    pub(crate) ingest: IngestConfig,
    /// Minimum spacing between provider requests.
    pub(crate) rate_limit: Duration,
    /// Daemon period.
    pub(crate) schedule_every: Duration,
}

impl AppConfig {
    /// Load `.env` if present, then read the process environment.
    pub(crate) fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the settings from a variable lookup. Unset or blank variables
    /// take their default; anything else must parse.
    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let defaults = IngestConfig::default();

        let db_path = lookup("PRICEFEED_DB_PATH")
            .filter(|v| !v.trim().is_empty())
            .map_or_else(|| PathBuf::from("pricefeed.db"), PathBuf::from);

        let lookback: u32 = parse_var(&lookup, "PRICEFEED_LOOKBACK_DAYS", DEFAULT_LOOKBACK_DAYS)?;
        let concurrency: usize = parse_var(&lookup, "PRICEFEED_CONCURRENCY", defaults.concurrency)?;
        let fetch_secs: u64 = parse_var(
            &lookup,
            "PRICEFEED_FETCH_TIMEOUT_SECS",
            defaults.fetch_timeout.as_secs(),
        )?;
        let store_secs: u64 = parse_var(
            &lookup,
            "PRICEFEED_STORE_TIMEOUT_SECS",
            defaults.store_timeout.as_secs(),
        )?;
        let attempts: u32 = parse_var(
            &lookup,
            "PRICEFEED_FETCH_ATTEMPTS",
            defaults.retry.max_attempts,
        )?;
        let backoff_ms: u64 = parse_var(&lookup, "PRICEFEED_RETRY_BACKOFF_MS", 500)?;
        let rate_limit_ms: u64 = parse_var(&lookup, "PRICEFEED_RATE_LIMIT_MS", 1000)?;
        let schedule_minutes: u64 = parse_var(&lookup, "PRICEFEED_SCHEDULE_MINUTES", 1440)?;

        ensure!(lookback > 0, "PRICEFEED_LOOKBACK_DAYS must be at least 1");
        ensure!(concurrency > 0, "PRICEFEED_CONCURRENCY must be at least 1");
        ensure!(fetch_secs > 0, "PRICEFEED_FETCH_TIMEOUT_SECS must be at least 1");
        ensure!(store_secs > 0, "PRICEFEED_STORE_TIMEOUT_SECS must be at least 1");
        ensure!(attempts > 0, "PRICEFEED_FETCH_ATTEMPTS must be at least 1");
        ensure!(schedule_minutes > 0, "PRICEFEED_SCHEDULE_MINUTES must be at least 1");

        Ok(Self {
            db_path,
            ingest: IngestConfig {
                default_lookback_days: lookback,
                concurrency,
                fetch_timeout: Duration::from_secs(fetch_secs),
                store_timeout: Duration::from_secs(store_secs),
                retry: RetryPolicy::attempts(attempts, Duration::from_millis(backoff_ms)),
            },
            rate_limit: Duration::from_millis(rate_limit_ms),
            schedule_every: Duration::from_secs(schedule_minutes.saturating_mul(60)),
        })
    }
}

fn parse_var<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .with_context(|| format!("invalid value {raw:?} for {key}")),
        _ => Ok(default),
    }
}
