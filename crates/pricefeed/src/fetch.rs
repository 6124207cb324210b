//! Provider calls with deadlines and bounded retry.

use std::{future::Future, sync::Arc, time::Duration};

use polars::prelude::DataFrame;
use pricefeed_core::{DataError, IngestionWindow, PriceDataProvider, Result, Symbol};
use tracing::{debug, warn};

use crate::config::RetryPolicy;

/// Fetches daily series from a [`PriceDataProvider`], applying a per-call
/// deadline and retrying transient failures.
#[derive(Clone, Debug)]
pub struct PriceSeriesFetcher {
    provider: Arc<dyn PriceDataProvider>,
    timeout: Duration,
    retry: RetryPolicy,
}

impl PriceSeriesFetcher {
    /// Wrap a provider.
    #[must_use]
    pub fn new(provider: Arc<dyn PriceDataProvider>, timeout: Duration, retry: RetryPolicy) -> Self {
        Self {
            provider,
            timeout,
            retry,
        }
    }

    /// Fetch the series for `symbol` over `window`.
    ///
    /// Each attempt is bounded by the fetch timeout. Network, rate-limit and
    /// timeout errors are retried until the policy's attempts run out; any
    /// other error is returned immediately.
    ///
    /// # Errors
    /// Returns the last provider error, or [`DataError::Timeout`].
    pub async fn fetch(&self, symbol: &Symbol, window: &IngestionWindow) -> Result<DataFrame> {
        let attempts = self.retry.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            debug!(
                provider = self.provider.name(),
                symbol = %symbol,
                attempt,
                "Fetching daily bars for {}",
                window
            );

            let result = with_timeout(
                "provider fetch",
                self.timeout,
                self.provider
                    .fetch_daily(symbol, window.start(), window.end()),
            )
            .await;

            match result {
                Err(e) if e.is_transient() && attempt < attempts => {
                    let delay = match &e {
                        DataError::RateLimited {
                            retry_after: Some(after),
                            ..
                        } => *after,
                        _ => self.retry.delay_after(attempt),
                    };
                    warn!(
                        symbol = %symbol,
                        attempt,
                        error = %e,
                        "Transient fetch failure, retrying in {:?}",
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}

/// Run `fut` with a deadline, mapping expiry to [`DataError::Timeout`].
pub(crate) async fn with_timeout<T, F>(operation: &str, after: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::time::timeout(after, fut)
        .await
        .unwrap_or_else(|_| {
            Err(DataError::Timeout {
                operation: operation.to_string(),
                after,
            })
        })
}
