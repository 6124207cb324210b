#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/pricefeed/pricefeed/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Yahoo Finance data provider.
//!
//! Implements [`DataProvider`] and [`PriceDataProvider`] from `pricefeed-core`
//! on top of Yahoo Finance's chart API.
//!
//! # Example
//!
//! ```no_run
//! use pricefeed_yahoo::YahooProvider;
//! use pricefeed_core::{PriceDataProvider, Symbol};
//! use chrono::NaiveDate;
//!
//! # async fn example() -> pricefeed_core::Result<()> {
//! let provider = YahooProvider::new()?;
//! let symbol = Symbol::new("AAPL");
//! let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
//! let end = NaiveDate::from_ymd_opt(2024, 2, 1).unwrap();
//!
//! // Bars for January 2024; the end date is exclusive.
//! let df = provider.fetch_daily(&symbol, start, end).await?;
//! println!("Fetched {} rows", df.height());
//! # Ok(())
//! # }
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};
use polars::prelude::*;
use pricefeed_core::{DataError, DataProvider, PriceDataProvider, Result, Symbol};
use serde::Deserialize;
use tokio::time::sleep;
use tracing::debug;

/// Yahoo Finance chart API base URL.
const CHART_API_URL: &str = "https://query1.finance.yahoo.com/v8/finance/chart";

/// Default rate limit delay in milliseconds.
const DEFAULT_RATE_LIMIT_MS: u64 = 1000;

/// Default per-request HTTP timeout.
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// User agent for HTTP requests.
const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36";

const PROVIDER_NAME: &str = "Yahoo Finance";

/// Yahoo Finance daily price provider.
#[derive(Debug)]
pub struct YahooProvider {
    client: reqwest::Client,
    rate_limit_ms: u64,
    last_request_time: AtomicU64,
}

impl YahooProvider {
    /// Create a new Yahoo Finance provider with default settings.
    ///
    /// Uses built-in rate limiting of 1 request per second.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new() -> Result<Self> {
        Self::with_rate_limit(Duration::from_millis(DEFAULT_RATE_LIMIT_MS))
    }

    /// Create a new Yahoo Finance provider with a custom HTTP client.
    ///
    /// Rate limiting is still applied.
    #[must_use]
    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client,
            rate_limit_ms: DEFAULT_RATE_LIMIT_MS,
            last_request_time: AtomicU64::new(0),
        }
    }

    /// Create a new Yahoo Finance provider with custom rate limiting.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn with_rate_limit(rate_limit: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| DataError::Network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            rate_limit_ms: u64::try_from(rate_limit.as_millis()).unwrap_or(u64::MAX),
            last_request_time: AtomicU64::new(0),
        })
    }

    /// Apply rate limiting before making a request.
    ///
    /// Each caller reserves the next free slot before sleeping, so concurrent
    /// fetches through one provider stay spaced out.
    async fn apply_rate_limit(&self) {
        let now = now_millis();
        let rate = self.rate_limit_ms;
        let previous = self
            .last_request_time
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(last.saturating_add(rate).max(now))
            })
            .unwrap_or_else(|last| last);
        let slot = previous.saturating_add(rate).max(now);

        if slot > now {
            let wait_time = slot - now;
            debug!("Rate limiting: waiting {}ms", wait_time);
            sleep(Duration::from_millis(wait_time)).await;
        }
    }

    /// Build the chart API URL for a symbol and `[start, end)` range.
    fn build_chart_url(&self, symbol: &Symbol, start: NaiveDate, end: NaiveDate) -> String {
        format!(
            "{}/{}?period1={}&period2={}&interval=1d&events=history",
            CHART_API_URL,
            symbol.as_str(),
            midnight_timestamp(start),
            midnight_timestamp(end),
        )
    }

    /// Parse a chart response into a daily OHLCV DataFrame.
    ///
    /// Rows on or after `end` are dropped; Yahoo sometimes appends the
    /// current session even when it lies past `period2`.
    fn parse_chart_response(
        &self,
        symbol: &Symbol,
        response: ChartResponse,
        end: NaiveDate,
    ) -> Result<DataFrame> {
        let Some(result) = response.chart.result.into_iter().next() else {
            return Err(DataError::SymbolNotFound(symbol.to_string()));
        };

        let timestamps = result.timestamp.unwrap_or_default();
        if timestamps.is_empty() {
            debug!(symbol = %symbol, "Chart response has no timestamps");
            return empty_frame();
        }

        let quote = result
            .indicators
            .quote
            .into_iter()
            .next()
            .ok_or_else(|| DataError::Parse("Missing quote data".to_string()))?;

        let gmt_offset = result.meta.and_then(|m| m.gmtoffset).unwrap_or(0);
        let epoch = NaiveDate::default();

        let mut dates = Vec::with_capacity(timestamps.len());
        let mut opens = Vec::with_capacity(timestamps.len());
        let mut highs = Vec::with_capacity(timestamps.len());
        let mut lows = Vec::with_capacity(timestamps.len());
        let mut closes = Vec::with_capacity(timestamps.len());
        let mut volumes = Vec::with_capacity(timestamps.len());

        for (i, &ts) in timestamps.iter().enumerate() {
            // Exchange-local trading date
            let Some(date) = Utc
                .timestamp_opt(ts + gmt_offset, 0)
                .single()
                .map(|dt| dt.date_naive())
            else {
                return Err(DataError::Parse(format!("Invalid timestamp {}", ts)));
            };
            if date >= end {
                continue;
            }

            let days = i32::try_from((date - epoch).num_days())
                .map_err(|e| DataError::Parse(e.to_string()))?;
            dates.push(days);
            opens.push(quote.open.get(i).copied().flatten());
            highs.push(quote.high.get(i).copied().flatten());
            lows.push(quote.low.get(i).copied().flatten());
            closes.push(quote.close.get(i).copied().flatten());
            volumes.push(quote.volume.get(i).copied().flatten());
        }

        build_frame(dates, opens, highs, lows, closes, volumes)
    }
}

impl DataProvider for YahooProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    fn description(&self) -> &str {
        "Yahoo Finance chart API provider for daily OHLCV bars"
    }
}

#[async_trait]
impl PriceDataProvider for YahooProvider {
    async fn fetch_daily(
        &self,
        symbol: &Symbol,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<DataFrame> {
        if start >= end {
            return Err(DataError::InvalidParameter(format!(
                "Start date {} must be before end date {}",
                start, end
            )));
        }

        self.apply_rate_limit().await;

        let url = self.build_chart_url(symbol, start, end);
        debug!("Fetching daily bars: {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| DataError::Network(e.to_string()))?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(DataError::RateLimited {
                provider: PROVIDER_NAME.to_string(),
                retry_after: Some(Duration::from_secs(60)),
            });
        }

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(DataError::SymbolNotFound(symbol.to_string()));
        }

        if !response.status().is_success() {
            return Err(DataError::Network(format!(
                "HTTP {} for {}",
                response.status(),
                symbol
            )));
        }

        let chart_response: ChartResponse = response
            .json()
            .await
            .map_err(|e| DataError::Parse(e.to_string()))?;

        // Check for API-level errors
        if let Some(error) = chart_response.chart.error.as_ref() {
            if error.code == "Not Found" {
                return Err(DataError::SymbolNotFound(symbol.to_string()));
            }
            return Err(DataError::Other(format!(
                "{}: {}",
                error.code, error.description
            )));
        }

        self.parse_chart_response(symbol, chart_response, end)
    }
}

fn now_millis() -> u64 {
    u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0)
}

fn midnight_timestamp(date: NaiveDate) -> i64 {
    date.and_hms_opt(0, 0, 0)
        .map(|dt| Utc.from_utc_datetime(&dt).timestamp())
        .unwrap_or(0)
}

fn empty_frame() -> Result<DataFrame> {
    build_frame(
        Vec::new(),
        Vec::new(),
        Vec::new(),
        Vec::new(),
        Vec::new(),
        Vec::new(),
    )
}

/// Assemble the provider frame; `dates` are days since the Unix epoch.
fn build_frame(
    dates: Vec<i32>,
    opens: Vec<Option<f64>>,
    highs: Vec<Option<f64>>,
    lows: Vec<Option<f64>>,
    closes: Vec<Option<f64>>,
    volumes: Vec<Option<u64>>,
) -> Result<DataFrame> {
    let date_col = Column::new("date".into(), dates)
        .cast(&DataType::Date)
        .map_err(|e| DataError::Other(e.to_string()))?;

    DataFrame::new(vec![
        date_col,
        Column::new("open".into(), opens),
        Column::new("high".into(), highs),
        Column::new("low".into(), lows),
        Column::new("close".into(), closes),
        Column::new("volume".into(), volumes),
    ])
    .map_err(|e| DataError::Other(e.to_string()))
}

// ============================================================================
// Yahoo Finance API Response Types
// ============================================================================

/// Chart API response.
#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartResult,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    #[serde(default)]
    result: Vec<ChartData>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    meta: Option<ChartMeta>,
    timestamp: Option<Vec<i64>>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct ChartMeta {
    gmtoffset: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    #[serde(default)]
    quote: Vec<QuoteData>,
}

#[derive(Debug, Deserialize)]
struct QuoteData {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<u64>>,
}
