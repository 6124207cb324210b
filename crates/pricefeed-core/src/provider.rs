//! Provider traits for fetching market data.
//!
//! - [`DataProvider`] - Base trait for all data providers
//! - [`PriceDataProvider`] - Daily OHLCV price series

use async_trait::async_trait;
use chrono::NaiveDate;
use polars::prelude::DataFrame;
use std::fmt::Debug;

use crate::{error::Result, types::Symbol};

/// Base trait for all data providers.
pub trait DataProvider: Send + Sync + Debug {
    /// Returns the name of this provider (e.g., "Yahoo Finance").
    fn name(&self) -> &str;

    /// Returns a description of this provider.
    fn description(&self) -> &str;
}

/// Provider for daily OHLCV price data.
#[async_trait]
pub trait PriceDataProvider: DataProvider {
    /// Fetches the daily bar series for `symbol` over `[start, end)`.
    ///
    /// `end` is exclusive. The returned DataFrame has the columns
    /// `date`, `open`, `high`, `low`, `close` and `volume`; any of them may
    /// contain nulls. A range with no trading data yields an empty DataFrame,
    /// not an error.
    async fn fetch_daily(
        &self,
        symbol: &Symbol,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<DataFrame>;
}
