//! Core data types for daily price ingestion.
//!
//! - [`Symbol`] - Trading symbol/ticker
//! - [`SymbolInfo`] - Registered symbol with its display name
//! - [`PriceBar`] - Validated daily OHLCV bar keyed by (symbol, date)
//! - [`IngestionWindow`] - Half-open date range requested from a provider

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{DataError, Result};

/// Number of trailing days ingested when the caller does not say otherwise.
pub const DEFAULT_LOOKBACK_DAYS: u32 = 20;

/// A trading symbol/ticker.
///
/// Symbols are trimmed and uppercased on creation.
#[derive(
    Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Symbol(String);

impl Symbol {
    /// Creates a new symbol from a string, trimming and converting to uppercase.
    #[must_use]
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into().trim().to_uppercase())
    }

    /// Creates a symbol, rejecting empty tickers and characters other than
    /// ASCII alphanumerics, `.` and `-`.
    ///
    /// # Errors
    /// Returns [`DataError::InvalidParameter`] for a malformed ticker.
    pub fn parse(s: &str) -> Result<Self> {
        let symbol = Self::new(s);
        if symbol.0.is_empty() {
            return Err(DataError::InvalidParameter("Symbol must not be empty".to_string()));
        }
        if let Some(c) = symbol
            .0
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '.' || *c == '-'))
        {
            return Err(DataError::InvalidParameter(format!(
                "Symbol {} contains invalid character {:?}",
                symbol.0, c
            )));
        }
        Ok(symbol)
    }

    /// Returns the symbol as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Symbol {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl From<&str> for Symbol {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Symbol {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// A registered symbol and its display name.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolInfo {
    /// Ticker.
    pub symbol: Symbol,
    /// Display name, e.g. "Apple Inc.".
    pub name: String,
}

impl SymbolInfo {
    /// Creates a new symbol entry.
    #[must_use]
    pub fn new(symbol: Symbol, name: impl Into<String>) -> Self {
        Self {
            symbol,
            name: name.into(),
        }
    }
}

/// A validated daily OHLCV bar.
///
/// (`symbol`, `date`) is the natural key; a store holds at most one bar per key.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    /// Symbol the bar belongs to.
    pub symbol: Symbol,
    /// Trading date.
    pub date: NaiveDate,
    /// Opening price.
    pub open: f64,
    /// Highest price of the day.
    pub high: f64,
    /// Lowest price of the day.
    pub low: f64,
    /// Closing price.
    pub close: f64,
    /// Shares traded.
    pub volume: u64,
}

impl PriceBar {
    /// Creates a new daily bar.
    #[must_use]
    pub const fn new(
        symbol: Symbol,
        date: NaiveDate,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: u64,
    ) -> Self {
        Self {
            symbol,
            date,
            open,
            high,
            low,
            close,
            volume,
        }
    }
}

/// Half-open date range `[start, end)` requested from a provider.
///
/// The end bound is exclusive: a window ending today covers bars up to and
/// including yesterday.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IngestionWindow {
    start: NaiveDate,
    end: NaiveDate,
}

impl IngestionWindow {
    /// The `lookback_days` days before `today`: `[today - lookback_days, today)`.
    ///
    /// # Errors
    /// Returns [`DataError::InvalidParameter`] if `lookback_days` is zero or
    /// reaches before the earliest representable date.
    pub fn trailing(today: NaiveDate, lookback_days: u32) -> Result<Self> {
        if lookback_days == 0 {
            return Err(DataError::InvalidParameter(
                "lookback_days must be a positive number of days".to_string(),
            ));
        }
        let start = today
            .checked_sub_days(Days::new(u64::from(lookback_days)))
            .ok_or_else(|| {
                DataError::InvalidParameter(format!(
                    "lookback of {} days from {} is out of range",
                    lookback_days, today
                ))
            })?;
        Ok(Self { start, end: today })
    }

    /// An explicit window `[start, end)`.
    ///
    /// # Errors
    /// Returns [`DataError::InvalidParameter`] unless `start < end`.
    pub fn between(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if start >= end {
            return Err(DataError::InvalidParameter(format!(
                "Start date {} must be before end date {}",
                start, end
            )));
        }
        Ok(Self { start, end })
    }

    /// First date in the window.
    #[must_use]
    pub const fn start(&self) -> NaiveDate {
        self.start
    }

    /// Exclusive end of the window.
    #[must_use]
    pub const fn end(&self) -> NaiveDate {
        self.end
    }

    /// Window length in calendar days.
    #[must_use]
    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days()
    }

    /// Returns true if `date` falls inside `[start, end)`.
    #[must_use]
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date < self.end
    }
}

impl fmt::Display for IngestionWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} to {}", self.start, self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_symbol_normalization() {
        assert_eq!(Symbol::new(" aapl ").as_str(), "AAPL");
        assert_eq!(Symbol::from("msft").to_string(), "MSFT");
    }

    #[test]
    fn test_symbol_parse() {
        assert_eq!(Symbol::parse("brk-b").unwrap().as_str(), "BRK-B");
        assert_eq!("rds.a".parse::<Symbol>().unwrap().as_str(), "RDS.A");
        assert!(Symbol::parse("   ").is_err());
        assert!(Symbol::parse("AA PL").is_err());
        assert!(Symbol::parse("AAPL;DROP").is_err());
    }

    #[test]
    fn test_default_trailing_window() {
        let today = date(2024, 3, 21);
        let window = IngestionWindow::trailing(today, DEFAULT_LOOKBACK_DAYS).unwrap();

        assert_eq!(window.start(), date(2024, 3, 1));
        assert_eq!(window.end(), today);
        assert_eq!(window.days(), 20);
    }

    #[test]
    fn test_trailing_window_crosses_year() {
        let window = IngestionWindow::trailing(date(2024, 1, 5), 10).unwrap();
        assert_eq!(window.start(), date(2023, 12, 26));
        assert_eq!(window.days(), 10);
    }

    #[test]
    fn test_zero_lookback_rejected() {
        let err = IngestionWindow::trailing(date(2024, 1, 5), 0).unwrap_err();
        assert!(matches!(err, DataError::InvalidParameter(_)));
    }

    #[test]
    fn test_between() {
        let window = IngestionWindow::between(date(2024, 1, 1), date(2024, 2, 1)).unwrap();
        assert_eq!(window.days(), 31);
        assert!(IngestionWindow::between(date(2024, 1, 1), date(2024, 1, 1)).is_err());
        assert!(IngestionWindow::between(date(2024, 2, 1), date(2024, 1, 1)).is_err());
    }

    #[test]
    fn test_end_is_exclusive() {
        let window = IngestionWindow::between(date(2024, 1, 1), date(2024, 1, 10)).unwrap();
        assert!(window.contains(date(2024, 1, 1)));
        assert!(window.contains(date(2024, 1, 9)));
        assert!(!window.contains(date(2024, 1, 10)));
        assert!(!window.contains(date(2023, 12, 31)));
    }
}
