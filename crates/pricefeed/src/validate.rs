//! Row validation between the provider frame and the price store.
//!
//! The provider hands back a DataFrame whose OHLCV columns may contain nulls.
//! [`validate_frame`] turns each row into a [`RawBar`], checks it with
//! [`validate`], and keeps only the bars that can be written. Rejected rows
//! are logged and counted, never raised.

use chrono::NaiveDate;
use polars::prelude::*;
use pricefeed_core::{DataError, IngestionWindow, PriceBar, Result, Symbol};
use thiserror::Error;
use tracing::warn;

/// One provider row before validation.
#[derive(Clone, Debug, PartialEq)]
pub struct RawBar {
    /// Trading date, if present and readable.
    pub date: Option<NaiveDate>,
    /// Opening price.
    pub open: Option<f64>,
    /// Highest price.
    pub high: Option<f64>,
    /// Lowest price.
    pub low: Option<f64>,
    /// Closing price.
    pub close: Option<f64>,
    /// Volume as reported; coerced to an integer by [`validate`].
    pub volume: Option<f64>,
}

/// Reason a row was skipped.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Rejection {
    /// A required field is null, NaN or infinite.
    #[error("missing {0}")]
    Missing(&'static str),
    /// Volume is negative, not finite, or too large for the store.
    #[error("volume {0} is not a storable non-negative integer")]
    InvalidVolume(f64),
    /// The date lies outside the requested window.
    #[error("date {0} is outside the requested window")]
    OutsideWindow(NaiveDate),
}

/// Bars that passed validation, plus how many rows were skipped.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ValidatedRows {
    /// Bars ready to upsert, in provider order.
    pub bars: Vec<PriceBar>,
    /// Rows rejected by [`validate`].
    pub skipped: usize,
}

/// Check one row and build the bar to store.
///
/// # Errors
/// Returns the [`Rejection`] explaining why the row must be skipped.
pub fn validate(
    symbol: &Symbol,
    window: &IngestionWindow,
    raw: &RawBar,
) -> std::result::Result<PriceBar, Rejection> {
    let date = raw.date.ok_or(Rejection::Missing("date"))?;
    let open = price(raw.open, "open")?;
    let high = price(raw.high, "high")?;
    let low = price(raw.low, "low")?;
    let close = price(raw.close, "close")?;
    let volume = volume(raw.volume)?;

    if !window.contains(date) {
        return Err(Rejection::OutsideWindow(date));
    }

    Ok(PriceBar::new(
        symbol.clone(),
        date,
        open,
        high,
        low,
        close,
        volume,
    ))
}

fn price(value: Option<f64>, field: &'static str) -> std::result::Result<f64, Rejection> {
    match value {
        Some(v) if v.is_finite() => Ok(v),
        _ => Err(Rejection::Missing(field)),
    }
}

const MAX_VOLUME: f64 = i64::MAX as f64;

fn volume(value: Option<f64>) -> std::result::Result<u64, Rejection> {
    let v = value.ok_or(Rejection::Missing("volume"))?;
    // Stores keep volume as a signed 64-bit INTEGER
    if !v.is_finite() || v < 0.0 || v >= MAX_VOLUME {
        return Err(Rejection::InvalidVolume(v));
    }
    // Fractional volumes are truncated toward zero
    Ok(v.trunc() as u64)
}

/// Read every row of a provider frame.
///
/// # Errors
/// Returns [`DataError::Parse`] if a required column is missing or has a type
/// that cannot be read as dates or numbers.
pub fn raw_bars(df: &DataFrame) -> Result<Vec<RawBar>> {
    let dates = df
        .column("date")
        .map_err(parse)?
        .cast(&DataType::String)
        .map_err(parse)?;
    let dates = dates.str().map_err(parse)?;
    let opens = float_column(df, "open")?;
    let highs = float_column(df, "high")?;
    let lows = float_column(df, "low")?;
    let closes = float_column(df, "close")?;
    let volumes = float_column(df, "volume")?;

    Ok((0..df.height())
        .map(|i| RawBar {
            date: dates.get(i).and_then(parse_date),
            open: opens.get(i),
            high: highs.get(i),
            low: lows.get(i),
            close: closes.get(i),
            volume: volumes.get(i),
        })
        .collect())
}

/// Validate every row of a provider frame for `symbol` over `window`.
///
/// # Errors
/// Returns [`DataError::Parse`] if the frame itself is unreadable; individual
/// bad rows are skipped instead.
pub fn validate_frame(
    symbol: &Symbol,
    window: &IngestionWindow,
    df: &DataFrame,
) -> Result<ValidatedRows> {
    let mut rows = ValidatedRows::default();

    for raw in raw_bars(df)? {
        match validate(symbol, window, &raw) {
            Ok(bar) => rows.bars.push(bar),
            Err(reason) => {
                warn!(
                    symbol = %symbol,
                    date = ?raw.date,
                    %reason,
                    "Skipping row"
                );
                rows.skipped += 1;
            }
        }
    }

    Ok(rows)
}

fn float_column(df: &DataFrame, name: &str) -> Result<Float64Chunked> {
    let column = df
        .column(name)
        .map_err(parse)?
        .cast(&DataType::Float64)
        .map_err(parse)?;
    let values = column.f64().map_err(parse)?.clone();
    Ok(values)
}

/// Dates arrive as `YYYY-MM-DD`, or with a time part when the provider
/// used a datetime column.
fn parse_date(s: &str) -> Option<NaiveDate> {
    let day = s.get(..10).unwrap_or(s);
    NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
}

fn parse(e: PolarsError) -> DataError {
    DataError::Parse(e.to_string())
}
