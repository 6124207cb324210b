//! Ingestion failures.
//!
//! The `Display` text of each [`IngestError`] is the `details` string reported
//! to callers, so the messages are part of the public contract.

use chrono::NaiveDate;
use pricefeed_core::{DataError, Symbol};
use thiserror::Error;

/// Why ingesting a symbol (or a batch) did not succeed.
#[derive(Error, Debug)]
pub enum IngestError {
    /// The symbol is not in the registry; nothing was fetched.
    #[error("Symbol {0} not found in database.")]
    NotRegistered(Symbol),

    /// The provider call failed, timed out, or returned an unreadable series.
    #[error("Error fetching data for {symbol}: {source}")]
    Provider {
        /// Symbol being fetched.
        symbol: Symbol,
        /// Underlying provider error.
        #[source]
        source: DataError,
    },

    /// The provider returned zero rows for the window.
    #[error("No historical data found for {symbol} from {start} to {end}.")]
    EmptyResult {
        /// Symbol being fetched.
        symbol: Symbol,
        /// Window start.
        start: NaiveDate,
        /// Exclusive window end.
        end: NaiveDate,
    },

    /// The registry lookup or the upsert failed.
    #[error("Error storing data for {symbol}: {source}")]
    Storage {
        /// Symbol being written.
        symbol: Symbol,
        /// Underlying store error.
        #[source]
        source: DataError,
    },

    /// The registry has no symbols to ingest.
    #[error("No symbols found in database.")]
    NoSymbols,

    /// Listing the registry failed.
    #[error("Error listing symbols: {0}")]
    Registry(#[source] DataError),

    /// The requested lookback or date range is not usable.
    #[error("Invalid ingestion window: {0}")]
    InvalidWindow(#[source] DataError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_details_messages() {
        let symbol = Symbol::new("ZZZZ");
        assert_eq!(
            IngestError::NotRegistered(symbol.clone()).to_string(),
            "Symbol ZZZZ not found in database."
        );
        assert_eq!(
            IngestError::EmptyResult {
                symbol: symbol.clone(),
                start: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
                end: NaiveDate::from_ymd_opt(2024, 3, 21).unwrap(),
            }
            .to_string(),
            "No historical data found for ZZZZ from 2024-03-01 to 2024-03-21."
        );
        assert_eq!(
            IngestError::Provider {
                symbol,
                source: DataError::Network("HTTP 502".into()),
            }
            .to_string(),
            "Error fetching data for ZZZZ: Network error: HTTP 502"
        );
        assert_eq!(
            IngestError::NoSymbols.to_string(),
            "No symbols found in database."
        );
    }
}
