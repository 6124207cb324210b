#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/pricefeed/pricefeed/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Core traits and types for the pricefeed ingestion pipeline.
//!
//! - [`DataProvider`](provider::DataProvider) - Base trait for market-data sources
//! - [`PriceDataProvider`](provider::PriceDataProvider) - Daily OHLCV series
//! - [`SymbolRegistry`](store::SymbolRegistry) - Read-only view of registered symbols
//! - [`PriceStore`](store::PriceStore) - Keyed upsert of daily price bars

/// Error types for data operations.
pub mod error;
/// Provider traits for fetching market data.
pub mod provider;
/// Registry and price store traits.
pub mod store;
/// Core data types (Symbol, PriceBar, IngestionWindow).
pub mod types;

// Re-export commonly used items at crate root
pub use error::{DataError, Result};
pub use provider::{DataProvider, PriceDataProvider};
pub use store::{PriceStore, SymbolRegistry};
pub use types::{DEFAULT_LOOKBACK_DAYS, IngestionWindow, PriceBar, Symbol, SymbolInfo};
