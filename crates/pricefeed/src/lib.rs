#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/pricefeed/pricefeed/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Daily OHLCV ingestion pipeline.
//!
//! This crate wires a [`PriceDataProvider`] to a [`SymbolRegistry`] and a
//! [`PriceStore`] through the [`Ingestor`], and re-exports the core types,
//! the store backends and the provider implementations.
//!
//! # Features
//!
//! - `yahoo` - Yahoo Finance provider (default)
//! - `sqlite` - SQLite-backed store (default)
//!
//! # Example
//!
//! ```rust,ignore
//! use pricefeed::{Ingestor, SqliteStore, YahooProvider};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> pricefeed::Result<()> {
//!     let store = Arc::new(SqliteStore::new("pricefeed.db")?);
//!     let ingestor = Ingestor::new(store.clone(), store, Arc::new(YahooProvider::new()?));
//!
//!     let report = ingestor.ingest_all_symbols(None).await;
//!     println!("{} of {} symbols ingested", report.succeeded, report.processed);
//!
//!     Ok(())
//! }
//! ```

// Core types and traits
pub use pricefeed_core::{
    DEFAULT_LOOKBACK_DAYS, DataError, DataProvider, IngestionWindow, PriceBar, PriceDataProvider,
    PriceStore, Result, Symbol, SymbolInfo, SymbolRegistry,
};

// Stores
pub use pricefeed_store::InMemoryStore;
#[cfg(feature = "sqlite")]
pub use pricefeed_store::SqliteStore;

// Providers
#[cfg(feature = "yahoo")]
pub use pricefeed_yahoo::YahooProvider;

pub use tokio_util::sync::CancellationToken;

mod config;
pub use config::{IngestConfig, RetryPolicy};

mod error;
pub use error::IngestError;

mod fetch;
pub use fetch::PriceSeriesFetcher;

mod ingest;
pub use ingest::Ingestor;

mod outcome;
pub use outcome::{BatchReport, Status, SymbolOutcome};

pub mod schedule;

pub mod validate;

#[cfg(test)]
mod test_support;
