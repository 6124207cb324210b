#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/pricefeed/pricefeed/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Storage backends for symbols and daily price bars.
//!
//! This crate provides implementations of the [`SymbolRegistry`] and
//! [`PriceStore`] traits from `pricefeed-core`:
//!
//! - [`SqliteStore`] - Persistent SQLite store (default, requires `sqlite` feature)
//! - [`InMemoryStore`] - In-memory store for testing

/// In-memory store implementation.
pub mod memory;

/// SQLite-based store implementation.
#[cfg(feature = "sqlite")]
pub mod sqlite;

// Re-export the traits for convenience
pub use pricefeed_core::{PriceStore, SymbolRegistry};

pub use memory::InMemoryStore;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;
