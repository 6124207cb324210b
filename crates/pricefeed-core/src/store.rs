//! Registry and price store traits.
//!
//! [`SymbolRegistry`] is the read-only view of registered symbols the
//! ingestion pipeline needs, and [`PriceStore`] is the keyed upsert target for
//! validated daily bars.

use async_trait::async_trait;
use chrono::NaiveDate;
use std::fmt::Debug;

use crate::{
    error::Result,
    types::{PriceBar, Symbol},
};

/// Read-only view of the symbol registry.
#[async_trait]
pub trait SymbolRegistry: Send + Sync + Debug {
    /// Returns true if `symbol` is registered.
    async fn exists(&self, symbol: &Symbol) -> Result<bool>;

    /// Lists every registered symbol.
    async fn list_all(&self) -> Result<Vec<Symbol>>;
}

/// Durable storage for daily price bars keyed by (symbol, date).
#[async_trait]
pub trait PriceStore: Send + Sync + Debug {
    /// Inserts `bar`, or overwrites open/high/low/close/volume of the existing
    /// bar with the same (symbol, date).
    ///
    /// Implementations must merge in a single atomic operation.
    async fn upsert(&self, bar: &PriceBar) -> Result<()>;

    /// Upserts a batch of bars as one unit of work and returns how many were
    /// written.
    ///
    /// Default implementation calls `upsert` for each bar. Stores with
    /// transactions should override it so the batch commits together.
    async fn upsert_many(&self, bars: &[PriceBar]) -> Result<usize> {
        for bar in bars {
            self.upsert(bar).await?;
        }
        Ok(bars.len())
    }

    /// Returns the stored bars for `symbol` with `start <= date <= end`,
    /// ordered by date.
    async fn bars(
        &self,
        symbol: &Symbol,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PriceBar>>;
}
