//! In-memory store implementation.

use async_trait::async_trait;
use chrono::NaiveDate;
use pricefeed_core::{PriceBar, PriceStore, Result, Symbol, SymbolInfo, SymbolRegistry};
use std::collections::BTreeMap;
use tokio::sync::RwLock;
use tracing::{debug, instrument};

/// Simple in-memory store for testing and development.
///
/// Data is stored in `RwLock`-protected `BTreeMap`s and is lost when the
/// store is dropped. Removing a symbol also removes its prices, matching the
/// SQLite schema.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    symbols: RwLock<BTreeMap<Symbol, String>>,
    prices: RwLock<BTreeMap<(Symbol, NaiveDate), PriceBar>>,
}

impl InMemoryStore {
    /// Create a new empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a symbol, or update the display name of an existing one.
    ///
    /// # Errors
    /// Never fails; the signature matches the SQLite store.
    pub async fn register_symbol(&self, info: &SymbolInfo) -> Result<()> {
        self.symbols
            .write()
            .await
            .insert(info.symbol.clone(), info.name.clone());
        Ok(())
    }

    /// Remove a symbol and all of its stored prices.
    ///
    /// Returns false if the symbol was not registered.
    ///
    /// # Errors
    /// Never fails; the signature matches the SQLite store.
    pub async fn remove_symbol(&self, symbol: &Symbol) -> Result<bool> {
        let removed = self.symbols.write().await.remove(symbol).is_some();
        if removed {
            self.prices.write().await.retain(|(s, _), _| s != symbol);
        }
        Ok(removed)
    }

    /// All registered symbols with their names, ordered by symbol.
    ///
    /// # Errors
    /// Never fails; the signature matches the SQLite store.
    pub async fn symbols(&self) -> Result<Vec<SymbolInfo>> {
        Ok(self
            .symbols
            .read()
            .await
            .iter()
            .map(|(symbol, name)| SymbolInfo::new(symbol.clone(), name.clone()))
            .collect())
    }

    /// Total number of stored bars across all symbols.
    pub async fn price_count(&self) -> usize {
        self.prices.read().await.len()
    }
}

#[async_trait]
impl SymbolRegistry for InMemoryStore {
    async fn exists(&self, symbol: &Symbol) -> Result<bool> {
        Ok(self.symbols.read().await.contains_key(symbol))
    }

    async fn list_all(&self) -> Result<Vec<Symbol>> {
        Ok(self.symbols.read().await.keys().cloned().collect())
    }
}

#[async_trait]
impl PriceStore for InMemoryStore {
    #[instrument(skip(self, bar), fields(symbol = %bar.symbol, date = %bar.date))]
    async fn upsert(&self, bar: &PriceBar) -> Result<()> {
        self.prices
            .write()
            .await
            .insert((bar.symbol.clone(), bar.date), bar.clone());
        Ok(())
    }

    #[instrument(skip(self, bars), fields(count = bars.len()))]
    async fn upsert_many(&self, bars: &[PriceBar]) -> Result<usize> {
        let mut prices = self.prices.write().await;
        for bar in bars {
            prices.insert((bar.symbol.clone(), bar.date), bar.clone());
        }
        debug!("Upserted {} price rows", bars.len());
        Ok(bars.len())
    }

    async fn bars(
        &self,
        symbol: &Symbol,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PriceBar>> {
        if start > end {
            return Ok(Vec::new());
        }
        let prices = self.prices.read().await;
        Ok(prices
            .range((symbol.clone(), start)..=(symbol.clone(), end))
            .map(|(_, bar)| bar.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn bar(symbol: &str, day: u32, close: f64) -> PriceBar {
        PriceBar::new(Symbol::new(symbol), date(day), close, close, close, close, 100)
    }

    #[tokio::test]
    async fn test_registry() {
        let store = InMemoryStore::new();
        store
            .register_symbol(&SymbolInfo::new(Symbol::new("MSFT"), "Microsoft"))
            .await
            .unwrap();
        store
            .register_symbol(&SymbolInfo::new(Symbol::new("AAPL"), "Apple"))
            .await
            .unwrap();

        assert!(store.exists(&Symbol::new("AAPL")).await.unwrap());
        assert!(!store.exists(&Symbol::new("ZZZZ")).await.unwrap());
        assert_eq!(
            store.list_all().await.unwrap(),
            vec![Symbol::new("AAPL"), Symbol::new("MSFT")]
        );
    }

    #[tokio::test]
    async fn test_upsert_overwrites() {
        let store = InMemoryStore::new();
        store.upsert(&bar("AAPL", 2, 185.0)).await.unwrap();
        store.upsert(&bar("AAPL", 2, 190.0)).await.unwrap();

        assert_eq!(store.price_count().await, 1);
        let bars = store
            .bars(&Symbol::new("AAPL"), date(1), date(31))
            .await
            .unwrap();
        assert_eq!(bars[0].close, 190.0);
    }

    #[tokio::test]
    async fn test_range_is_per_symbol_and_inclusive() {
        let store = InMemoryStore::new();
        store
            .upsert_many(&[
                bar("AAPL", 2, 1.0),
                bar("AAPL", 3, 2.0),
                bar("AAPL", 4, 3.0),
                bar("MSFT", 3, 4.0),
            ])
            .await
            .unwrap();

        let bars = store
            .bars(&Symbol::new("AAPL"), date(3), date(4))
            .await
            .unwrap();
        assert_eq!(bars.len(), 2);
        assert!(bars.iter().all(|b| b.symbol.as_str() == "AAPL"));
    }

    #[tokio::test]
    async fn test_remove_symbol_drops_prices() {
        let store = InMemoryStore::new();
        let symbol = Symbol::new("AAPL");
        store
            .register_symbol(&SymbolInfo::new(symbol.clone(), "Apple"))
            .await
            .unwrap();
        store.upsert(&bar("AAPL", 2, 1.0)).await.unwrap();
        store.upsert(&bar("MSFT", 2, 1.0)).await.unwrap();

        assert!(store.remove_symbol(&symbol).await.unwrap());
        assert_eq!(store.price_count().await, 1);
        assert!(store.symbols().await.unwrap().is_empty());
    }
}
