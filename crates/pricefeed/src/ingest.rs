//! Single-symbol and batch ingestion.

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex, PoisonError},
};

use chrono::{Local, NaiveDate};
use futures::stream::{self, StreamExt};
use pricefeed_core::{IngestionWindow, PriceDataProvider, PriceStore, Symbol, SymbolRegistry};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::{
    config::IngestConfig,
    error::IngestError,
    fetch::{PriceSeriesFetcher, with_timeout},
    outcome::{BatchReport, SymbolOutcome},
    validate::validate_frame,
};

/// Pulls daily bars from a provider and upserts them into a store.
///
/// The registry and store are usually the same [`SqliteStore`] behind two
/// `Arc`s. Clones share the per-symbol locks, so a symbol is never ingested
/// by two tasks at once even across clones.
///
/// ```rust,ignore
/// let store = Arc::new(SqliteStore::new("pricefeed.db")?);
/// let ingestor = Ingestor::new(store.clone(), store, Arc::new(YahooProvider::new()?));
///
/// let outcome = ingestor.ingest_one_symbol("AAPL", None).await;
/// let report = ingestor.ingest_all_symbols(Some(5)).await;
/// ```
///
/// [`SqliteStore`]: pricefeed_store::SqliteStore
#[derive(Clone, Debug)]
pub struct Ingestor {
    registry: Arc<dyn SymbolRegistry>,
    store: Arc<dyn PriceStore>,
    fetcher: PriceSeriesFetcher,
    config: IngestConfig,
    in_flight: Arc<SymbolLocks>,
}

impl Ingestor {
    /// Create an ingestor with the default [`IngestConfig`].
    #[must_use]
    pub fn new(
        registry: Arc<dyn SymbolRegistry>,
        store: Arc<dyn PriceStore>,
        provider: Arc<dyn PriceDataProvider>,
    ) -> Self {
        Self::with_config(registry, store, provider, IngestConfig::default())
    }

    /// Create an ingestor with explicit settings.
    #[must_use]
    pub fn with_config(
        registry: Arc<dyn SymbolRegistry>,
        store: Arc<dyn PriceStore>,
        provider: Arc<dyn PriceDataProvider>,
        config: IngestConfig,
    ) -> Self {
        let fetcher = PriceSeriesFetcher::new(provider, config.fetch_timeout, config.retry);
        Self {
            registry,
            store,
            fetcher,
            config,
            in_flight: Arc::default(),
        }
    }

    /// The settings this ingestor runs with.
    #[must_use]
    pub const fn config(&self) -> &IngestConfig {
        &self.config
    }

    /// Ingest one symbol over the trailing window ending today.
    ///
    /// The ticker is normalized first. `lookback_days` falls back to the
    /// configured default.
    pub async fn ingest_one_symbol(&self, symbol: &str, lookback_days: Option<u32>) -> SymbolOutcome {
        let lookback = lookback_days.unwrap_or(self.config.default_lookback_days);

        // A malformed ticker can never have been registered
        let symbol = match Symbol::parse(symbol) {
            Ok(symbol) => symbol,
            Err(_) => {
                let symbol = Symbol::new(symbol);
                let error = IngestError::NotRegistered(symbol.clone());
                return SymbolOutcome::failed(symbol, i64::from(lookback), &error);
            }
        };

        match IngestionWindow::trailing(today(), lookback) {
            Ok(window) => self.ingest_symbol_window(&symbol, window).await,
            Err(e) => SymbolOutcome::failed(
                symbol,
                i64::from(lookback),
                &IngestError::InvalidWindow(e),
            ),
        }
    }

    /// Ingest one symbol over an explicit window.
    #[instrument(skip_all, fields(symbol = %symbol, window = %window))]
    pub async fn ingest_symbol_window(
        &self,
        symbol: &Symbol,
        window: IngestionWindow,
    ) -> SymbolOutcome {
        let _guard = self.in_flight.acquire(symbol).await;

        match self.try_ingest(symbol, &window).await {
            Ok(rows) => {
                info!(rows, "Ingested {} rows for {}", rows, symbol);
                SymbolOutcome::ok(symbol.clone(), rows, window.days())
            }
            Err(e) => {
                warn!(error = %e, "Ingestion failed for {}", symbol);
                SymbolOutcome::failed(symbol.clone(), window.days(), &e)
            }
        }
    }

    async fn try_ingest(
        &self,
        symbol: &Symbol,
        window: &IngestionWindow,
    ) -> Result<usize, IngestError> {
        let storage = |source| IngestError::Storage {
            symbol: symbol.clone(),
            source,
        };
        let provider = |source| IngestError::Provider {
            symbol: symbol.clone(),
            source,
        };

        let registered = with_timeout(
            "registry lookup",
            self.config.store_timeout,
            self.registry.exists(symbol),
        )
        .await
        .map_err(storage)?;
        if !registered {
            return Err(IngestError::NotRegistered(symbol.clone()));
        }

        let df = self.fetcher.fetch(symbol, window).await.map_err(provider)?;
        if df.height() == 0 {
            return Err(IngestError::EmptyResult {
                symbol: symbol.clone(),
                start: window.start(),
                end: window.end(),
            });
        }

        let rows = validate_frame(symbol, window, &df).map_err(provider)?;
        if rows.skipped > 0 {
            debug!(
                fetched = df.height(),
                skipped = rows.skipped,
                "Skipped malformed rows"
            );
        }

        with_timeout(
            "price upsert",
            self.config.store_timeout,
            self.store.upsert_many(&rows.bars),
        )
        .await
        .map_err(storage)
    }

    /// Ingest every registered symbol over the trailing window ending today.
    pub async fn ingest_all_symbols(&self, lookback_days: Option<u32>) -> BatchReport {
        self.ingest_all_symbols_until(lookback_days, CancellationToken::new())
            .await
    }

    /// Like [`ingest_all_symbols`](Self::ingest_all_symbols), stopping early
    /// when `cancel` fires.
    pub async fn ingest_all_symbols_until(
        &self,
        lookback_days: Option<u32>,
        cancel: CancellationToken,
    ) -> BatchReport {
        let lookback = lookback_days.unwrap_or(self.config.default_lookback_days);
        match IngestionWindow::trailing(today(), lookback) {
            Ok(window) => self.ingest_all_in_window(window, cancel).await,
            Err(e) => batch_failed(&IngestError::InvalidWindow(e)),
        }
    }

    /// Ingest every registered symbol over one shared window.
    ///
    /// Symbols run through a pool of at most `concurrency` tasks. A failure
    /// is recorded against its symbol and the batch moves on. When `cancel`
    /// fires, unfinished symbols are dropped and the report covers the ones
    /// that completed.
    #[instrument(skip_all, fields(window = %window))]
    pub async fn ingest_all_in_window(
        &self,
        window: IngestionWindow,
        cancel: CancellationToken,
    ) -> BatchReport {
        let mut symbols = match with_timeout(
            "symbol listing",
            self.config.store_timeout,
            self.registry.list_all(),
        )
        .await
        {
            Ok(symbols) => symbols,
            Err(e) => return batch_failed(&IngestError::Registry(e)),
        };

        let mut seen = HashSet::new();
        symbols.retain(|s| seen.insert(s.clone()));
        if symbols.is_empty() {
            return batch_failed(&IngestError::NoSymbols);
        }

        let total = symbols.len();
        let concurrency = self.config.concurrency.max(1);
        info!(symbols = total, concurrency, "Starting batch ingestion");

        let outcomes: Vec<SymbolOutcome> = stream::iter(&symbols)
            .map(|symbol| self.ingest_symbol_window(symbol, window))
            .buffer_unordered(concurrency)
            .take_until(cancel.cancelled())
            .collect()
            .await;

        let cancelled = outcomes.len() < total;
        if cancelled {
            warn!(
                completed = outcomes.len(),
                total, "Batch cancelled before every symbol finished"
            );
        }

        let report = BatchReport::from_outcomes(window.days(), &outcomes, cancelled);
        report.log_summary();
        report
    }
}

fn batch_failed(error: &IngestError) -> BatchReport {
    warn!(error = %error, "Batch ingestion could not start");
    BatchReport::failed(error)
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// One async lock per symbol.
///
/// An entry lives only while some task holds or waits for its lock.
#[derive(Debug, Default)]
struct SymbolLocks {
    locks: Mutex<HashMap<Symbol, Arc<AsyncMutex<()>>>>,
}

impl SymbolLocks {
    async fn acquire(&self, symbol: &Symbol) -> SymbolGuard<'_> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(locks.entry(symbol.clone()).or_default())
        };
        SymbolGuard {
            locks: self,
            symbol: symbol.clone(),
            guard: Some(lock.lock_owned().await),
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Held lock for one symbol. Dropping it prunes the map entry once no other
/// task holds or waits for the same symbol.
#[derive(Debug)]
struct SymbolGuard<'a> {
    locks: &'a SymbolLocks,
    symbol: Symbol,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for SymbolGuard<'_> {
    fn drop(&mut self) {
        // Waiters clone the Arc under the map lock, so the count cannot grow
        // while it is held here.
        let mut locks = self.locks.locks.lock().unwrap_or_else(PoisonError::into_inner);
        self.guard.take();
        if locks
            .get(&self.symbol)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&self.symbol);
        }
    }
}
