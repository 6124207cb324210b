//! SQLite-based store implementation.

use async_trait::async_trait;
use chrono::NaiveDate;
use pricefeed_core::{DataError, PriceBar, PriceStore, Result, Symbol, SymbolInfo, SymbolRegistry};
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, instrument};

/// Merge statement for one bar; the primary key makes it an atomic upsert.
const UPSERT_PRICE_SQL: &str = "INSERT INTO prices (symbol, date, open, high, low, close, volume)
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
     ON CONFLICT (symbol, date) DO UPDATE
     SET open = excluded.open,
         high = excluded.high,
         low = excluded.low,
         close = excluded.close,
         volume = excluded.volume";

/// SQLite-backed symbol registry and price store.
///
/// One connection is shared behind a mutex. Every operation runs its
/// statements on the blocking pool with `tokio::task::spawn_blocking`, so a
/// caller waiting on a slow or contended database can still be timed out. A
/// batch of bars for one symbol is written in its own transaction.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) a SQLite store at the given path.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or schema creation fails.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path).map_err(storage)?;
        Self::from_connection(conn)
    }

    /// Create an in-memory SQLite store.
    ///
    /// Useful for testing; data is lost when the store is dropped.
    ///
    /// # Errors
    /// Returns an error if schema creation fails.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(storage)?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` against the connection on the blocking pool.
    async fn run<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|e| DataError::Storage(e.to_string()))?;
            f(&mut conn)
        })
        .await
        .map_err(|e| DataError::Storage(format!("SQLite task failed: {}", e)))?
    }

    /// Register a symbol, or update the display name of an existing one.
    ///
    /// # Errors
    /// Returns an error if the write fails.
    #[instrument(skip_all, fields(symbol = %info.symbol))]
    pub async fn register_symbol(&self, info: &SymbolInfo) -> Result<()> {
        let info = info.clone();
        self.run(move |conn| {
            conn.execute(
                "INSERT INTO symbols (symbol, name) VALUES (?1, ?2)
                 ON CONFLICT (symbol) DO UPDATE SET name = excluded.name",
                params![info.symbol.as_str(), info.name],
            )
            .map_err(storage)?;
            Ok(())
        })
        .await?;
        debug!("Registered symbol");
        Ok(())
    }

    /// Remove a symbol and all of its stored prices.
    ///
    /// Returns false if the symbol was not registered.
    ///
    /// # Errors
    /// Returns an error if the delete fails.
    #[instrument(skip_all, fields(symbol = %symbol))]
    pub async fn remove_symbol(&self, symbol: &Symbol) -> Result<bool> {
        let symbol = symbol.clone();
        self.run(move |conn| {
            let deleted = conn
                .execute(
                    "DELETE FROM symbols WHERE symbol = ?1",
                    params![symbol.as_str()],
                )
                .map_err(storage)?;
            Ok(deleted > 0)
        })
        .await
    }

    /// All registered symbols with their names, ordered by symbol.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn symbols(&self) -> Result<Vec<SymbolInfo>> {
        self.run(|conn| {
            let mut stmt = conn
                .prepare("SELECT symbol, name FROM symbols ORDER BY symbol")
                .map_err(storage)?;

            let rows = stmt
                .query_map([], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                })
                .map_err(storage)?;

            rows.map(|row| {
                let (symbol, name) = row.map_err(storage)?;
                Ok(SymbolInfo::new(Symbol::new(symbol), name))
            })
            .collect()
        })
        .await
    }
}

/// Initialize the database schema.
fn initialize_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "PRAGMA foreign_keys = ON;

         CREATE TABLE IF NOT EXISTS symbols (
            symbol TEXT PRIMARY KEY,
            name TEXT NOT NULL
         );

         CREATE TABLE IF NOT EXISTS prices (
            symbol TEXT NOT NULL REFERENCES symbols(symbol) ON DELETE CASCADE,
            date TEXT NOT NULL,
            open REAL NOT NULL,
            high REAL NOT NULL,
            low REAL NOT NULL,
            close REAL NOT NULL,
            volume INTEGER NOT NULL CHECK (volume >= 0),
            PRIMARY KEY (symbol, date)
         );",
    )
    .map_err(storage)?;

    debug!("SQLite store schema initialized");
    Ok(())
}

#[async_trait]
impl SymbolRegistry for SqliteStore {
    #[instrument(skip_all, fields(symbol = %symbol))]
    async fn exists(&self, symbol: &Symbol) -> Result<bool> {
        let symbol = symbol.clone();
        self.run(move |conn| {
            let found = conn
                .query_row(
                    "SELECT 1 FROM symbols WHERE symbol = ?1",
                    params![symbol.as_str()],
                    |row| row.get::<_, i64>(0),
                )
                .optional()
                .map_err(storage)?;
            Ok(found.is_some())
        })
        .await
    }

    #[instrument(skip_all)]
    async fn list_all(&self) -> Result<Vec<Symbol>> {
        let symbols = self
            .run(|conn| {
                let mut stmt = conn
                    .prepare("SELECT symbol FROM symbols ORDER BY symbol")
                    .map_err(storage)?;

                let rows = stmt
                    .query_map([], |row| row.get::<_, String>(0))
                    .map_err(storage)?;

                rows.map(|row| row.map(Symbol::new).map_err(storage))
                    .collect::<Result<Vec<_>>>()
            })
            .await?;
        debug!("Listed {} symbols", symbols.len());
        Ok(symbols)
    }
}

#[async_trait]
impl PriceStore for SqliteStore {
    #[instrument(skip_all, fields(symbol = %bar.symbol, date = %bar.date))]
    async fn upsert(&self, bar: &PriceBar) -> Result<()> {
        let bar = bar.clone();
        self.run(move |conn| execute_upsert(conn, &bar)).await
    }

    #[instrument(skip_all, fields(count = bars.len()))]
    async fn upsert_many(&self, bars: &[PriceBar]) -> Result<usize> {
        let bars = bars.to_vec();
        let count = self
            .run(move |conn| {
                let tx = conn.transaction().map_err(storage)?;

                for bar in &bars {
                    execute_upsert(&tx, bar)?;
                }

                tx.commit().map_err(storage)?;
                Ok(bars.len())
            })
            .await?;
        debug!("Upserted {} price rows", count);
        Ok(count)
    }

    #[instrument(skip_all, fields(symbol = %symbol))]
    async fn bars(
        &self,
        symbol: &Symbol,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PriceBar>> {
        let symbol = symbol.clone();
        let bars = self
            .run(move |conn| {
                let mut stmt = conn
                    .prepare(
                        "SELECT date, open, high, low, close, volume
                         FROM prices
                         WHERE symbol = ?1 AND date >= ?2 AND date <= ?3
                         ORDER BY date ASC",
                    )
                    .map_err(storage)?;

                let rows = stmt
                    .query_map(
                        params![symbol.as_str(), start.to_string(), end.to_string()],
                        |row| {
                            Ok((
                                row.get::<_, String>(0)?,
                                row.get::<_, f64>(1)?,
                                row.get::<_, f64>(2)?,
                                row.get::<_, f64>(3)?,
                                row.get::<_, f64>(4)?,
                                row.get::<_, i64>(5)?,
                            ))
                        },
                    )
                    .map_err(storage)?;

                let mut bars = Vec::new();
                for row in rows {
                    let (date, open, high, low, close, volume) = row.map_err(storage)?;
                    let date = NaiveDate::parse_from_str(&date, "%Y-%m-%d").map_err(|e| {
                        DataError::Parse(format!("Invalid stored date {}: {}", date, e))
                    })?;
                    let volume = u64::try_from(volume).map_err(|_| {
                        DataError::Parse(format!("Negative stored volume {}", volume))
                    })?;
                    bars.push(PriceBar::new(
                        symbol.clone(),
                        date,
                        open,
                        high,
                        low,
                        close,
                        volume,
                    ));
                }
                Ok(bars)
            })
            .await?;

        debug!("Found {} stored price rows", bars.len());
        Ok(bars)
    }
}

fn execute_upsert(conn: &Connection, bar: &PriceBar) -> Result<()> {
    let volume = i64::try_from(bar.volume).map_err(|_| {
        DataError::Storage(format!("Volume {} does not fit in an INTEGER", bar.volume))
    })?;

    conn.execute(
        UPSERT_PRICE_SQL,
        params![
            bar.symbol.as_str(),
            bar.date.to_string(),
            bar.open,
            bar.high,
            bar.low,
            bar.close,
            volume
        ],
    )
    .map_err(storage)?;
    Ok(())
}

fn storage(e: rusqlite::Error) -> DataError {
    DataError::Storage(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn bar(symbol: &str, day: u32, close: f64) -> PriceBar {
        PriceBar::new(
            Symbol::new(symbol),
            date(2024, 1, day),
            close - 1.0,
            close + 1.0,
            close - 2.0,
            close,
            1_000_000,
        )
    }

    async fn store_with(symbols: &[&str]) -> SqliteStore {
        let store = SqliteStore::in_memory().unwrap();
        for symbol in symbols {
            store
                .register_symbol(&SymbolInfo::new(Symbol::new(*symbol), *symbol))
                .await
                .unwrap();
        }
        store
    }

    #[tokio::test]
    async fn test_sqlite_store_initialization() {
        let store = SqliteStore::in_memory();
        assert!(store.is_ok());
    }

    #[tokio::test]
    async fn test_registry() {
        let store = store_with(&["MSFT", "AAPL"]).await;

        assert!(store.exists(&Symbol::new("aapl")).await.unwrap());
        assert!(!store.exists(&Symbol::new("ZZZZ")).await.unwrap());
        assert_eq!(
            store.list_all().await.unwrap(),
            vec![Symbol::new("AAPL"), Symbol::new("MSFT")]
        );

        // Re-registering renames instead of failing
        store
            .register_symbol(&SymbolInfo::new(Symbol::new("AAPL"), "Apple Inc."))
            .await
            .unwrap();
        let symbols = store.symbols().await.unwrap();
        assert_eq!(symbols.len(), 2);
        assert_eq!(symbols[0].name, "Apple Inc.");
    }

    #[tokio::test]
    async fn test_upsert_overwrites_without_duplicates() {
        let store = store_with(&["AAPL"]).await;
        let symbol = Symbol::new("AAPL");

        store.upsert(&bar("AAPL", 2, 185.0)).await.unwrap();
        store.upsert(&bar("AAPL", 2, 190.5)).await.unwrap();

        let bars = store
            .bars(&symbol, date(2024, 1, 1), date(2024, 1, 31))
            .await
            .unwrap();
        assert_eq!(bars.len(), 1);
        assert_eq!(bars[0].close, 190.5);
        assert_eq!(bars[0].open, 189.5);
    }

    #[tokio::test]
    async fn test_upsert_many_and_range() {
        let store = store_with(&["AAPL"]).await;
        let symbol = Symbol::new("AAPL");
        let batch = vec![bar("AAPL", 2, 185.0), bar("AAPL", 3, 184.0), bar("AAPL", 4, 182.0)];

        assert_eq!(store.upsert_many(&batch).await.unwrap(), 3);
        // Same batch again is idempotent
        assert_eq!(store.upsert_many(&batch).await.unwrap(), 3);

        let all = store
            .bars(&symbol, date(2024, 1, 1), date(2024, 1, 31))
            .await
            .unwrap();
        assert_eq!(all, batch);

        let inclusive = store
            .bars(&symbol, date(2024, 1, 3), date(2024, 1, 4))
            .await
            .unwrap();
        assert_eq!(inclusive.len(), 2);
    }

    #[tokio::test]
    async fn test_unregistered_symbol_rejected() {
        let store = store_with(&[]).await;

        let err = store.upsert(&bar("ZZZZ", 2, 10.0)).await.unwrap_err();
        assert!(matches!(err, DataError::Storage(_)));

        // A failing row rolls back the whole batch
        store
            .register_symbol(&SymbolInfo::new(Symbol::new("AAPL"), "Apple"))
            .await
            .unwrap();
        let result = store
            .upsert_many(&[bar("AAPL", 2, 185.0), bar("ZZZZ", 2, 10.0)])
            .await;
        assert!(result.is_err());
        let bars = store
            .bars(&Symbol::new("AAPL"), date(2024, 1, 1), date(2024, 1, 31))
            .await
            .unwrap();
        assert!(bars.is_empty());
    }

    #[tokio::test]
    async fn test_busy_connection_does_not_block_timeouts() {
        let store = store_with(&["AAPL"]).await;
        let conn = Arc::clone(&store.conn);
        let (locked_tx, locked_rx) = std::sync::mpsc::channel();

        let holder = std::thread::spawn(move || {
            let _guard = conn.lock().unwrap();
            locked_tx.send(()).unwrap();
            std::thread::sleep(Duration::from_millis(500));
        });
        locked_rx.recv().unwrap();

        let started = Instant::now();
        let result =
            tokio::time::timeout(Duration::from_millis(50), store.exists(&Symbol::new("AAPL")))
                .await;
        assert!(result.is_err());
        assert!(started.elapsed() < Duration::from_millis(400));

        holder.join().unwrap();
        assert!(store.exists(&Symbol::new("AAPL")).await.unwrap());
    }

    #[tokio::test]
    async fn test_remove_symbol_cascades() {
        let store = store_with(&["AAPL"]).await;
        let symbol = Symbol::new("AAPL");
        store.upsert(&bar("AAPL", 2, 185.0)).await.unwrap();

        assert!(store.remove_symbol(&symbol).await.unwrap());
        assert!(!store.remove_symbol(&symbol).await.unwrap());
        assert!(!store.exists(&symbol).await.unwrap());

        store
            .register_symbol(&SymbolInfo::new(symbol.clone(), "Apple"))
            .await
            .unwrap();
        let bars = store
            .bars(&symbol, date(2024, 1, 1), date(2024, 1, 31))
            .await
            .unwrap();
        assert!(bars.is_empty());
    }
}
