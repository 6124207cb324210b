//! Test doubles shared by the pipeline tests.

use std::{
    collections::{HashMap, VecDeque},
    sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use chrono::NaiveDate;
use polars::prelude::*;
use pricefeed_core::{
    DataError, DataProvider, PriceBar, PriceDataProvider, PriceStore, Result, Symbol, SymbolInfo,
    SymbolRegistry,
};
use pricefeed_store::InMemoryStore;
use tokio_util::sync::CancellationToken;

/// One scripted provider response.
#[derive(Clone, Debug)]
pub(crate) enum Step {
    Bars(DataFrame),
    Fail(String),
    NotFound,
    Hang,
    Slow(DataFrame, Duration),
}

/// Provider that replays per-symbol scripts and records how it was called.
///
/// The last step of a script repeats once the others are used up. Symbols
/// without a script get an empty frame.
#[derive(Debug, Default)]
pub(crate) struct ScriptedProvider {
    scripts: Mutex<HashMap<Symbol, VecDeque<Step>>>,
    requests: Mutex<Vec<(Symbol, NaiveDate, NaiveDate)>>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    cancel_on_call: Mutex<Option<CancellationToken>>,
}

impl ScriptedProvider {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn script(&self, symbol: &str, steps: Vec<Step>) {
        self.scripts
            .lock()
            .unwrap()
            .insert(Symbol::new(symbol), steps.into());
    }

    /// Cancel `token` whenever a fetch starts.
    pub(crate) fn cancel_on_call(&self, token: CancellationToken) {
        *self.cancel_on_call.lock().unwrap() = Some(token);
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub(crate) fn requests(&self) -> Vec<(Symbol, NaiveDate, NaiveDate)> {
        self.requests.lock().unwrap().clone()
    }

    fn next_step(&self, symbol: &Symbol) -> Step {
        let mut scripts = self.scripts.lock().unwrap();
        match scripts.get_mut(symbol) {
            Some(steps) if steps.len() > 1 => steps.pop_front().unwrap(),
            Some(steps) => steps.front().cloned().unwrap_or_else(|| Step::Bars(frame(&[]))),
            None => Step::Bars(frame(&[])),
        }
    }
}

impl DataProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "Scripted"
    }

    fn description(&self) -> &str {
        "Replays canned responses"
    }
}

#[async_trait]
impl PriceDataProvider for ScriptedProvider {
    async fn fetch_daily(
        &self,
        symbol: &Symbol,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<DataFrame> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests
            .lock()
            .unwrap()
            .push((symbol.clone(), start, end));
        if let Some(token) = self.cancel_on_call.lock().unwrap().as_ref() {
            token.cancel();
        }

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let result = match self.next_step(symbol) {
            Step::Bars(df) => Ok(df),
            Step::Fail(msg) => Err(DataError::Network(msg)),
            Step::NotFound => Err(DataError::SymbolNotFound(symbol.to_string())),
            Step::Hang => std::future::pending().await,
            Step::Slow(df, delay) => {
                tokio::time::sleep(delay).await;
                Ok(df)
            }
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

/// Registry backed by an [`InMemoryStore`] whose writes fail for one symbol.
#[derive(Debug)]
pub(crate) struct FailingStore {
    inner: InMemoryStore,
    fail_for: Symbol,
}

impl FailingStore {
    pub(crate) async fn new(symbols: &[&str], fail_for: &str) -> Self {
        Self {
            inner: registered(symbols).await,
            fail_for: Symbol::new(fail_for),
        }
    }

    pub(crate) fn inner(&self) -> &InMemoryStore {
        &self.inner
    }
}

#[async_trait]
impl SymbolRegistry for FailingStore {
    async fn exists(&self, symbol: &Symbol) -> Result<bool> {
        self.inner.exists(symbol).await
    }

    async fn list_all(&self) -> Result<Vec<Symbol>> {
        self.inner.list_all().await
    }
}

#[async_trait]
impl PriceStore for FailingStore {
    async fn upsert(&self, bar: &PriceBar) -> Result<()> {
        if bar.symbol == self.fail_for {
            return Err(DataError::Storage("disk I/O error".into()));
        }
        self.inner.upsert(bar).await
    }

    async fn bars(
        &self,
        symbol: &Symbol,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PriceBar>> {
        self.inner.bars(symbol, start, end).await
    }
}

/// Store call that never completes in a [`StalledStore`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Stall {
    Lookup,
    Listing,
    Upsert,
}

/// Registry and store over an [`InMemoryStore`] where one call never returns.
#[derive(Debug)]
pub(crate) struct StalledStore {
    inner: InMemoryStore,
    stall: Stall,
}

impl StalledStore {
    pub(crate) async fn new(symbols: &[&str], stall: Stall) -> Self {
        Self {
            inner: registered(symbols).await,
            stall,
        }
    }
}

#[async_trait]
impl SymbolRegistry for StalledStore {
    async fn exists(&self, symbol: &Symbol) -> Result<bool> {
        if self.stall == Stall::Lookup {
            return std::future::pending().await;
        }
        self.inner.exists(symbol).await
    }

    async fn list_all(&self) -> Result<Vec<Symbol>> {
        if self.stall == Stall::Listing {
            return std::future::pending().await;
        }
        self.inner.list_all().await
    }
}

#[async_trait]
impl PriceStore for StalledStore {
    async fn upsert(&self, bar: &PriceBar) -> Result<()> {
        if self.stall == Stall::Upsert {
            return std::future::pending().await;
        }
        self.inner.upsert(bar).await
    }

    async fn bars(
        &self,
        symbol: &Symbol,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PriceBar>> {
        self.inner.bars(symbol, start, end).await
    }
}

/// In-memory store with `symbols` registered.
pub(crate) async fn registered(symbols: &[&str]) -> InMemoryStore {
    let store = InMemoryStore::new();
    for s in symbols {
        store
            .register_symbol(&SymbolInfo::new(Symbol::new(*s), format!("{s} Inc.")))
            .await
            .unwrap();
    }
    store
}

/// Provider-shaped frame with one row per `(date, close)`.
pub(crate) fn frame(rows: &[(&str, f64)]) -> DataFrame {
    let dates: Vec<&str> = rows.iter().map(|(d, _)| *d).collect();
    let closes: Vec<f64> = rows.iter().map(|(_, c)| *c).collect();
    let volumes: Vec<u64> = vec![1_000_000; rows.len()];

    DataFrame::new(vec![
        Column::new("date".into(), dates),
        Column::new("open".into(), closes.clone()),
        Column::new("high".into(), closes.clone()),
        Column::new("low".into(), closes.clone()),
        Column::new("close".into(), closes),
        Column::new("volume".into(), volumes),
    ])
    .unwrap()
}

