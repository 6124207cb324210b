//! `pricefeed` command-line interface.
//!
//! Commands:
//! - `ingest` - ingest one symbol or every registered symbol, printing JSON
//! - `daemon` - run the batch on a fixed schedule until Ctrl-C
//! - `symbols add|list|remove` - manage the symbol registry

mod config;

use std::{path::PathBuf, process::ExitCode, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{ArgGroup, Args, Parser, Subcommand};
use pricefeed::{
    CancellationToken, IngestionWindow, Ingestor, SqliteStore, Status, Symbol, SymbolInfo,
    YahooProvider, schedule,
};
use serde_json::Value;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::AppConfig;

#[derive(Parser, Debug)]
#[command(name = "pricefeed")]
#[command(about = "Daily OHLCV ingestion into a local price database", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// SQLite database path. Overrides PRICEFEED_DB_PATH.
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error). RUST_LOG takes precedence.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Ingest one symbol or every registered symbol.
    Ingest(IngestArgs),

    /// Run batch ingestion now and then on a fixed interval until Ctrl-C.
    Daemon {
        /// Minutes between runs. Defaults to PRICEFEED_SCHEDULE_MINUTES.
        #[arg(long)]
        every_minutes: Option<u64>,

        /// Trailing days to request on each run.
        #[arg(long)]
        days: Option<u32>,
    },

    /// Manage the symbol registry.
    #[command(subcommand)]
    Symbols(SymbolsCommand),
}

#[derive(Args, Debug)]
#[command(group(ArgGroup::new("target").required(true).args(["symbol", "all"])))]
struct IngestArgs {
    /// Symbol to ingest (e.g., AAPL).
    #[arg(long)]
    symbol: Option<String>,

    /// Ingest every registered symbol.
    #[arg(long)]
    all: bool,

    /// Trailing days to request. Defaults to 20.
    #[arg(long, conflicts_with_all = ["start", "end"])]
    days: Option<u32>,

    /// First date to request (YYYY-MM-DD).
    #[arg(long, requires = "end")]
    start: Option<NaiveDate>,

    /// Exclusive end date (YYYY-MM-DD).
    #[arg(long, requires = "start")]
    end: Option<NaiveDate>,

    /// Symbols ingested at the same time with --all.
    #[arg(long, requires = "all")]
    concurrency: Option<usize>,
}

#[derive(Subcommand, Debug)]
enum SymbolsCommand {
    /// Register a symbol, or rename an existing one.
    Add {
        /// Ticker (e.g., AAPL).
        symbol: String,

        /// Display name (e.g., "Apple Inc.").
        #[arg(long)]
        name: String,
    },
    /// List registered symbols.
    List,
    /// Remove a symbol and all of its prices.
    Remove {
        /// Ticker to remove.
        symbol: String,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Logs go to stderr so stdout stays valid JSON
    let default_filter = format!(
        "pricefeed={level},pricefeed_cli={level},pricefeed_store={level},pricefeed_yahoo={level}",
        level = cli.log_level
    );
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut config = AppConfig::from_env()?;
    if let Some(db) = cli.db {
        config.db_path = db;
    }

    let store = Arc::new(
        SqliteStore::new(&config.db_path)
            .with_context(|| format!("opening database {}", config.db_path.display()))?,
    );

    match cli.command {
        Commands::Ingest(args) => ingest(&config, store, args).await,
        Commands::Daemon {
            every_minutes,
            days,
        } => daemon(&config, store, every_minutes, days).await,
        Commands::Symbols(command) => symbols(&store, command).await,
    }
}

fn ingestor(config: &AppConfig, store: Arc<SqliteStore>) -> Result<Ingestor> {
    let provider = Arc::new(YahooProvider::with_rate_limit(config.rate_limit)?);
    Ok(Ingestor::with_config(
        store.clone(),
        store,
        provider,
        config.ingest.clone(),
    ))
}

async fn ingest(config: &AppConfig, store: Arc<SqliteStore>, args: IngestArgs) -> Result<ExitCode> {
    let mut config = config.clone();
    if let Some(concurrency) = args.concurrency {
        config.ingest.concurrency = concurrency.max(1);
    }
    let ingestor = ingestor(&config, store)?;

    let window = match (args.start, args.end) {
        (Some(start), Some(end)) => Some(IngestionWindow::between(start, end)?),
        _ => None,
    };

    let (status, output) = match (args.symbol, window) {
        (Some(symbol), Some(window)) => {
            let outcome = ingestor
                .ingest_symbol_window(&Symbol::new(symbol), window)
                .await;
            (outcome.status, serde_json::to_value(&outcome)?)
        }
        (Some(symbol), None) => {
            let outcome = ingestor.ingest_one_symbol(&symbol, args.days).await;
            (outcome.status, serde_json::to_value(&outcome)?)
        }
        (None, Some(window)) => {
            let report = ingestor
                .ingest_all_in_window(window, CancellationToken::new())
                .await;
            (report.status, serde_json::to_value(&report)?)
        }
        (None, None) => {
            let report = ingestor.ingest_all_symbols(args.days).await;
            (report.status, serde_json::to_value(&report)?)
        }
    };

    print_json(&output)?;
    Ok(exit_code(status))
}

async fn daemon(
    config: &AppConfig,
    store: Arc<SqliteStore>,
    every_minutes: Option<u64>,
    days: Option<u32>,
) -> Result<ExitCode> {
    let ingestor = ingestor(config, store)?;
    let period = every_minutes.map_or(config.schedule_every, |m| {
        Duration::from_secs(m.saturating_mul(60))
    });

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received");
            shutdown.cancel();
        }
    });

    info!(
        ?period,
        concurrency = ingestor.config().concurrency,
        db = %config.db_path.display(),
        "Daemon started"
    );
    let runs = schedule::run_every(&ingestor, period, days, cancel).await?;
    info!(runs, "Daemon stopped");

    Ok(ExitCode::SUCCESS)
}

async fn symbols(store: &SqliteStore, command: SymbolsCommand) -> Result<ExitCode> {
    match command {
        SymbolsCommand::Add { symbol, name } => {
            let info = SymbolInfo::new(Symbol::parse(&symbol)?, name);
            store.register_symbol(&info).await?;
            print_json(&serde_json::to_value(&info)?)?;
            Ok(ExitCode::SUCCESS)
        }
        SymbolsCommand::List => {
            let symbols = store.symbols().await?;
            print_json(&serde_json::to_value(&symbols)?)?;
            Ok(ExitCode::SUCCESS)
        }
        SymbolsCommand::Remove { symbol } => {
            let symbol = Symbol::new(symbol);
            if store.remove_symbol(&symbol).await? {
                info!(%symbol, "Removed symbol");
                Ok(ExitCode::SUCCESS)
            } else {
                eprintln!("Symbol {symbol} not found in database.");
                Ok(ExitCode::FAILURE)
            }
        }
    }
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

const fn exit_code(status: Status) -> ExitCode {
    match status {
        Status::Ok => ExitCode::SUCCESS,
        Status::Error => ExitCode::FAILURE,
    }
}
