//! Periodic batch ingestion.

use std::time::Duration;

use pricefeed_core::{DataError, Result};
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{Ingestor, outcome::Status};

/// Run a batch over every registered symbol at once and then every `period`
/// until `cancel` fires.
///
/// Ticks missed while a batch is still running are skipped rather than
/// replayed. Cancelling also stops the batch in flight, which still logs its
/// partial report. Returns the number of batches that ran to completion.
///
/// # Errors
/// Returns [`DataError::InvalidParameter`] if `period` is zero.
pub async fn run_every(
    ingestor: &Ingestor,
    period: Duration,
    lookback_days: Option<u32>,
    cancel: CancellationToken,
) -> Result<usize> {
    if period.is_zero() {
        return Err(DataError::InvalidParameter(
            "schedule period must be positive".to_string(),
        ));
    }

    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut completed = 0;

    info!(?period, "Scheduler started");

    loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let report = ingestor
                    .ingest_all_symbols_until(lookback_days, cancel.clone())
                    .await;
                if report.status == Status::Error {
                    warn!(details = ?report.details, "Scheduled batch failed");
                }
                if !report.cancelled {
                    completed += 1;
                }
            }
        }
    }

    info!(completed, "Scheduler stopped");
    Ok(completed)
}
