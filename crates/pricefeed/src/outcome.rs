//! Structured results of single-symbol and batch ingestion.

use pricefeed_core::Symbol;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::IngestError;

/// Overall status of an outcome or report.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// The operation completed.
    #[default]
    Ok,
    /// The operation failed; see `details`.
    Error,
}

/// Result of ingesting one symbol.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolOutcome {
    /// Whether the symbol was ingested.
    pub status: Status,
    /// The symbol.
    pub symbol: Symbol,
    /// Rows written to the store. Malformed rows are not counted.
    pub rows: usize,
    /// Length of the requested window in days.
    pub window_days: i64,
    /// Failure message, present when `status` is [`Status::Error`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl SymbolOutcome {
    /// A successful outcome.
    #[must_use]
    pub const fn ok(symbol: Symbol, rows: usize, window_days: i64) -> Self {
        Self {
            status: Status::Ok,
            symbol,
            rows,
            window_days,
            details: None,
        }
    }

    /// A failed outcome carrying the error's message.
    #[must_use]
    pub fn failed(symbol: Symbol, window_days: i64, error: &IngestError) -> Self {
        Self {
            status: Status::Error,
            symbol,
            rows: 0,
            window_days,
            details: Some(error.to_string()),
        }
    }

    /// Returns true if the symbol was ingested.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.status == Status::Ok
    }
}

/// Aggregate result of one batch run.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    /// `ok` once symbols were processed, `error` if the batch could not start.
    pub status: Status,
    /// Why the batch could not start.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    /// Symbols with an outcome.
    pub processed: usize,
    /// Symbols ingested successfully.
    pub succeeded: usize,
    /// Symbols that failed.
    pub failed: usize,
    /// Length of the shared window in days.
    pub window_days: i64,
    /// `"<SYMBOL>: <rows> rows"` for each successful symbol, sorted.
    pub summary: Vec<String>,
    /// `"<SYMBOL>: <details>"` for each failed symbol, sorted.
    pub errors: Vec<String>,
    /// True if the run was cancelled before every symbol finished.
    pub cancelled: bool,
}

impl BatchReport {
    /// A report for a batch that could not start.
    #[must_use]
    pub fn failed(error: &IngestError) -> Self {
        Self {
            status: Status::Error,
            details: Some(error.to_string()),
            ..Self::default()
        }
    }

    /// Aggregates per-symbol outcomes. Completion order does not matter.
    #[must_use]
    pub fn from_outcomes(window_days: i64, outcomes: &[SymbolOutcome], cancelled: bool) -> Self {
        let mut summary = Vec::new();
        let mut errors = Vec::new();

        for outcome in outcomes {
            if outcome.is_ok() {
                summary.push(format!("{}: {} rows", outcome.symbol, outcome.rows));
            } else {
                errors.push(format!(
                    "{}: {}",
                    outcome.symbol,
                    outcome.details.as_deref().unwrap_or("unknown error")
                ));
            }
        }
        summary.sort();
        errors.sort();

        Self {
            status: Status::Ok,
            details: None,
            processed: outcomes.len(),
            succeeded: summary.len(),
            failed: errors.len(),
            window_days,
            summary,
            errors,
            cancelled,
        }
    }

    /// Log the report counts.
    pub fn log_summary(&self) {
        info!(
            status = ?self.status,
            processed = self.processed,
            succeeded = self.succeeded,
            failed = self.failed,
            window_days = self.window_days,
            cancelled = self.cancelled,
            "Batch ingestion finished"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failed(symbol: &str) -> SymbolOutcome {
        SymbolOutcome::failed(
            Symbol::new(symbol),
            20,
            &IngestError::NotRegistered(Symbol::new(symbol)),
        )
    }

    #[test]
    fn test_report_counts_and_sorting() {
        let outcomes = vec![
            SymbolOutcome::ok(Symbol::new("MSFT"), 13, 20),
            failed("ZZZZ"),
            SymbolOutcome::ok(Symbol::new("AAPL"), 14, 20),
        ];

        let report = BatchReport::from_outcomes(20, &outcomes, false);

        assert_eq!(report.status, Status::Ok);
        assert_eq!(report.processed, 3);
        assert_eq!(report.succeeded, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.summary, vec!["AAPL: 14 rows", "MSFT: 13 rows"]);
        assert_eq!(report.errors, vec!["ZZZZ: Symbol ZZZZ not found in database."]);
    }

    #[test]
    fn test_outcome_json() {
        let ok = serde_json::to_value(SymbolOutcome::ok(Symbol::new("AAPL"), 14, 20)).unwrap();
        assert_eq!(
            ok,
            serde_json::json!({"status": "ok", "symbol": "AAPL", "rows": 14, "window_days": 20})
        );

        let err = serde_json::to_value(failed("ZZZZ")).unwrap();
        assert_eq!(err["status"], "error");
        assert_eq!(err["details"], "Symbol ZZZZ not found in database.");
    }

    #[test]
    fn test_failed_report_json() {
        let report = BatchReport::failed(&IngestError::NoSymbols);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["details"], "No symbols found in database.");
        assert_eq!(json["processed"], 0);
    }
}
