//! BacktestResult — the serializable output of one simulation pass.

use serde::{Deserialize, Serialize};

use super::trade::{EquityPoint, Trade};

/// Trade ledger, equity curve, summary statistics, and log lines of one run.
///
/// Fully derived from the simulation inputs; no state carries across runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BacktestResult {
    pub trades: Vec<Trade>,
    pub equity_curve: Vec<EquityPoint>,
    pub final_balance: f64,
    pub roi_pct: f64,
    /// Number of entries (an open position at run end still counts).
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub win_rate_pct: f64,
    pub avg_profit: f64,
    pub max_drawdown_pct: f64,
    pub sharpe_ratio: f64,
    pub logs: Vec<String>,
}

impl BacktestResult {
    pub fn entry_count(&self) -> usize {
        self.trades.iter().filter(|t| t.is_entry()).count()
    }

    pub fn exit_count(&self) -> usize {
        self.trades.iter().filter(|t| t.is_exit()).count()
    }

    /// Exit rows, i.e. closed round trips.
    pub fn closed_trades(&self) -> impl Iterator<Item = &Trade> {
        self.trades.iter().filter(|t| t.is_exit())
    }

    /// True when the run ended with a position still open.
    pub fn has_open_position(&self) -> bool {
        self.entry_count() > self.exit_count()
    }
}
