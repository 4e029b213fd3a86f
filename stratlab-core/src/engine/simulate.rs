//! Single-pass simulation over (candles, Dataframe, StrategySpec).
//!
//! The loop threads [`EngineState`] through [`step`], records one equity point
//! per candle, and collects the ledger and log lines. All decisions live in
//! the transition function.

use tracing::{debug, warn};

use super::dataframe::Dataframe;
use super::metrics::{ledger_stats, max_drawdown_pct, roi_pct, sharpe_ratio};
use super::sizing::{AllIn, Sizer};
use super::state::{step, EngineState};
use crate::domain::{BacktestResult, Candle, EquityPoint, StrategySpec};

pub struct Simulator {
    sizer: Box<dyn Sizer>,
}

impl Default for Simulator {
    fn default() -> Self {
        Self::new(Box::new(AllIn))
    }
}

impl Simulator {
    pub fn new(sizer: Box<dyn Sizer>) -> Self {
        Self { sizer }
    }

    pub fn sizer(&self) -> &dyn Sizer {
        self.sizer.as_ref()
    }

    pub fn run(
        &self,
        candles: &[Candle],
        dataframe: &Dataframe,
        spec: &StrategySpec,
        starting_balance: f64,
    ) -> BacktestResult {
        let mut state = EngineState::new(starting_balance);
        let mut trades = Vec::new();
        let mut logs = Vec::new();
        let mut equity_curve = Vec::with_capacity(candles.len());

        for (i, candle) in candles.iter().enumerate() {
            let row = dataframe.row(i, candle);
            let transition = step(&state, candle, &row, spec, self.sizer.as_ref());
            state = transition.state;

            if let Some(trade) = transition.trade {
                let line = trade.log_line();
                debug!("{line}");
                logs.push(line);
                trades.push(trade);
            }
            if let Some(reason) = transition.refused {
                warn!(time = candle.time, "{reason}");
                logs.push(format!("{} - [WARNING] {reason}", candle.timestamp_label()));
            }

            equity_curve.push(EquityPoint {
                time: candle.time,
                value: state.equity(candle.close),
            });
        }

        let values: Vec<f64> = equity_curve.iter().map(|p| p.value).collect();
        let stats = ledger_stats(&trades);

        BacktestResult {
            final_balance: state.balance,
            roi_pct: roi_pct(state.balance, starting_balance),
            total_trades: stats.entries,
            winning_trades: stats.winning,
            losing_trades: stats.losing,
            win_rate_pct: stats.win_rate_pct,
            avg_profit: stats.avg_profit,
            max_drawdown_pct: max_drawdown_pct(&values, starting_balance),
            sharpe_ratio: sharpe_ratio(&values),
            trades,
            equity_curve,
            logs,
        }
    }
}

/// Run one backtest with the default all-in sizer.
pub fn simulate(
    candles: &[Candle],
    dataframe: &Dataframe,
    spec: &StrategySpec,
    starting_balance: f64,
) -> BacktestResult {
    Simulator::default().run(candles, dataframe, spec, starting_balance)
}
