//! Summary statistics: pure functions over the equity curve and the ledger.

use crate::domain::Trade;

/// Fixed annualization factor applied to per-candle returns, whatever the timeframe.
pub const ANNUALIZATION_PERIODS: f64 = 252.0;

// ─── Equity-curve metrics ───────────────────────────────────────────

/// Per-step simple returns. A non-positive previous value yields 0.
pub fn step_returns(equity: &[f64]) -> Vec<f64> {
    equity
        .windows(2)
        .map(|w| if w[0] > 0.0 { (w[1] - w[0]) / w[0] } else { 0.0 })
        .collect()
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation (divide by N).
fn population_std(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    (values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64).sqrt()
}

/// mean / std of step returns × √252.
///
/// 0 with fewer than 2 equity points, a (near-)zero deviation, or a
/// non-finite result.
pub fn sharpe_ratio(equity: &[f64]) -> f64 {
    if equity.len() < 2 {
        return 0.0;
    }
    let returns = step_returns(equity);
    let std = population_std(&returns);
    if std < 1e-15 {
        return 0.0;
    }
    let sharpe = mean(&returns) / std * ANNUALIZATION_PERIODS.sqrt();
    if sharpe.is_finite() {
        sharpe
    } else {
        0.0
    }
}

/// Largest peak-to-trough decline in percent. The running peak starts at
/// `starting_balance`, so an immediate loss counts as drawdown.
pub fn max_drawdown_pct(equity: &[f64], starting_balance: f64) -> f64 {
    let mut peak = starting_balance;
    let mut max_dd = 0.0_f64;
    for &value in equity {
        if value > peak {
            peak = value;
        }
        if peak > 0.0 {
            max_dd = max_dd.max((peak - value) / peak * 100.0);
        }
    }
    max_dd
}

/// (final - start) / start in percent; 0 for a non-positive start.
pub fn roi_pct(final_balance: f64, starting_balance: f64) -> f64 {
    if starting_balance > 0.0 {
        (final_balance - starting_balance) / starting_balance * 100.0
    } else {
        0.0
    }
}

// ─── Ledger metrics ─────────────────────────────────────────────────

/// Aggregates over closed trades (exit rows).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LedgerStats {
    pub entries: usize,
    pub exits: usize,
    pub winning: usize,
    pub losing: usize,
    pub win_rate_pct: f64,
    pub avg_profit: f64,
}

pub fn ledger_stats(trades: &[Trade]) -> LedgerStats {
    let entries = trades.iter().filter(|t| t.is_entry()).count();
    let profits: Vec<f64> = trades
        .iter()
        .filter(|t| t.is_exit())
        .map(|t| t.profit.unwrap_or(0.0))
        .collect();
    let exits = profits.len();
    let winning = profits.iter().filter(|&&p| p > 0.0).count();
    let losing = profits.iter().filter(|&&p| p < 0.0).count();
    let (win_rate_pct, avg_profit) = if exits > 0 {
        (
            winning as f64 / exits as f64 * 100.0,
            profits.iter().sum::<f64>() / exits as f64,
        )
    } else {
        (0.0, 0.0)
    };

    LedgerStats {
        entries,
        exits,
        winning,
        losing,
        win_rate_pct,
        avg_profit,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sharpe_too_short_is_zero() {
        assert_eq!(sharpe_ratio(&[]), 0.0);
        assert_eq!(sharpe_ratio(&[1000.0]), 0.0);
    }

    #[test]
    fn sharpe_constant_equity_is_zero() {
        assert_eq!(sharpe_ratio(&[1000.0; 50]), 0.0);
    }

    #[test]
    fn sharpe_identical_returns_is_zero() {
        let mut eq = vec![1000.0];
        for i in 1..30 {
            eq.push(eq[i - 1] * 1.01);
        }
        assert_eq!(sharpe_ratio(&eq), 0.0);
    }

    #[test]
    fn sharpe_known_value() {
        // returns: +10%, +10%, -10%
        let eq = [100.0, 110.0, 121.0, 108.9];
        let r = step_returns(&eq);
        let m: f64 = (0.1 + 0.1 - 0.1) / 3.0;
        let sd = (((0.1 - m).powi(2) * 2.0 + (-0.1 - m).powi(2)) / 3.0).sqrt();
        let expected = m / sd * 252f64.sqrt();
        assert!((r[2] + 0.1).abs() < 1e-12);
        assert!((sharpe_ratio(&eq) - expected).abs() < 1e-9);
    }

    #[test]
    fn drawdown_from_starting_peak() {
        assert!((max_drawdown_pct(&[900.0, 950.0], 1000.0) - 10.0).abs() < 1e-10);
        assert!((max_drawdown_pct(&[1000.0, 1200.0, 900.0, 1300.0], 1000.0) - 25.0).abs() < 1e-10);
        assert_eq!(max_drawdown_pct(&[1000.0, 1100.0], 1000.0), 0.0);
    }

    #[test]
    fn ledger_counts_wins_and_losses() {
        let trades = vec![
            Trade::entry(0, 100.0, "a"),
            Trade::exit(1, 110.0, 10.0, 10.0, "Exit signal"),
            Trade::entry(2, 100.0, "b"),
            Trade::exit(3, 95.0, -5.0, -5.0, "Stoploss"),
            Trade::entry(4, 100.0, "c"),
            Trade::exit(5, 100.0, 0.0, 0.0, "Exit signal"),
            Trade::entry(6, 100.0, "d"),
        ];
        let stats = ledger_stats(&trades);
        assert_eq!(stats.entries, 4);
        assert_eq!(stats.exits, 3);
        assert_eq!(stats.winning, 1);
        assert_eq!(stats.losing, 1);
        assert!((stats.win_rate_pct - 100.0 / 3.0).abs() < 1e-10);
        assert!((stats.avg_profit - 5.0 / 3.0).abs() < 1e-10);
    }

    #[test]
    fn roi_of_unchanged_balance_is_zero() {
        assert_eq!(roi_pct(1000.0, 1000.0), 0.0);
        assert!((roi_pct(1100.0, 1000.0) - 10.0).abs() < 1e-10);
    }
}
