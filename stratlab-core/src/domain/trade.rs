//! Trade ledger entries and equity curve points.

use serde::{Deserialize, Serialize};

use super::candle::format_timestamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeKind {
    Entry,
    Exit,
}

/// One ledger row. Exit rows carry profit, profit percentage, and the exit reason.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trade {
    pub kind: TradeKind,
    pub time: i64,
    pub price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profit: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profit_pct: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl Trade {
    pub fn entry(time: i64, price: f64, reason: impl Into<String>) -> Self {
        Self {
            kind: TradeKind::Entry,
            time,
            price,
            profit: None,
            profit_pct: None,
            reason: Some(reason.into()),
        }
    }

    pub fn exit(
        time: i64,
        price: f64,
        profit: f64,
        profit_pct: f64,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            kind: TradeKind::Exit,
            time,
            price,
            profit: Some(profit),
            profit_pct: Some(profit_pct),
            reason: Some(reason.into()),
        }
    }

    pub fn is_entry(&self) -> bool {
        self.kind == TradeKind::Entry
    }

    pub fn is_exit(&self) -> bool {
        self.kind == TradeKind::Exit
    }

    /// Human-readable log line for this ledger row.
    pub fn log_line(&self) -> String {
        let stamp = format_timestamp(self.time);
        let reason = self.reason.as_deref().unwrap_or("");
        match self.kind {
            TradeKind::Entry => format!(
                "{stamp} - [STRATEGY] Creating BUY order @ ${:.2} | {reason}",
                self.price
            ),
            TradeKind::Exit => {
                let profit = self.profit.unwrap_or(0.0);
                let pct = self.profit_pct.unwrap_or(0.0);
                let sign = if profit >= 0.0 { "+" } else { "" };
                format!(
                    "{stamp} - [STRATEGY] Executing SELL @ ${:.2} | Profit: {sign}{profit:.2} ({pct:.2}%) | {reason}",
                    self.price
                )
            }
        }
    }
}

/// Equity after processing one candle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub time: i64,
    pub value: f64,
}
