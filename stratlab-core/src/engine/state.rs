//! Position state machine and its pure transition function.
//!
//! ```text
//!          entry conjunction true
//!   Flat ─────────────────────────▶ InPosition
//!    ▲                                  │
//!    └──── exit signal | ROI | stop ────┘
//! ```
//!
//! Exits are only evaluated on candles after the entry candle.

use crate::domain::{Candle, Condition, StrategySpec, Trade};
use crate::engine::dataframe::DataRow;
use crate::engine::sizing::Sizer;

/// An open long position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    pub entry_time: i64,
    pub entry_price: f64,
    /// Units held.
    pub amount: f64,
    /// Capital committed at entry.
    pub stake: f64,
    /// Highest `high` seen since entry (entry close on the entry candle).
    pub highest_price: f64,
}

impl Position {
    pub fn value(&self, close: f64) -> f64 {
        self.amount * close
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum PositionState {
    #[default]
    Flat,
    InPosition(Position),
}

impl PositionState {
    pub fn position(&self) -> Option<&Position> {
        match self {
            PositionState::Flat => None,
            PositionState::InPosition(p) => Some(p),
        }
    }

    pub fn is_flat(&self) -> bool {
        matches!(self, PositionState::Flat)
    }
}

/// Cash plus position. `balance` still includes the stake while a position is
/// open; the stake is settled on exit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineState {
    pub balance: f64,
    pub position: PositionState,
}

impl EngineState {
    pub fn new(starting_balance: f64) -> Self {
        Self {
            balance: starting_balance,
            position: PositionState::Flat,
        }
    }

    /// Mark-to-market equity at `close`.
    pub fn equity(&self, close: f64) -> f64 {
        match &self.position {
            PositionState::Flat => self.balance,
            PositionState::InPosition(p) => self.balance - p.stake + p.value(close),
        }
    }
}

/// Result of processing one candle.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub state: EngineState,
    pub trade: Option<Trade>,
    /// Why an entry signal was not acted on, if it wasn't.
    pub refused: Option<String>,
}

impl Transition {
    fn unchanged(state: &EngineState) -> Self {
        Self {
            state: *state,
            trade: None,
            refused: None,
        }
    }
}

/// True when every condition holds at this row. An empty list never holds.
pub fn conditions_met(row: &DataRow<'_>, conditions: &[Condition]) -> bool {
    !conditions.is_empty()
        && conditions.iter().all(|c| {
            row.value(&c.indicator)
                .is_some_and(|v| c.op.apply(v, c.threshold))
        })
}

/// `RSI(25.31) < 30 & CLOSE(101.20) > 100`
pub fn entry_reason(row: &DataRow<'_>, conditions: &[Condition]) -> String {
    conditions
        .iter()
        .map(|c| {
            let value = row
                .value(&c.indicator)
                .map_or_else(|| "NaN".to_string(), |v| format!("{v:.2}"));
            format!(
                "{}({value}) {} {}",
                c.indicator.to_uppercase(),
                c.op,
                c.threshold
            )
        })
        .collect::<Vec<_>>()
        .join(" & ")
}

/// Advance the state machine by one candle.
///
/// Candles where any declared indicator is unavailable leave the state
/// untouched.
pub fn step(
    state: &EngineState,
    candle: &Candle,
    row: &DataRow<'_>,
    spec: &StrategySpec,
    sizer: &dyn Sizer,
) -> Transition {
    if !row.has_all(spec.indicator_names()) {
        return Transition::unchanged(state);
    }

    match &state.position {
        PositionState::Flat => try_enter(state, candle, row, spec, sizer),
        PositionState::InPosition(position) => try_exit(state, position, candle, row, spec),
    }
}

fn try_enter(
    state: &EngineState,
    candle: &Candle,
    row: &DataRow<'_>,
    spec: &StrategySpec,
    sizer: &dyn Sizer,
) -> Transition {
    if !conditions_met(row, &spec.entry_conditions) {
        return Transition::unchanged(state);
    }

    let stake = sizer.stake(state.balance, candle);
    let affordable = stake > 0.0 && candle.close > 0.0;
    if !affordable {
        return Transition {
            refused: Some(format!(
                "entry skipped: stake {stake:.2} at close {:.2} ({})",
                candle.close,
                sizer.name()
            )),
            ..Transition::unchanged(state)
        };
    }

    let position = Position {
        entry_time: candle.time,
        entry_price: candle.close,
        amount: stake / candle.close,
        stake,
        highest_price: candle.close,
    };
    let trade = Trade::entry(
        candle.time,
        candle.close,
        entry_reason(row, &spec.entry_conditions),
    );

    Transition {
        state: EngineState {
            balance: state.balance,
            position: PositionState::InPosition(position),
        },
        trade: Some(trade),
        refused: None,
    }
}

fn try_exit(
    state: &EngineState,
    position: &Position,
    candle: &Candle,
    row: &DataRow<'_>,
    spec: &StrategySpec,
) -> Transition {
    let mut position = *position;
    position.highest_price = position.highest_price.max(candle.high);

    let profit_pct = (candle.close - position.entry_price) / position.entry_price * 100.0;
    let minutes_elapsed = (candle.time - position.entry_time) as f64 / 60_000.0;
    let roi_target = spec.roi.target(minutes_elapsed);

    let exit_signal = conditions_met(row, &spec.exit_conditions);
    let hit_roi = profit_pct >= roi_target * 100.0;
    let hit_stoploss = profit_pct <= spec.stoploss * 100.0;

    let reason = if exit_signal {
        "Exit signal".to_string()
    } else if hit_roi {
        format!("ROI target ({}%)", roi_target * 100.0)
    } else if hit_stoploss {
        "Stoploss".to_string()
    } else {
        return Transition {
            state: EngineState {
                balance: state.balance,
                position: PositionState::InPosition(position),
            },
            trade: None,
            refused: None,
        };
    };

    let exit_value = position.value(candle.close);
    let profit = exit_value - position.stake;

    Transition {
        state: EngineState {
            balance: state.balance + profit,
            position: PositionState::Flat,
        },
        trade: Some(Trade::exit(
            candle.time,
            candle.close,
            profit,
            profit_pct,
            reason,
        )),
        refused: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CompareOp, IndicatorConfig, RoiLadder};
    use crate::engine::dataframe::Dataframe;
    use crate::engine::sizing::AllIn;
    use crate::indicators::make_candles;

    fn spec() -> StrategySpec {
        StrategySpec {
            indicators: vec![IndicatorConfig::new("rsi", "RSI")],
            entry_conditions: vec![Condition::new("rsi", CompareOp::Lt, 30.0)],
            exit_conditions: vec![Condition::new("rsi", CompareOp::Gt, 70.0)],
            roi: RoiLadder::from_pairs(&[(0, 0.5)]),
            stoploss: -0.10,
            ..StrategySpec::default()
        }
    }

    fn frame(rsi: &[f64]) -> Dataframe {
        let mut df = Dataframe::new(rsi.len());
        df.insert("rsi", rsi.to_vec());
        df
    }

    #[test]
    fn flat_enters_when_conjunction_holds() {
        let candles = make_candles(&[100.0]);
        let df = frame(&[25.0]);
        let row = df.row(0, &candles[0]);
        let t = step(&EngineState::new(1000.0), &candles[0], &row, &spec(), &AllIn);

        let position = t.state.position.position().copied().unwrap();
        assert_eq!(position.amount, 10.0);
        assert_eq!(position.stake, 1000.0);
        assert_eq!(position.highest_price, 100.0);
        let trade = t.trade.unwrap();
        assert!(trade.is_entry());
        assert_eq!(trade.reason.as_deref(), Some("RSI(25.00) < 30"));
    }

    #[test]
    fn unavailable_indicator_skips_decision() {
        let candles = make_candles(&[100.0]);
        let df = frame(&[f64::NAN]);
        let row = df.row(0, &candles[0]);
        let state = EngineState::new(1000.0);
        let t = step(&state, &candles[0], &row, &spec(), &AllIn);
        assert_eq!(t.state, state);
        assert!(t.trade.is_none());
    }

    #[test]
    fn empty_entry_list_never_enters() {
        let candles = make_candles(&[100.0]);
        let df = frame(&[10.0]);
        let row = df.row(0, &candles[0]);
        let spec = StrategySpec {
            entry_conditions: Vec::new(),
            ..spec()
        };
        let t = step(&EngineState::new(1000.0), &candles[0], &row, &spec, &AllIn);
        assert!(t.state.position.is_flat());
    }

    #[test]
    fn zero_balance_refuses_entry() {
        let candles = make_candles(&[100.0]);
        let df = frame(&[10.0]);
        let row = df.row(0, &candles[0]);
        let t = step(&EngineState::new(0.0), &candles[0], &row, &spec(), &AllIn);
        assert!(t.state.position.is_flat());
        assert!(t.trade.is_none());
        assert!(t.refused.is_some());
    }

    fn open_state(entry_price: f64, entry_time: i64) -> EngineState {
        EngineState {
            balance: 1000.0,
            position: PositionState::InPosition(Position {
                entry_time,
                entry_price,
                amount: 1000.0 / entry_price,
                stake: 1000.0,
                highest_price: entry_price,
            }),
        }
    }

    #[test]
    fn exit_signal_takes_precedence() {
        // +60% also clears the 50% ROI target
        let candles = make_candles(&[100.0, 160.0]);
        let df = frame(&[25.0, 80.0]);
        let row = df.row(1, &candles[1]);
        let t = step(&open_state(100.0, candles[0].time), &candles[1], &row, &spec(), &AllIn);
        let trade = t.trade.unwrap();
        assert_eq!(trade.reason.as_deref(), Some("Exit signal"));
        assert!((trade.profit.unwrap() - 600.0).abs() < 1e-9);
        assert!((t.state.balance - 1600.0).abs() < 1e-9);
        assert!(t.state.position.is_flat());
    }

    #[test]
    fn roi_target_exit_reason() {
        let candles = make_candles(&[100.0, 150.0]);
        let df = frame(&[25.0, 50.0]);
        let row = df.row(1, &candles[1]);
        let t = step(&open_state(100.0, candles[0].time), &candles[1], &row, &spec(), &AllIn);
        assert_eq!(t.trade.unwrap().reason.as_deref(), Some("ROI target (50%)"));
    }

    #[test]
    fn stoploss_exit() {
        let candles = make_candles(&[100.0, 85.0]);
        let df = frame(&[25.0, 50.0]);
        let row = df.row(1, &candles[1]);
        let t = step(&open_state(100.0, candles[0].time), &candles[1], &row, &spec(), &AllIn);
        let trade = t.trade.unwrap();
        assert_eq!(trade.reason.as_deref(), Some("Stoploss"));
        assert!(trade.profit.unwrap() < 0.0);
    }

    #[test]
    fn hold_tracks_highest_high() {
        let candles = make_candles(&[100.0, 104.0]);
        let df = frame(&[25.0, 50.0]);
        let row = df.row(1, &candles[1]);
        let t = step(&open_state(100.0, candles[0].time), &candles[1], &row, &spec(), &AllIn);
        assert!(t.trade.is_none());
        assert_eq!(t.state.position.position().unwrap().highest_price, 105.0);
    }

    #[test]
    fn fractional_stake_equity_keeps_cash() {
        let state = EngineState {
            balance: 1000.0,
            position: PositionState::InPosition(Position {
                entry_time: 0,
                entry_price: 100.0,
                amount: 2.5,
                stake: 250.0,
                highest_price: 100.0,
            }),
        };
        assert!((state.equity(120.0) - 1050.0).abs() < 1e-9);
    }
}
