//! Domain types for StratLab

pub mod candle;
pub mod result;
pub mod strategy;
pub mod timeframe;
pub mod trade;

pub use candle::{format_timestamp, Candle};
pub use result::BacktestResult;
pub use strategy::{CompareOp, Condition, IndicatorConfig, ParamValue, RoiLadder, StrategySpec};
pub use timeframe::{Timeframe, TimeframeError};
pub use trade::{EquityPoint, Trade, TradeKind};
