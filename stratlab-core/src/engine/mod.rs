//! Backtesting engine: indicator precomputation and the candle-by-candle loop.
//!
//! 1. [`IndicatorEngine`] computes every declared indicator once into a [`Dataframe`].
//! 2. [`Simulator`] walks the candles, advancing the Flat/InPosition state machine
//!    via the pure [`step`] function.
//! 3. [`metrics`] derives the summary statistics from the ledger and equity curve.

pub mod compute;
pub mod dataframe;
pub mod metrics;
pub mod simulate;
pub mod sizing;
pub mod state;

pub use compute::{
    build_indicator, compute_indicators, ComputedIndicators, DegradePolicy, IndicatorEngine,
    IndicatorError,
};
pub use dataframe::{DataRow, Dataframe};
pub use simulate::{simulate, Simulator};
pub use sizing::{AllIn, FractionOfBalance, Sizer, SizingConfig, SizingError};
pub use state::{step, EngineState, Position, PositionState, Transition};
