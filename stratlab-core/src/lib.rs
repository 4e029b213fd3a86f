//! StratLab Core: strategy extraction, indicators, market data, simulation.
//!
//! This crate contains the offline backtesting pipeline:
//! - Domain types (candles, strategy spec, trades, results)
//! - StrategyExtractor: lexer, parser and extractor with diagnostics
//! - IndicatorEngine: declared indicators → index-aligned Dataframe
//! - MarketDataProvider: synthetic and Binance sources behind a TTL cache
//! - Simulator: single-position state machine with pure transitions

pub mod data;
pub mod domain;
pub mod engine;
pub mod indicators;
pub mod strategy;

pub use domain::{BacktestResult, Candle, StrategySpec, Timeframe};
pub use engine::{compute_indicators, simulate};
pub use strategy::{analyze, extract};
