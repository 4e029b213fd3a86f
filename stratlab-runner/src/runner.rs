//! Orchestrator — wires extraction, market data, indicators, and simulation.
//!
//! Entry points:
//! - `Orchestrator::run_backtest()`: strategy text + request → `RunReport`.
//! - `Orchestrator::run_extracted()`: same, for an already-extracted strategy.
//! - `Orchestrator::run_batch()`: independent requests in parallel on the rayon pool.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use stratlab_core::data::{
    BinanceProvider, CachedProvider, DataError, DataSource, FileStore, MarketDataProvider,
    SyntheticProvider,
};
use stratlab_core::domain::{BacktestResult, Candle};
use stratlab_core::engine::{DegradePolicy, IndicatorEngine, Simulator, SizingConfig};
use stratlab_core::strategy::{analyze, Diagnostic, Extraction};
use stratlab_core::{StrategySpec, Timeframe};

use crate::config::{BacktestSection, ConfigError, RunConfig, SourceKind};

/// Errors from the runner.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("data error: {0}")]
    Data(#[from] DataError),
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// Current schema version for persisted reports.
pub const SCHEMA_VERSION: u32 = 1;

/// What to run a strategy against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRequest {
    pub symbol: String,
    /// `None` uses the strategy's own timeframe.
    pub timeframe: Option<Timeframe>,
    pub months: u32,
    pub starting_balance: f64,
}

impl RunRequest {
    pub fn new(symbol: impl Into<String>, months: u32, starting_balance: f64) -> Self {
        Self {
            symbol: symbol.into(),
            timeframe: None,
            months,
            starting_balance,
        }
    }

    pub fn with_timeframe(mut self, timeframe: Timeframe) -> Self {
        self.timeframe = Some(timeframe);
        self
    }

    /// Same request for another symbol.
    pub fn for_symbol(&self, symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            ..self.clone()
        }
    }

    fn validate(&self) -> Result<(), RunError> {
        if self.symbol.trim().is_empty() {
            return Err(RunError::InvalidRequest("symbol must not be empty".into()));
        }
        if self.months == 0 {
            return Err(RunError::InvalidRequest("months must be >= 1".into()));
        }
        if !(self.starting_balance.is_finite() && self.starting_balance > 0.0) {
            return Err(RunError::InvalidRequest(format!(
                "starting balance must be positive, got {}",
                self.starting_balance
            )));
        }
        Ok(())
    }
}

impl From<&BacktestSection> for RunRequest {
    fn from(section: &BacktestSection) -> Self {
        Self {
            symbol: section.symbol.clone(),
            timeframe: section.timeframe,
            months: section.months,
            starting_balance: section.starting_balance,
        }
    }
}

/// Complete, self-describing output of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    /// Schema version for forward-compatible deserialization.
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub symbol: String,
    pub timeframe: Timeframe,
    pub months: u32,
    pub starting_balance: f64,
    pub strategy: StrategySpec,
    pub diagnostics: Vec<Diagnostic>,
    pub data_source: DataSource,
    /// BLAKE3 over the candle series the run saw.
    pub dataset_hash: String,
    pub candle_count: usize,
    pub warnings: Vec<String>,
    pub result: BacktestResult,
}

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

/// Composes the pipeline stages around one market data provider.
pub struct Orchestrator {
    provider: Box<dyn MarketDataProvider>,
    engine: IndicatorEngine,
    sizing: SizingConfig,
}

impl Orchestrator {
    pub fn new(provider: Box<dyn MarketDataProvider>) -> Self {
        Self {
            provider,
            engine: IndicatorEngine::default(),
            sizing: SizingConfig::default(),
        }
    }

    /// Provider, cache, and simulation settings from a run config.
    pub fn from_config(config: &RunConfig) -> Result<Self, RunError> {
        config.validate()?;

        let source: Box<dyn MarketDataProvider> = match config.data.source {
            SourceKind::Synthetic => Box::new(SyntheticProvider::new(config.data.base_price)),
            SourceKind::Binance => {
                let mut provider = BinanceProvider::new()?;
                if let Some(url) = &config.data.binance_url {
                    provider = provider.with_base_url(url.as_str());
                }
                Box::new(provider)
            }
        };
        let cached = CachedProvider::new(source, FileStore::new(&config.data.cache_dir))
            .with_ttl(config.data.cache_ttl());

        Ok(Self::new(Box::new(cached))
            .with_degrade_policy(config.simulation.degraded_indicators)
            .with_sizing(config.simulation.sizing))
    }

    pub fn with_degrade_policy(mut self, policy: DegradePolicy) -> Self {
        self.engine = IndicatorEngine::new(policy);
        self
    }

    pub fn with_sizing(mut self, sizing: SizingConfig) -> Self {
        self.sizing = sizing;
        self
    }

    pub fn provider(&self) -> &dyn MarketDataProvider {
        self.provider.as_ref()
    }

    /// Extract `source`, then run it against `request`.
    pub fn run_backtest(&self, source: &str, request: &RunRequest) -> Result<RunReport, RunError> {
        let extraction = analyze(source);
        self.run_extracted(&extraction, request)
    }

    /// Run an extracted strategy: fetch → indicators → simulate.
    pub fn run_extracted(
        &self,
        extraction: &Extraction,
        request: &RunRequest,
    ) -> Result<RunReport, RunError> {
        request.validate()?;
        let sizer = self.sizing.build().map_err(ConfigError::from)?;

        let spec = &extraction.spec;
        let timeframe = request.timeframe.unwrap_or(spec.timeframe);

        let fetched = self
            .provider
            .fetch(&request.symbol, timeframe, request.months)?;
        let candles = fetched.candles;

        let mut warnings: Vec<String> = extraction
            .diagnostics
            .iter()
            .map(ToString::to_string)
            .collect();
        warnings.extend(fetched.warnings);

        let computed = self.engine.compute(&candles, &spec.indicators);
        warnings.extend(computed.warnings);

        let mut result = Simulator::new(sizer).run(
            &candles,
            &computed.dataframe,
            spec,
            request.starting_balance,
        );

        if !warnings.is_empty() {
            warn!(
                symbol = %request.symbol,
                count = warnings.len(),
                "run completed with warnings"
            );
        }
        let mut logs: Vec<String> = warnings.iter().map(|w| format!("[WARNING] {w}")).collect();
        logs.append(&mut result.logs);
        result.logs = logs;

        info!(
            strategy = %spec.class_name,
            symbol = %request.symbol,
            %timeframe,
            source = %fetched.source,
            candles = candles.len(),
            trades = result.total_trades,
            final_balance = result.final_balance,
            "backtest finished"
        );

        Ok(RunReport {
            schema_version: SCHEMA_VERSION,
            symbol: request.symbol.clone(),
            timeframe,
            months: request.months,
            starting_balance: request.starting_balance,
            strategy: spec.clone(),
            diagnostics: extraction.diagnostics.clone(),
            data_source: fetched.source,
            dataset_hash: dataset_hash(&candles),
            candle_count: candles.len(),
            warnings,
            result,
        })
    }

    /// Run one strategy against many requests in parallel.
    ///
    /// Results are returned in request order; one failure does not stop the others.
    pub fn run_batch(
        &self,
        source: &str,
        requests: &[RunRequest],
    ) -> Vec<Result<RunReport, RunError>> {
        let extraction = analyze(source);
        requests
            .par_iter()
            .map(|request| self.run_extracted(&extraction, request))
            .collect()
    }
}

/// Deterministic BLAKE3 hash over the candle series.
pub fn dataset_hash(candles: &[Candle]) -> String {
    let mut hasher = blake3::Hasher::new();
    for candle in candles {
        hasher.update(&candle.time.to_le_bytes());
        hasher.update(&candle.open.to_le_bytes());
        hasher.update(&candle.high.to_le_bytes());
        hasher.update(&candle.low.to_le_bytes());
        hasher.update(&candle.close.to_le_bytes());
        hasher.update(&candle.volume.to_le_bytes());
    }
    hasher.finalize().to_hex().to_string()
}
