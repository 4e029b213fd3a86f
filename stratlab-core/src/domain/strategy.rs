//! StrategySpec — the normalized, immutable description of a strategy.
//!
//! Produced by `strategy::extract` from strategy source text and consumed by the
//! indicator engine (declarations) and the simulator (rules).

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::timeframe::Timeframe;

pub const DEFAULT_CLASS_NAME: &str = "UnnamedStrategy";
pub const DEFAULT_STOPLOSS: f64 = -0.10;

/// Target used when the ladder has neither a matching key nor a `0` entry.
pub const FALLBACK_ROI_TARGET: f64 = 0.1;

/// Complete strategy description. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategySpec {
    pub class_name: String,
    pub timeframe: Timeframe,
    /// Negative fraction, e.g. -0.10 for a 10% stop.
    pub stoploss: f64,
    pub roi: RoiLadder,
    /// Declared only; the simulator does not evaluate trailing stops.
    pub trailing_stop: bool,
    pub indicators: Vec<IndicatorConfig>,
    pub entry_conditions: Vec<Condition>,
    pub exit_conditions: Vec<Condition>,
}

impl Default for StrategySpec {
    fn default() -> Self {
        Self {
            class_name: DEFAULT_CLASS_NAME.to_string(),
            timeframe: Timeframe::default(),
            stoploss: DEFAULT_STOPLOSS,
            roi: RoiLadder::default(),
            trailing_stop: false,
            indicators: Vec::new(),
            entry_conditions: Vec::new(),
            exit_conditions: Vec::new(),
        }
    }
}

impl StrategySpec {
    /// Names of every declared indicator, in declaration order.
    pub fn indicator_names(&self) -> impl Iterator<Item = &str> {
        self.indicators.iter().map(|i| i.name.as_str())
    }
}

// ─── ROI ladder ─────────────────────────────────────────────────────

/// Minutes-since-entry → minimum profit fraction. A step function of elapsed time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoiLadder(BTreeMap<u64, f64>);

impl RoiLadder {
    pub fn new(steps: BTreeMap<u64, f64>) -> Self {
        Self(steps)
    }

    pub fn from_pairs(pairs: &[(u64, f64)]) -> Self {
        Self(pairs.iter().copied().collect())
    }

    /// Target fraction in force after `minutes_elapsed` minutes.
    ///
    /// Scans keys in descending order and returns the first key ≤ `minutes_elapsed`.
    /// Falls back to the `0` entry, then to [`FALLBACK_ROI_TARGET`].
    pub fn target(&self, minutes_elapsed: f64) -> f64 {
        self.0
            .iter()
            .rev()
            .find(|&(&minutes, _)| minutes as f64 <= minutes_elapsed)
            .map(|(_, &target)| target)
            .or_else(|| self.0.get(&0).copied())
            .unwrap_or(FALLBACK_ROI_TARGET)
    }

    pub fn steps(&self) -> &BTreeMap<u64, f64> {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for RoiLadder {
    fn default() -> Self {
        Self::from_pairs(&[(0, 0.10), (30, 0.05), (60, 0.03), (120, 0.01)])
    }
}

// ─── Indicator declarations ─────────────────────────────────────────

/// A keyword argument value after coercion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Number(f64),
    Bool(bool),
    Text(String),
}

impl ParamValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            ParamValue::Number(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Number(v) => write!(f, "{v}"),
            ParamValue::Bool(b) => write!(f, "{b}"),
            ParamValue::Text(s) => write!(f, "'{s}'"),
        }
    }
}

/// One requested indicator series: `dataframe['<name>'] = ta.<function>(..., key=value)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndicatorConfig {
    pub name: String,
    /// Function kind as written in the source, e.g. `RSI`. Matched case-insensitively.
    #[serde(rename = "functionKind")]
    pub function: String,
    pub params: BTreeMap<String, ParamValue>,
}

impl IndicatorConfig {
    pub fn new(name: impl Into<String>, function: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            function: function.into(),
            params: BTreeMap::new(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: ParamValue) -> Self {
        self.params.insert(key.into(), value);
        self
    }
}

// ─── Conditions ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompareOp {
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
}

impl CompareOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            CompareOp::Gt => ">",
            CompareOp::Lt => "<",
            CompareOp::Ge => ">=",
            CompareOp::Le => "<=",
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
        }
    }

    pub fn from_symbol(s: &str) -> Option<Self> {
        match s {
            ">" => Some(CompareOp::Gt),
            "<" => Some(CompareOp::Lt),
            ">=" => Some(CompareOp::Ge),
            "<=" => Some(CompareOp::Le),
            "==" => Some(CompareOp::Eq),
            "!=" => Some(CompareOp::Ne),
            _ => None,
        }
    }

    /// The operator with its operands swapped: `a OP b` ⇔ `b OP.flipped() a`.
    pub fn flipped(&self) -> Self {
        match self {
            CompareOp::Gt => CompareOp::Lt,
            CompareOp::Lt => CompareOp::Gt,
            CompareOp::Ge => CompareOp::Le,
            CompareOp::Le => CompareOp::Ge,
            CompareOp::Eq => CompareOp::Eq,
            CompareOp::Ne => CompareOp::Ne,
        }
    }

    pub fn apply(&self, lhs: f64, rhs: f64) -> bool {
        match self {
            CompareOp::Gt => lhs > rhs,
            CompareOp::Lt => lhs < rhs,
            CompareOp::Ge => lhs >= rhs,
            CompareOp::Le => lhs <= rhs,
            CompareOp::Eq => lhs == rhs,
            CompareOp::Ne => lhs != rhs,
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// `<indicator> OP <threshold>`, evaluated at a single candle index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "indicatorName")]
    pub indicator: String,
    #[serde(rename = "comparisonOperator")]
    pub op: CompareOp,
    pub threshold: f64,
}

impl Condition {
    pub fn new(indicator: impl Into<String>, op: CompareOp, threshold: f64) -> Self {
        Self {
            indicator: indicator.into(),
            op,
            threshold,
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.indicator, self.op, self.threshold)
    }
}
