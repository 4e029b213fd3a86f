//! Extractor behavior on realistic strategy files.

use stratlab_core::domain::{CompareOp, Condition, ParamValue, RoiLadder, Timeframe};
use stratlab_core::strategy::{analyze, DiagnosticKind};
use stratlab_core::{extract, StrategySpec};

const MACD_CROSS: &str = r#"
# pragma pylint: disable=missing-docstring
from functools import reduce

import talib.abstract as ta
from pandas import DataFrame

from freqtrade.strategy import IStrategy, IntParameter


class MacdCross(IStrategy):
    """
    Buys on MACD momentum with a stochastic filter.
    """
    INTERFACE_VERSION: int = 3

    minimal_roi = {
        "0": 0.10,
        "40": 0.04,
        "120": 0.0
    }

    stoploss = -0.05
    trailing_stop = True
    timeframe = '1h'

    buy_rsi = IntParameter(20, 40, default=30, space="buy")

    def informative_pairs(self):
        return []

    def populate_indicators(self, dataframe: DataFrame, metadata: dict) -> DataFrame:
        macd = ta.MACD(dataframe)
        dataframe['macd'] = macd['macd']
        dataframe['macdsignal'] = ta.MACD(dataframe, fastperiod=12, slowperiod=26, signalperiod=9)
        dataframe['slowk'] = ta.STOCH(dataframe, fastk_period=5, slowk_period=3, slowd_period=3)
        dataframe['atr'] = ta.ATR(dataframe, timeperiod=14)
        dataframe['sma_long'] = ta.SMA(dataframe, timeperiod=200)
        dataframe['hl2'] = (dataframe['high'] + dataframe['low']) / 2
        return dataframe

    def populate_entry_trend(self, dataframe: DataFrame, metadata: dict) -> DataFrame:
        dataframe.loc[
            (
                (dataframe['macdsignal'] > 0) &
                (dataframe['slowk'] < 20) &
                (dataframe['close'] > dataframe['sma_long'])
            ),
            ['enter_long', 'enter_tag']] = (1, 'macd_cross')
        return dataframe

    def populate_exit_trend(self, dataframe: DataFrame, metadata: dict) -> DataFrame:
        dataframe.loc[
            (
                (dataframe['slowk'] > 80)
            ),
            'exit_long'] = 1
        return dataframe
"#;

#[test]
fn settings_are_extracted() {
    let spec = extract(MACD_CROSS);
    assert_eq!(spec.class_name, "MacdCross");
    assert_eq!(spec.timeframe, Timeframe::H1);
    assert_eq!(spec.stoploss, -0.05);
    assert!(spec.trailing_stop);
    assert_eq!(
        spec.roi,
        RoiLadder::from_pairs(&[(0, 0.10), (40, 0.04), (120, 0.0)])
    );
}

#[test]
fn indicator_calls_become_configs() {
    let spec = extract(MACD_CROSS);
    let names: Vec<&str> = spec.indicators.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, ["macdsignal", "slowk", "atr", "sma_long"]);

    let stoch = &spec.indicators[1];
    assert_eq!(stoch.function, "STOCH");
    assert_eq!(stoch.params.get("fastk_period"), Some(&ParamValue::Number(5.0)));
    assert_eq!(stoch.params.get("slowd_period"), Some(&ParamValue::Number(3.0)));
}

#[test]
fn unsupported_shapes_are_diagnosed_not_fatal() {
    let extraction = analyze(MACD_CROSS);
    let spec = extraction.spec;

    // The column-vs-column comparison is dropped, numeric ones survive
    assert_eq!(
        spec.entry_conditions,
        vec![
            Condition::new("macdsignal", CompareOp::Gt, 0.0),
            Condition::new("slowk", CompareOp::Lt, 20.0),
        ]
    );
    assert_eq!(
        spec.exit_conditions,
        vec![Condition::new("slowk", CompareOp::Gt, 80.0)]
    );

    let kinds: Vec<DiagnosticKind> = extraction.diagnostics.iter().map(|d| d.kind).collect();
    assert!(kinds.contains(&DiagnosticKind::UnsupportedCondition));
    assert!(kinds.contains(&DiagnosticKind::UnsupportedIndicator));
    assert!(extraction.diagnostics.iter().all(|d| d.line.is_none() || d.line > Some(0)));
}

#[test]
fn empty_source_yields_defaults() {
    let extraction = analyze("");
    assert_eq!(extraction.spec, StrategySpec::default());
    assert!(extraction
        .diagnostics
        .iter()
        .any(|d| d.kind == DiagnosticKind::MissingSignal));
}

#[test]
fn garbage_source_yields_defaults() {
    let spec = extract("}{ this is ::: not a strategy (((\n\t");
    assert_eq!(spec.timeframe, StrategySpec::default().timeframe);
    assert!(spec.entry_conditions.is_empty());
    assert!(spec.exit_conditions.is_empty());
}

#[test]
fn extraction_is_deterministic() {
    assert_eq!(analyze(MACD_CROSS), analyze(MACD_CROSS));
}

#[test]
fn spec_json_uses_camel_case() {
    let spec = extract(MACD_CROSS);
    let json = serde_json::to_value(&spec).unwrap();
    assert_eq!(json["className"], "MacdCross");
    assert_eq!(json["timeframe"], "1h");
    assert!(json["entryConditions"].is_array());
    assert_eq!(json["roi"]["40"], 0.04);

    let indicator = &json["indicators"][1];
    assert_eq!(indicator["functionKind"], "STOCH");
    assert!(indicator.get("function").is_none());

    let condition = &json["entryConditions"][1];
    assert_eq!(condition["indicatorName"], "slowk");
    assert_eq!(condition["comparisonOperator"], "<");
    assert_eq!(condition["threshold"], 20.0);
    assert!(condition.get("indicator").is_none());
    assert!(condition.get("op").is_none());

    let back: StrategySpec = serde_json::from_value(json).unwrap();
    assert_eq!(back, spec);
}

// ── Pathological input ──

fn nested_entry(levels: usize) -> String {
    format!(
        "dataframe.loc[{}dataframe['rsi'] < 30{}, 'enter_long'] = 1",
        "(".repeat(levels),
        ")".repeat(levels)
    )
}

#[test]
fn deeply_nested_condition_is_dropped_with_a_diagnostic() {
    let extraction = analyze(&nested_entry(100_000));
    assert!(extraction.spec.entry_conditions.is_empty());
    assert!(extraction
        .diagnostics
        .iter()
        .any(|d| d.kind == DiagnosticKind::UnsupportedCondition));
}

#[test]
fn moderately_nested_condition_is_kept() {
    let spec = extract(&nested_entry(40));
    assert_eq!(
        spec.entry_conditions,
        vec![Condition::new("rsi", CompareOp::Lt, 30.0)]
    );
}

#[test]
fn runaway_sign_chain_falls_back_to_default_stoploss() {
    let extraction = analyze(&format!("stoploss = {}0.1", "-".repeat(500_000)));
    assert_eq!(extraction.spec.stoploss, StrategySpec::default().stoploss);
    assert!(extraction
        .diagnostics
        .iter()
        .any(|d| d.kind == DiagnosticKind::InvalidSetting));
}
