//! StrategyExtractor — strategy source text → [`StrategySpec`].
//!
//! Walks the parsed statement list and picks out:
//! - `class Name(...)` (first one)
//! - class settings: `timeframe`, `stoploss`, `minimal_roi`, `trailing_stop`
//! - indicator declarations: `dataframe['<name>'] = ta.<FUNC>(..., key=value)`
//! - signal blocks: `dataframe.loc[<conditions>, 'enter_long' | 'exit_long'] = ...`
//!
//! Extraction never fails. Anything missing takes its default and anything that
//! cannot be mapped is reported as a [`Diagnostic`]. Settings and signal blocks
//! use their first definition; a re-declared indicator column uses the last one,
//! matching what the script itself would compute.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::domain::{Condition, IndicatorConfig, ParamValue, RoiLadder, StrategySpec, Timeframe};

use super::ast::{Arg, BinaryOp, Expr, Stmt, UnaryOp, FRAME_NAME};
use super::diagnostics::{Diagnostic, DiagnosticKind};
use super::parser::parse;

/// Module aliases accepted for indicator calls.
const INDICATOR_MODULES: &[&str] = &["ta", "talib"];

/// Extracted spec plus everything the extractor could not use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Extraction {
    pub spec: StrategySpec,
    pub diagnostics: Vec<Diagnostic>,
}

/// Extract a spec and report unmatched constructs.
pub fn analyze(source: &str) -> Extraction {
    let mut extractor = Extractor::default();
    for stmt in parse(source) {
        extractor.visit(stmt);
    }
    extractor.finish()
}

/// Extract a spec; unmatched fields take their defaults.
pub fn extract(source: &str) -> StrategySpec {
    analyze(source).spec
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Signal {
    Entry,
    Exit,
}

impl Signal {
    fn marker(&self) -> &'static str {
        match self {
            Signal::Entry => "enter_long",
            Signal::Exit => "exit_long",
        }
    }
}

enum Marker {
    Signal(Signal),
    /// Tag columns ride along with signals and carry no rule.
    Tag,
    Unsupported,
}

fn classify_marker(name: &str) -> Marker {
    match name {
        "enter_long" | "buy" => Marker::Signal(Signal::Entry),
        "exit_long" | "sell" => Marker::Signal(Signal::Exit),
        "enter_tag" | "exit_tag" | "buy_tag" | "exit_reason" => Marker::Tag,
        _ => Marker::Unsupported,
    }
}

#[derive(Default)]
struct Extractor {
    class_name: Option<String>,
    timeframe: Option<Timeframe>,
    stoploss: Option<f64>,
    roi: Option<RoiLadder>,
    trailing_stop: Option<bool>,
    indicators: Vec<IndicatorConfig>,
    entry: Option<Vec<Condition>>,
    exit: Option<Vec<Condition>>,
    /// Settings and signals already assigned, valid or not.
    seen: HashSet<String>,
    diagnostics: Vec<Diagnostic>,
}

impl Extractor {
    fn visit(&mut self, stmt: Stmt) {
        match stmt {
            Stmt::Class { name, line } => {
                if let Some(first) = &self.class_name {
                    self.report(
                        line,
                        DiagnosticKind::DuplicateDefinition,
                        format!("class '{name}' ignored; using the first class '{first}'"),
                    );
                } else {
                    self.class_name = Some(name);
                }
            }
            Stmt::Assign {
                target,
                value,
                line,
            } => self.assignment(&target, &value, line),
            Stmt::Other { .. } => {}
        }
    }

    fn report(&mut self, line: usize, kind: DiagnosticKind, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic::at(line, kind, message));
    }

    /// Records `key` as seen; reports and returns false for a repeat.
    fn first_definition(&mut self, key: &str, line: usize) -> bool {
        if self.seen.insert(key.to_string()) {
            return true;
        }
        self.report(
            line,
            DiagnosticKind::DuplicateDefinition,
            format!("'{key}' is defined more than once; the first definition is used"),
        );
        false
    }

    fn assignment(&mut self, target: &Expr, value: &Expr, line: usize) {
        if let Some(name) = target.as_name() {
            match name {
                "timeframe" | "stoploss" | "minimal_roi" | "trailing_stop" => {
                    if self.first_definition(name, line) {
                        self.setting(name, value, line);
                    }
                }
                _ => {}
            }
            return;
        }

        if let Some(column) = target.as_column() {
            self.indicator(column, value, line);
            return;
        }

        if let Expr::Subscript {
            value: frame,
            index,
        } = target
        {
            let is_loc = matches!(
                frame.as_ref(),
                Expr::Attribute { value, attr } if attr == "loc" && value.as_name() == Some(FRAME_NAME)
            );
            if is_loc && index.len() == 2 {
                self.signal(&index[0], &index[1], line);
            }
        }
    }

    // ─── Settings ───────────────────────────────────────────────────

    fn setting(&mut self, name: &str, value: &Expr, line: usize) {
        match name {
            "timeframe" => match value.as_str().map(str::parse::<Timeframe>) {
                Some(Ok(tf)) => self.timeframe = Some(tf),
                Some(Err(e)) => self.report(
                    line,
                    DiagnosticKind::InvalidSetting,
                    format!("{e}; using {}", Timeframe::default()),
                ),
                None => self.report(
                    line,
                    DiagnosticKind::InvalidSetting,
                    format!(
                        "timeframe must be a string literal, found {value}; using {}",
                        Timeframe::default()
                    ),
                ),
            },
            "stoploss" => match value.as_number() {
                Some(v) => {
                    if v > 0.0 {
                        self.report(
                            line,
                            DiagnosticKind::InvalidSetting,
                            format!("stoploss {v} is positive; kept as written"),
                        );
                    }
                    self.stoploss = Some(v);
                }
                None => self.report(
                    line,
                    DiagnosticKind::InvalidSetting,
                    format!("stoploss must be a number, found {value}; using the default"),
                ),
            },
            "minimal_roi" => self.roi_ladder(value, line),
            "trailing_stop" => match value {
                Expr::Bool(b) => self.trailing_stop = Some(*b),
                other => self.report(
                    line,
                    DiagnosticKind::InvalidSetting,
                    format!("trailing_stop must be True or False, found {other}; using False"),
                ),
            },
            _ => {}
        }
    }

    fn roi_ladder(&mut self, value: &Expr, line: usize) {
        let Expr::Dict(entries) = value else {
            self.report(
                line,
                DiagnosticKind::InvalidSetting,
                format!("minimal_roi must be a dict literal, found {value}; using the default ladder"),
            );
            return;
        };

        let mut steps = BTreeMap::new();
        for (key, target) in entries {
            let minutes = match key {
                Expr::Str(s) => s.trim().parse::<u64>().ok(),
                Expr::Number(v) if *v >= 0.0 && v.fract() == 0.0 => Some(*v as u64),
                _ => None,
            };
            match (minutes, target.as_number()) {
                (Some(m), Some(t)) => {
                    steps.insert(m, t);
                }
                _ => self.report(
                    line,
                    DiagnosticKind::InvalidSetting,
                    format!("minimal_roi entry {key}: {target} ignored; expected \"<minutes>\": <fraction>"),
                ),
            }
        }

        if steps.is_empty() {
            self.report(
                line,
                DiagnosticKind::InvalidSetting,
                "minimal_roi has no usable entries; using the default ladder",
            );
        } else {
            self.roi = Some(RoiLadder::new(steps));
        }
    }

    // ─── Indicators ─────────────────────────────────────────────────

    fn indicator(&mut self, column: &str, value: &Expr, line: usize) {
        let call = match value {
            Expr::Call { func, args } => func
                .as_module_function()
                .filter(|(module, _)| INDICATOR_MODULES.contains(module))
                .map(|(_, function)| (function, args)),
            _ => None,
        };
        let Some((function, args)) = call else {
            self.report(
                line,
                DiagnosticKind::UnsupportedIndicator,
                format!("column '{column}' is assigned from {value}, not a ta.<FUNCTION>(...) call"),
            );
            return;
        };

        let mut config = IndicatorConfig::new(column, function);
        for (position, arg) in args.iter().enumerate() {
            match &arg.name {
                Some(key) => {
                    config.params.insert(key.clone(), coerce(arg));
                }
                // The first positional argument is the frame itself.
                None if position == 0 => {}
                None => self.report(
                    line,
                    DiagnosticKind::InvalidSetting,
                    format!(
                        "positional argument '{}' to ta.{function} ignored; pass parameters by keyword",
                        arg.raw
                    ),
                ),
            }
        }

        if let Some(existing) = self.indicators.iter_mut().find(|i| i.name == column) {
            self.diagnostics.push(Diagnostic::at(
                line,
                DiagnosticKind::DuplicateDefinition,
                format!("column '{column}' is computed more than once; the last definition is used"),
            ));
            *existing = config;
        } else {
            self.indicators.push(config);
        }
    }

    // ─── Signals ────────────────────────────────────────────────────

    fn signal(&mut self, conditions: &Expr, columns: &Expr, line: usize) {
        let names: Vec<&str> = match columns {
            Expr::Str(s) => vec![s.as_str()],
            Expr::List(items) | Expr::Tuple(items) => {
                items.iter().filter_map(Expr::as_str).collect()
            }
            _ => Vec::new(),
        };

        let mut signal = None;
        let mut unsupported = Vec::new();
        for name in &names {
            match classify_marker(name) {
                Marker::Signal(s) if signal.is_none() => signal = Some(s),
                Marker::Signal(_) | Marker::Tag => {}
                Marker::Unsupported => unsupported.push(*name),
            }
        }

        let Some(signal) = signal else {
            if !unsupported.is_empty() {
                self.report(
                    line,
                    DiagnosticKind::UnsupportedSignal,
                    format!(
                        "signal column '{}' ignored; only long entries and exits are simulated",
                        unsupported.join("', '")
                    ),
                );
            }
            return;
        };

        if !self.first_definition(signal.marker(), line) {
            return;
        }

        let mut collected = Vec::new();
        self.collect_conditions(conditions, line, &mut collected);
        if collected.is_empty() {
            self.report(
                line,
                DiagnosticKind::UnsupportedCondition,
                format!(
                    "'{}' block has no usable conditions and never fires",
                    signal.marker()
                ),
            );
        }
        match signal {
            Signal::Entry => self.entry = Some(collected),
            Signal::Exit => self.exit = Some(collected),
        }
    }

    /// Flatten a `&`-joined expression into comparisons against numeric thresholds.
    fn collect_conditions(&mut self, expr: &Expr, line: usize, out: &mut Vec<Condition>) {
        match expr {
            Expr::Binary {
                left,
                op: BinaryOp::BitAnd | BinaryOp::And,
                right,
            } => {
                self.collect_conditions(left, line, out);
                self.collect_conditions(right, line, out);
            }
            Expr::Compare { left, op, right } => {
                if let (Some(column), Some(threshold)) = (left.as_column(), right.as_number()) {
                    out.push(Condition::new(column, *op, threshold));
                } else if let (Some(threshold), Some(column)) = (left.as_number(), right.as_column())
                {
                    out.push(Condition::new(column, op.flipped(), threshold));
                } else {
                    self.report(
                        line,
                        DiagnosticKind::UnsupportedCondition,
                        format!("condition {expr} dropped; only dataframe['<name>'] OP <number> is supported"),
                    );
                }
            }
            Expr::Binary {
                op: BinaryOp::BitOr | BinaryOp::Or,
                ..
            } => self.report(
                line,
                DiagnosticKind::UnsupportedCondition,
                format!("disjunction {expr} dropped; conditions are combined with AND only"),
            ),
            Expr::Unary {
                op: UnaryOp::Invert | UnaryOp::Not,
                ..
            } => self.report(
                line,
                DiagnosticKind::UnsupportedCondition,
                format!("negated condition {expr} dropped"),
            ),
            other => self.report(
                line,
                DiagnosticKind::UnsupportedCondition,
                format!("condition {other} dropped; only dataframe['<name>'] OP <number> is supported"),
            ),
        }
    }

    // ─── Finish ─────────────────────────────────────────────────────

    fn finish(mut self) -> Extraction {
        let defaults = StrategySpec::default();

        if self.class_name.is_none() {
            self.missing(format!("no strategy class found; using '{}'", defaults.class_name));
        }
        for (key, message) in [
            ("timeframe", format!("no timeframe found; using {}", defaults.timeframe)),
            ("stoploss", format!("no stoploss found; using {}", defaults.stoploss)),
            ("minimal_roi", "no minimal_roi found; using the default ladder".to_string()),
            ("trailing_stop", "no trailing_stop found; using False".to_string()),
        ] {
            if !self.seen.contains(key) {
                self.missing(message);
            }
        }
        if self.entry.is_none() {
            self.diagnostics.push(Diagnostic::global(
                DiagnosticKind::MissingSignal,
                "no 'enter_long' signal found; the strategy never enters",
            ));
        }
        if self.exit.is_none() {
            self.diagnostics.push(Diagnostic::global(
                DiagnosticKind::MissingSignal,
                "no 'exit_long' signal found; exits rely on ROI and stoploss",
            ));
        }

        let spec = StrategySpec {
            class_name: self.class_name.unwrap_or(defaults.class_name),
            timeframe: self.timeframe.unwrap_or(defaults.timeframe),
            stoploss: self.stoploss.unwrap_or(defaults.stoploss),
            roi: self.roi.unwrap_or(defaults.roi),
            trailing_stop: self.trailing_stop.unwrap_or(defaults.trailing_stop),
            indicators: self.indicators,
            entry_conditions: self.entry.unwrap_or_default(),
            exit_conditions: self.exit.unwrap_or_default(),
        };

        Extraction {
            spec,
            diagnostics: self.diagnostics,
        }
    }

    fn missing(&mut self, message: String) {
        self.diagnostics
            .push(Diagnostic::global(DiagnosticKind::MissingSetting, message));
    }
}

/// Keyword argument value: number, boolean, string literal, or the raw source text.
fn coerce(arg: &Arg) -> ParamValue {
    if let Some(v) = arg.value.as_number() {
        return ParamValue::Number(v);
    }
    match &arg.value {
        Expr::Bool(b) => ParamValue::Bool(*b),
        Expr::Str(s) => ParamValue::Text(s.clone()),
        _ => ParamValue::Text(arg.raw.clone()),
    }
}
