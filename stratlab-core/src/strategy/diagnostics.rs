//! Diagnostics for strategy constructs the extractor could not use.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiagnosticKind {
    /// A setting was not found; its default is in effect.
    MissingSetting,
    /// No entry or exit signal block was found.
    MissingSignal,
    /// A setting was found but its value could not be used.
    InvalidSetting,
    /// A dataframe column assignment that is not an indicator call.
    UnsupportedIndicator,
    /// A condition shape other than `dataframe['<name>'] OP <number>`.
    UnsupportedCondition,
    /// A signal column other than the long entry/exit markers.
    UnsupportedSignal,
    /// A second definition of something already defined.
    DuplicateDefinition,
}

/// One finding, optionally tied to a 1-based source line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
    pub kind: DiagnosticKind,
    pub message: String,
}

impl Diagnostic {
    pub fn at(line: usize, kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            line: Some(line),
            kind,
            message: message.into(),
        }
    }

    pub fn global(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            line: None,
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "line {line}: {}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_line() {
        let d = Diagnostic::at(7, DiagnosticKind::InvalidSetting, "bad timeframe");
        assert_eq!(d.to_string(), "line 7: bad timeframe");
        let g = Diagnostic::global(DiagnosticKind::MissingSetting, "no stoploss");
        assert_eq!(g.to_string(), "no stoploss");
    }

    #[test]
    fn kind_serializes_screaming() {
        let json = serde_json::to_string(&DiagnosticKind::UnsupportedCondition).unwrap();
        assert_eq!(json, "\"UNSUPPORTED_CONDITION\"");
    }
}
