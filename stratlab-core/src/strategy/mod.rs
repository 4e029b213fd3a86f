//! StrategyExtractor: strategy source text → StrategySpec.
//!
//! Three stages: [`lexer`] produces tokens, [`parser`] builds a typed
//! [`ast`], and [`extract`] maps the statements it recognizes onto a
//! `StrategySpec`, reporting the rest as [`Diagnostic`]s.

pub mod ast;
pub mod diagnostics;
pub mod extract;
pub mod lexer;
pub mod parser;

pub use diagnostics::{Diagnostic, DiagnosticKind};
pub use extract::{analyze, extract, Extraction};
