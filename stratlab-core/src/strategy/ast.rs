//! Typed syntax tree for strategy scripts.
//!
//! Covers the subset of statement and expression shapes strategies are written
//! in. Anything outside it parses to [`Stmt::Other`] or [`Expr::Unknown`].

use std::fmt;

use crate::domain::CompareOp;

/// Name of the per-pair frame variable in strategy methods.
pub const FRAME_NAME: &str = "dataframe";

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    /// `class Name(...)`
    Class { name: String, line: usize },
    /// `target [: annotation] = value`
    Assign {
        target: Expr,
        value: Expr,
        line: usize,
    },
    /// Any other statement (def, return, if, imports, bare expressions, ...)
    Other { line: usize },
}

impl Stmt {
    pub fn line(&self) -> usize {
        match self {
            Stmt::Class { line, .. } | Stmt::Assign { line, .. } | Stmt::Other { line } => *line,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Pos,
    /// `~`
    Invert,
    /// `not`
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    MatMul,
    /// `&`
    BitAnd,
    /// `|`
    BitOr,
    /// `and`
    And,
    /// `or`
    Or,
}

impl BinaryOp {
    fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Pow => "**",
            BinaryOp::MatMul => "@",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitOr => "|",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
        }
    }
}

/// A call argument. `raw` is the argument's source text, kept for values that
/// are not literals (e.g. `self.buy_rsi.value`).
#[derive(Debug, Clone, PartialEq)]
pub struct Arg {
    pub name: Option<String>,
    pub value: Expr,
    pub raw: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Str(String),
    Bool(bool),
    None,
    Name(String),
    Attribute {
        value: Box<Expr>,
        attr: String,
    },
    Subscript {
        value: Box<Expr>,
        index: Vec<Expr>,
    },
    Call {
        func: Box<Expr>,
        args: Vec<Arg>,
    },
    List(Vec<Expr>),
    Tuple(Vec<Expr>),
    Dict(Vec<(Expr, Expr)>),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
    },
    Compare {
        left: Box<Expr>,
        op: CompareOp,
        right: Box<Expr>,
    },
    /// A construct the parser skipped (lambda, comprehension, slice, ternary, ...).
    Unknown,
}

impl Expr {
    /// Numeric literal value, looking through unary `+`/`-`.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Expr::Number(v) => Some(*v),
            Expr::Unary {
                op: UnaryOp::Neg,
                operand,
            } => operand.as_number().map(|v| -v),
            Expr::Unary {
                op: UnaryOp::Pos,
                operand,
            } => operand.as_number(),
            _ => None,
        }
    }

    pub fn as_name(&self) -> Option<&str> {
        match self {
            Expr::Name(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Expr::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Column name of a `dataframe['<name>']` access.
    pub fn as_column(&self) -> Option<&str> {
        match self {
            Expr::Subscript { value, index } if index.len() == 1 => {
                if value.as_name() == Some(FRAME_NAME) {
                    index[0].as_str()
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    /// `(module, function)` of a `module.function(...)` call target.
    pub fn as_module_function(&self) -> Option<(&str, &str)> {
        match self {
            Expr::Attribute { value, attr } => value.as_name().map(|m| (m, attr.as_str())),
            _ => None,
        }
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, items: &[Expr]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Number(v) => write!(f, "{v}"),
            Expr::Str(s) => write!(f, "'{s}'"),
            Expr::Bool(true) => f.write_str("True"),
            Expr::Bool(false) => f.write_str("False"),
            Expr::None => f.write_str("None"),
            Expr::Name(n) => f.write_str(n),
            Expr::Attribute { value, attr } => write!(f, "{value}.{attr}"),
            Expr::Subscript { value, index } => {
                write!(f, "{value}[")?;
                write_list(f, index)?;
                f.write_str("]")
            }
            Expr::Call { func, args } => {
                write!(f, "{func}(")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    if let Some(name) = &arg.name {
                        write!(f, "{name}=")?;
                    }
                    write!(f, "{}", arg.value)?;
                }
                f.write_str(")")
            }
            Expr::List(items) => {
                f.write_str("[")?;
                write_list(f, items)?;
                f.write_str("]")
            }
            Expr::Tuple(items) => {
                f.write_str("(")?;
                write_list(f, items)?;
                f.write_str(")")
            }
            Expr::Dict(entries) => {
                f.write_str("{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                f.write_str("}")
            }
            Expr::Unary { op, operand } => match op {
                UnaryOp::Neg => write!(f, "-{operand}"),
                UnaryOp::Pos => write!(f, "+{operand}"),
                UnaryOp::Invert => write!(f, "~{operand}"),
                UnaryOp::Not => write!(f, "not {operand}"),
            },
            Expr::Binary { left, op, right } => write!(f, "({left} {} {right})", op.symbol()),
            Expr::Compare { left, op, right } => write!(f, "({left} {op} {right})"),
            Expr::Unknown => f.write_str("<?>"),
        }
    }
}
