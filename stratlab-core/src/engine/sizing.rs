//! Position sizing: how much of the balance an entry commits.
//!
//! Sizers are balance-aware but signal-agnostic: they never decide whether to
//! enter, only how much capital the entry stakes.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::Candle;

pub trait Sizer: Send + Sync {
    /// Capital to commit from `balance` for an entry at `candle.close`.
    /// A non-positive stake refuses the entry.
    fn stake(&self, balance: f64, candle: &Candle) -> f64;

    /// Sizer name for logging.
    fn name(&self) -> &str;
}

/// Commit the whole balance.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllIn;

impl Sizer for AllIn {
    fn stake(&self, balance: f64, _candle: &Candle) -> f64 {
        balance
    }

    fn name(&self) -> &str {
        "all_in"
    }
}

/// Commit a fixed fraction of the current balance; the rest stays as cash.
#[derive(Debug, Clone, Copy)]
pub struct FractionOfBalance {
    fraction: f64,
}

impl FractionOfBalance {
    pub fn new(fraction: f64) -> Self {
        assert!(
            fraction > 0.0 && fraction <= 1.0,
            "fraction must be in (0, 1]"
        );
        Self { fraction }
    }

    pub fn fraction(&self) -> f64 {
        self.fraction
    }
}

impl Sizer for FractionOfBalance {
    fn stake(&self, balance: f64, _candle: &Candle) -> f64 {
        balance * self.fraction
    }

    fn name(&self) -> &str {
        "fraction_of_balance"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum SizingError {
    #[error("sizing fraction must be in (0, 1], got {0}")]
    InvalidFraction(f64),
}

/// Serializable sizing choice, e.g. `{ type = "FRACTION", fraction = 0.5 }`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SizingConfig {
    #[default]
    AllIn,
    Fraction { fraction: f64 },
}

impl SizingConfig {
    pub fn validate(&self) -> Result<(), SizingError> {
        match *self {
            SizingConfig::AllIn => Ok(()),
            SizingConfig::Fraction { fraction } if fraction > 0.0 && fraction <= 1.0 => Ok(()),
            SizingConfig::Fraction { fraction } => Err(SizingError::InvalidFraction(fraction)),
        }
    }

    pub fn build(&self) -> Result<Box<dyn Sizer>, SizingError> {
        self.validate()?;
        Ok(match *self {
            SizingConfig::AllIn => Box::new(AllIn),
            SizingConfig::Fraction { fraction } => Box::new(FractionOfBalance::new(fraction)),
        })
    }
}
