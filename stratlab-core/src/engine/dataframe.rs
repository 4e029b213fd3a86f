//! Named, index-aligned indicator series.
//!
//! Built once before the simulation loop, then queried by candle index.
//! Every column has exactly `len()` entries; `NaN` marks an unavailable value.

use std::collections::BTreeMap;

use crate::domain::Candle;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataframe {
    len: usize,
    columns: BTreeMap<String, Vec<f64>>,
}

impl Dataframe {
    /// An empty frame for `len` candles.
    pub fn new(len: usize) -> Self {
        Self {
            len,
            columns: BTreeMap::new(),
        }
    }

    /// Number of rows (candles).
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Insert or replace a named column. The series is padded with `NaN` or
    /// truncated so it always spans the frame.
    pub fn insert(&mut self, name: impl Into<String>, mut values: Vec<f64>) {
        values.resize(self.len, f64::NAN);
        self.columns.insert(name.into(), values);
    }

    /// Value at a row, or `None` if the column is missing, the index is out of
    /// range, or the value is unavailable.
    pub fn get(&self, name: &str, index: usize) -> Option<f64> {
        self.columns
            .get(name)
            .and_then(|v| v.get(index).copied())
            .filter(|v| !v.is_nan())
    }

    pub fn series(&self, name: &str) -> Option<&[f64]> {
        self.columns.get(name).map(|v| v.as_slice())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(|k| k.as_str())
    }

    /// Number of columns.
    pub fn width(&self) -> usize {
        self.columns.len()
    }

    /// Row view at `index`, falling back to the candle's own price columns.
    pub fn row<'a>(&'a self, index: usize, candle: &'a Candle) -> DataRow<'a> {
        DataRow {
            frame: self,
            index,
            candle,
        }
    }
}

/// One row of the frame plus the candle it belongs to.
#[derive(Debug, Clone, Copy)]
pub struct DataRow<'a> {
    frame: &'a Dataframe,
    index: usize,
    candle: &'a Candle,
}

impl<'a> DataRow<'a> {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn candle(&self) -> &'a Candle {
        self.candle
    }

    /// Resolve a column: frame first, then `open/high/low/close/volume`.
    pub fn value(&self, name: &str) -> Option<f64> {
        if self.frame.contains(name) {
            return self.frame.get(name, self.index);
        }
        self.candle.column(name).filter(|v| !v.is_nan())
    }

    /// True when every named column resolves to an available value.
    pub fn has_all<'n>(&self, mut names: impl Iterator<Item = &'n str>) -> bool {
        names.all(|n| self.value(n).is_some())
    }
}
