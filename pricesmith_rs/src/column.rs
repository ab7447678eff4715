use std::collections::HashMap;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

/// How a column is serialized.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    Float,
    /// Whole numbers (volume, calendar fields, 0/1 flags); written without a
    /// fractional part.
    Integer,
}

/// Whether an undefined cell in this column removes the row during pruning.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Requirement {
    Required,
    /// Forward-looking target column; exempt from pruning unless promoted.
    Lookahead,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureFamily {
    Base,
    PriceStructure,
    MovingAverage,
    Volatility,
    Momentum,
    Bollinger,
    Volume,
    Lag,
    RateOfChange,
    SupportResistance,
    Calendar,
    Trend,
    Target,
}

impl FeatureFamily {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Base => "base",
            Self::PriceStructure => "price_structure",
            Self::MovingAverage => "moving_average",
            Self::Volatility => "volatility",
            Self::Momentum => "momentum",
            Self::Bollinger => "bollinger",
            Self::Volume => "volume",
            Self::Lag => "lag",
            Self::RateOfChange => "rate_of_change",
            Self::SupportResistance => "support_resistance",
            Self::Calendar => "calendar",
            Self::Trend => "trend",
            Self::Target => "target",
        }
    }
}

impl fmt::Display for FeatureFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named series of optional values aligned with the table's dates.
#[derive(Clone, Debug, PartialEq)]
pub struct Column {
    pub name: String,
    pub family: FeatureFamily,
    pub kind: ColumnKind,
    pub requirement: Requirement,
    pub values: Vec<Option<f64>>,
}

impl Column {
    pub fn new(
        name: impl Into<String>,
        family: FeatureFamily,
        kind: ColumnKind,
        requirement: Requirement,
        values: Vec<Option<f64>>,
    ) -> Self {
        Self {
            name: name.into(),
            family,
            kind,
            requirement,
            values,
        }
    }

    pub fn base(name: impl Into<String>, kind: ColumnKind, values: Vec<Option<f64>>) -> Self {
        Self::new(name, FeatureFamily::Base, kind, Requirement::Required, values)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn is_required(&self) -> bool {
        self.requirement == Requirement::Required
    }

    /// Index of the first defined cell, if any.
    pub fn first_defined(&self) -> Option<usize> {
        self.values.iter().position(Option::is_some)
    }

    /// Index of the last defined cell, if any.
    pub fn last_defined(&self) -> Option<usize> {
        self.values.iter().rposition(Option::is_some)
    }

    pub fn undefined_count(&self) -> usize {
        self.values.iter().filter(|value| value.is_none()).count()
    }
}

/// Date-indexed table of base and derived columns.
///
/// Row identifiers are positions; they are re-sequenced whenever rows are
/// filtered out.
#[derive(Clone, Debug, PartialEq)]
pub struct FeatureTable {
    dates: Vec<NaiveDate>,
    columns: Vec<Column>,
    index: HashMap<String, usize>,
}

impl FeatureTable {
    pub fn new(dates: Vec<NaiveDate>) -> Self {
        Self {
            dates,
            columns: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub fn push_column(&mut self, column: Column) -> EngineResult<()> {
        if column.len() != self.dates.len() {
            return Err(EngineError::Config(format!(
                "column '{}' has {} rows but the table has {}",
                column.name,
                column.len(),
                self.dates.len()
            )));
        }
        if self.index.contains_key(&column.name) {
            return Err(EngineError::Config(format!(
                "column '{}' is defined twice",
                column.name
            )));
        }
        self.index.insert(column.name.clone(), self.columns.len());
        self.columns.push(column);
        Ok(())
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|column| column.name.as_str()).collect()
    }

    pub fn height(&self) -> usize {
        self.dates.len()
    }

    /// Number of value columns (the date index is not counted).
    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.index.get(name).map(|&idx| &self.columns[idx])
    }

    pub fn values(&self, name: &str) -> EngineResult<&[Option<f64>]> {
        self.column(name)
            .map(|column| column.values.as_slice())
            .ok_or_else(|| EngineError::missing_column(name, "not present in feature table"))
    }

    pub fn value(&self, name: &str, row: usize) -> Option<f64> {
        self.column(name)
            .and_then(|column| column.values.get(row).copied().flatten())
    }

    pub fn first_defined_row(&self, name: &str) -> Option<usize> {
        self.column(name).and_then(Column::first_defined)
    }

    /// True when every required column is defined on `row`.
    pub fn row_is_complete(&self, row: usize) -> bool {
        self.columns
            .iter()
            .filter(|column| column.is_required())
            .all(|column| column.values[row].is_some())
    }

    /// Keep the rows whose mask entry is true, in order. Retained values are
    /// copied untouched.
    pub fn filter_rows(&self, keep: &[bool]) -> EngineResult<Self> {
        if keep.len() != self.height() {
            return Err(EngineError::Config(format!(
                "row mask has {} entries but the table has {} rows",
                keep.len(),
                self.height()
            )));
        }
        let dates = self
            .dates
            .iter()
            .zip(keep)
            .filter(|(_, keep)| **keep)
            .map(|(date, _)| *date)
            .collect();
        let columns = self
            .columns
            .iter()
            .map(|column| Column {
                values: column
                    .values
                    .iter()
                    .zip(keep)
                    .filter(|(_, keep)| **keep)
                    .map(|(value, _)| *value)
                    .collect(),
                ..column.clone()
            })
            .collect();
        Ok(Self {
            dates,
            columns,
            index: self.index.clone(),
        })
    }

    /// Column counts per family, in family order.
    pub fn family_counts(&self) -> Vec<(FeatureFamily, usize)> {
        let mut counts: Vec<(FeatureFamily, usize)> = Vec::new();
        for column in &self.columns {
            match counts.iter_mut().find(|(family, _)| *family == column.family) {
                Some((_, count)) => *count += 1,
                None => counts.push((column.family, 1)),
            }
        }
        counts.sort_by_key(|(family, _)| *family);
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dates(n: usize) -> Vec<NaiveDate> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        (0..n)
            .map(|i| start + chrono::Duration::days(i as i64))
            .collect()
    }

    #[test]
    fn filter_rows_keeps_values_and_order() {
        let mut table = FeatureTable::new(dates(4));
        table
            .push_column(Column::base(
                "close",
                ColumnKind::Float,
                vec![Some(1.0), None, Some(3.0), Some(4.0)],
            ))
            .unwrap();
        let filtered = table.filter_rows(&[false, true, true, true]).unwrap();
        assert_eq!(filtered.height(), 3);
        assert_eq!(filtered.values("close").unwrap(), &[None, Some(3.0), Some(4.0)]);
        assert_eq!(filtered.dates()[0], dates(4)[1]);
    }

    #[test]
    fn duplicate_column_names_are_rejected() {
        let mut table = FeatureTable::new(dates(1));
        table
            .push_column(Column::base("close", ColumnKind::Float, vec![Some(1.0)]))
            .unwrap();
        let err = table
            .push_column(Column::base("close", ColumnKind::Float, vec![Some(2.0)]))
            .unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
    }

    #[test]
    fn lookahead_columns_do_not_block_completeness() {
        let mut table = FeatureTable::new(dates(2));
        table
            .push_column(Column::base("close", ColumnKind::Float, vec![Some(1.0), Some(2.0)]))
            .unwrap();
        table
            .push_column(Column::new(
                "next_day_return",
                FeatureFamily::Target,
                ColumnKind::Float,
                Requirement::Lookahead,
                vec![Some(1.0), None],
            ))
            .unwrap();
        assert!(table.row_is_complete(1));
    }
}
