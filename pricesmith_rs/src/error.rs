use chrono::NaiveDate;
use thiserror::Error;

pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// Failures raised by normalization and feature computation.
///
/// Short history is not an error: warmup rows carry undefined cells and the
/// finalizer removes them.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EngineError {
    /// A required base, label, or feature input column is missing.
    #[error("schema error: missing column '{column}' ({context})")]
    Schema { column: String, context: String },

    /// A date or numeric cell could not be parsed.
    #[error("parse error at row {row}, column '{column}': cannot parse '{value}' ({reason})")]
    Parse {
        row: usize,
        column: String,
        value: String,
        reason: String,
    },

    /// Two input rows share the same trading date.
    #[error("duplicate trading date {date} (input rows {first_row} and {second_row})")]
    DuplicateDate {
        date: NaiveDate,
        first_row: usize,
        second_row: usize,
    },

    /// A feature configuration value is unusable (zero window, bad multiplier).
    #[error("invalid feature configuration: {0}")]
    Config(String),
}

impl EngineError {
    pub fn missing_column(column: impl Into<String>, context: impl Into<String>) -> Self {
        Self::Schema {
            column: column.into(),
            context: context.into(),
        }
    }

    pub fn parse(
        row: usize,
        column: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Parse {
            row,
            column: column.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    pub fn is_schema(&self) -> bool {
        matches!(self, Self::Schema { .. })
    }
}
