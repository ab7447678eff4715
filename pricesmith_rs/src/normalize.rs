//! Series normalization: loosely typed rows in, a validated date-ascending
//! [`DailySeries`] out.
//!
//! Rows may arrive in any order. Dates must match [`DATE_FORMAT`] exactly,
//! duplicates are rejected rather than merged, and every OHLCV cell must
//! parse. The label column is optional at this stage.

use std::collections::HashMap;

use chrono::NaiveDate;

use crate::config::{DATE_FORMAT, InputSchema};
use crate::error::{EngineError, EngineResult};
use crate::series::{DailySeries, TradingDay};

/// Text cells keyed by header, as read from a delimited file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawFrame {
    headers: Vec<String>,
    columns: HashMap<String, Vec<Option<String>>>,
    height: usize,
}

impl RawFrame {
    /// Build a frame from named columns. Every column must have the same
    /// length.
    pub fn from_columns(columns: Vec<(String, Vec<Option<String>>)>) -> EngineResult<Self> {
        let height = columns.first().map(|(_, cells)| cells.len()).unwrap_or(0);
        let mut headers = Vec::with_capacity(columns.len());
        let mut map = HashMap::with_capacity(columns.len());
        for (name, cells) in columns {
            if cells.len() != height {
                return Err(EngineError::Config(format!(
                    "raw column '{name}' has {} cells, expected {height}",
                    cells.len()
                )));
            }
            headers.push(name.clone());
            map.insert(name, cells);
        }
        Ok(Self {
            headers,
            columns: map,
            height,
        })
    }

    /// Build a frame from a header and row-major text cells. Empty strings
    /// are treated as missing cells.
    pub fn from_rows(headers: &[&str], rows: &[Vec<&str>]) -> EngineResult<Self> {
        let mut columns: Vec<(String, Vec<Option<String>>)> = headers
            .iter()
            .map(|name| (name.to_string(), Vec::with_capacity(rows.len())))
            .collect();
        for (row_idx, row) in rows.iter().enumerate() {
            if row.len() != headers.len() {
                return Err(EngineError::Config(format!(
                    "row {row_idx} has {} cells but the header has {}",
                    row.len(),
                    headers.len()
                )));
            }
            for (cell, (_, cells)) in row.iter().zip(columns.iter_mut()) {
                let cell = cell.trim();
                cells.push(if cell.is_empty() {
                    None
                } else {
                    Some(cell.to_string())
                });
            }
        }
        Self::from_columns(columns)
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    pub fn cells(&self, name: &str) -> Option<&[Option<String>]> {
        self.columns.get(name).map(Vec::as_slice)
    }
}

/// Parse, validate, and sort a raw frame into a daily series.
pub fn normalize_raw(frame: &RawFrame, schema: &InputSchema) -> EngineResult<DailySeries> {
    let dates = required_cells(frame, &schema.date)?;
    let open = required_cells(frame, &schema.open)?;
    let high = required_cells(frame, &schema.high)?;
    let low = required_cells(frame, &schema.low)?;
    let close = required_cells(frame, &schema.close)?;
    let volume = required_cells(frame, &schema.volume)?;
    let label = frame.cells(&schema.buy_signal);

    let mut days = Vec::with_capacity(frame.height());
    for row in 0..frame.height() {
        days.push(TradingDay {
            date: parse_date(row, &schema.date, dates[row].as_deref())?,
            open: parse_price(row, &schema.open, open[row].as_deref())?,
            high: parse_price(row, &schema.high, high[row].as_deref())?,
            low: parse_price(row, &schema.low, low[row].as_deref())?,
            close: parse_price(row, &schema.close, close[row].as_deref())?,
            volume: parse_volume(row, &schema.volume, volume[row].as_deref())?,
            buy_signal: match label {
                Some(cells) => parse_label(row, &schema.buy_signal, cells[row].as_deref())?,
                None => None,
            },
        });
    }

    normalize_records(days, label.is_some())
}

/// Sort typed records by date and reject duplicate dates.
///
/// The sort is stable and row positions in errors refer to the input order.
pub fn normalize_records(days: Vec<TradingDay>, has_label: bool) -> EngineResult<DailySeries> {
    let mut indexed: Vec<(usize, TradingDay)> = days.into_iter().enumerate().collect();
    indexed.sort_by_key(|(_, day)| day.date);

    for pair in indexed.windows(2) {
        let (first_row, first) = &pair[0];
        let (second_row, second) = &pair[1];
        if first.date == second.date {
            return Err(EngineError::DuplicateDate {
                date: first.date,
                first_row: *first_row,
                second_row: *second_row,
            });
        }
    }

    let days = indexed.into_iter().map(|(_, day)| day).collect();
    Ok(DailySeries::from_sorted(days, has_label))
}

/// Parse a date cell under the fixed input pattern.
pub fn parse_date(row: usize, column: &str, cell: Option<&str>) -> EngineResult<NaiveDate> {
    let raw = non_empty(row, column, cell)?;
    NaiveDate::parse_from_str(raw, DATE_FORMAT).map_err(|err| {
        EngineError::parse(row, column, raw, format!("expected {DATE_FORMAT}: {err}"))
    })
}

fn required_cells<'a>(frame: &'a RawFrame, name: &str) -> EngineResult<&'a [Option<String>]> {
    frame
        .cells(name)
        .ok_or_else(|| EngineError::missing_column(name, "required base column"))
}

fn non_empty<'a>(row: usize, column: &str, cell: Option<&'a str>) -> EngineResult<&'a str> {
    match cell.map(str::trim) {
        Some(raw) if !raw.is_empty() => Ok(raw),
        _ => Err(EngineError::parse(row, column, "", "empty cell")),
    }
}

pub(crate) fn parse_price(row: usize, column: &str, cell: Option<&str>) -> EngineResult<f64> {
    let raw = non_empty(row, column, cell)?;
    let value: f64 = raw
        .parse()
        .map_err(|err| EngineError::parse(row, column, raw, format!("{err}")))?;
    if !value.is_finite() {
        return Err(EngineError::parse(row, column, raw, "not a finite number"));
    }
    Ok(value)
}

pub(crate) fn parse_volume(row: usize, column: &str, cell: Option<&str>) -> EngineResult<u64> {
    let raw = non_empty(row, column, cell)?;
    if let Ok(value) = raw.parse::<u64>() {
        return Ok(value);
    }
    // Accept integral decimals such as "1200.0" written by float-typed exports.
    let value: f64 = raw
        .parse()
        .map_err(|err| EngineError::parse(row, column, raw, format!("{err}")))?;
    if !value.is_finite() || value < 0.0 || value.fract() != 0.0 || value > u64::MAX as f64 {
        return Err(EngineError::parse(
            row,
            column,
            raw,
            "volume must be a non-negative integer",
        ));
    }
    Ok(value as u64)
}

fn parse_label(row: usize, column: &str, cell: Option<&str>) -> EngineResult<Option<f64>> {
    let Some(raw) = cell.map(str::trim).filter(|raw| !raw.is_empty()) else {
        return Ok(None);
    };
    match raw.to_ascii_lowercase().as_str() {
        "1" | "1.0" | "true" => Ok(Some(1.0)),
        "0" | "0.0" | "false" => Ok(Some(0.0)),
        _ => Err(EngineError::parse(row, column, raw, "expected a 0/1 label")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADERS: [&str; 6] = ["Date", "open", "high", "low", "close", "volume"];

    #[test]
    fn parses_abbreviated_month_dates() {
        let date = parse_date(0, "Date", Some("05-Jan-21")).unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(2021, 1, 5).unwrap());
    }

    #[test]
    fn iso_dates_are_rejected() {
        let err = parse_date(3, "Date", Some("2021-01-05")).unwrap_err();
        match err {
            EngineError::Parse { row, column, .. } => {
                assert_eq!(row, 3);
                assert_eq!(column, "Date");
            }
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn integral_decimal_volume_is_accepted() {
        assert_eq!(parse_volume(0, "volume", Some("1200.0")).unwrap(), 1200);
        assert!(parse_volume(0, "volume", Some("-5")).is_err());
        assert!(parse_volume(0, "volume", Some("12.5")).is_err());
    }

    #[test]
    fn rows_are_sorted_by_date() {
        let frame = RawFrame::from_rows(
            &HEADERS,
            &[
                vec!["07-Jan-21", "3", "3", "3", "3", "30"],
                vec!["05-Jan-21", "1", "1", "1", "1", "10"],
                vec!["06-Jan-21", "2", "2", "2", "2", "20"],
            ],
        )
        .unwrap();
        let series = normalize_raw(&frame, &InputSchema::default()).unwrap();
        assert_eq!(series.close(), vec![1.0, 2.0, 3.0]);
        assert!(!series.has_label());
    }

    #[test]
    fn missing_close_column_is_a_schema_error() {
        let frame = RawFrame::from_rows(
            &["Date", "open", "high", "low", "volume"],
            &[vec!["05-Jan-21", "1", "1", "1", "10"]],
        )
        .unwrap();
        let err = normalize_raw(&frame, &InputSchema::default()).unwrap_err();
        assert!(err.is_schema());
    }

    #[test]
    fn empty_label_cell_is_undefined_not_zero() {
        let frame = RawFrame::from_rows(
            &["Date", "open", "high", "low", "close", "volume", "BuySignal"],
            &[
                vec!["05-Jan-21", "1", "1", "1", "1", "10", ""],
                vec!["06-Jan-21", "1", "1", "1", "1", "10", "1"],
            ],
        )
        .unwrap();
        let series = normalize_raw(&frame, &InputSchema::default()).unwrap();
        assert_eq!(series.buy_signal(), Some(vec![None, Some(1.0)]));
    }
}
