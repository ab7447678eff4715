use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One daily bar as delivered by a series provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradingDay {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
    /// External 0/1 label; `None` on a row means the label cell was empty.
    #[serde(default)]
    pub buy_signal: Option<f64>,
}

/// A validated, strictly date-ascending daily series.
///
/// Only constructed through the normalizer, so every instance has unique
/// dates in ascending order.
#[derive(Debug, Clone, PartialEq)]
pub struct DailySeries {
    days: Vec<TradingDay>,
    has_label: bool,
}

impl DailySeries {
    pub(crate) fn from_sorted(days: Vec<TradingDay>, has_label: bool) -> Self {
        Self { days, has_label }
    }

    pub fn len(&self) -> usize {
        self.days.len()
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }

    pub fn days(&self) -> &[TradingDay] {
        &self.days
    }

    /// Whether the buy-signal label column was part of the input.
    pub fn has_label(&self) -> bool {
        self.has_label
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        self.days.iter().map(|day| day.date).collect()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.days.first().map(|day| day.date)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.days.last().map(|day| day.date)
    }

    pub fn open(&self) -> Vec<f64> {
        self.days.iter().map(|day| day.open).collect()
    }

    pub fn high(&self) -> Vec<f64> {
        self.days.iter().map(|day| day.high).collect()
    }

    pub fn low(&self) -> Vec<f64> {
        self.days.iter().map(|day| day.low).collect()
    }

    pub fn close(&self) -> Vec<f64> {
        self.days.iter().map(|day| day.close).collect()
    }

    pub fn volume(&self) -> Vec<f64> {
        self.days.iter().map(|day| day.volume as f64).collect()
    }

    /// Label values per row, or `None` when the series carries no label column.
    pub fn buy_signal(&self) -> Option<Vec<Option<f64>>> {
        if !self.has_label {
            return None;
        }
        Some(self.days.iter().map(|day| day.buy_signal).collect())
    }
}
