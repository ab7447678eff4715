//! Series providers: where a daily OHLCV series comes from.
//!
//! Providers take all of their configuration through their constructors and
//! never read the environment or the clock, so the engine downstream stays
//! free of ambient state.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result, anyhow, bail};
use chrono::{Duration, NaiveDate};
use serde::Deserialize;
use tracing::info;

use crate::config::InputSchema;
use crate::data::load_raw_csv;
use crate::error::EngineError;
use crate::normalize::{normalize_raw, normalize_records, parse_price, parse_volume};
use crate::series::{DailySeries, TradingDay};

const ISO_DATE_FORMAT: &str = "%Y-%m-%d";
const DAYS_PER_YEAR: i64 = 365;

pub trait SeriesProvider {
    /// Short human-readable description used in logs.
    fn describe(&self) -> String;

    fn load(&self) -> Result<DailySeries>;
}

/// Reads a delimited file with a header row and normalizes it.
#[derive(Debug, Clone)]
pub struct CsvSeriesProvider {
    path: PathBuf,
    schema: InputSchema,
}

impl CsvSeriesProvider {
    pub fn new(path: impl Into<PathBuf>, schema: InputSchema) -> Self {
        Self {
            path: path.into(),
            schema,
        }
    }
}

impl SeriesProvider for CsvSeriesProvider {
    fn describe(&self) -> String {
        format!("csv:{}", self.path.display())
    }

    fn load(&self) -> Result<DailySeries> {
        let raw = load_raw_csv(&self.path)?;
        let series = normalize_raw(&raw, &self.schema)
            .with_context(|| format!("Failed to normalize {}", self.path.display()))?;
        info!(
            rows = series.len(),
            first = ?series.first_date(),
            last = ?series.last_date(),
            has_label = series.has_label(),
            path = %self.path.display(),
            "Loaded daily series from CSV"
        );
        Ok(series)
    }
}

/// Options for reading a saved daily time-series JSON payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlphaVantageConfig {
    /// Keep only this many years of history before `as_of`; `None` keeps all.
    pub history_years: Option<u32>,
    /// Reference date for the history cutoff.
    pub as_of: NaiveDate,
}

impl AlphaVantageConfig {
    pub fn cutoff(&self) -> Option<NaiveDate> {
        self.history_years
            .map(|years| self.as_of - Duration::days(i64::from(years) * DAYS_PER_YEAR))
    }
}

/// Reads a `TIME_SERIES_DAILY` JSON payload previously saved to disk.
#[derive(Debug, Clone)]
pub struct AlphaVantageJsonProvider {
    path: PathBuf,
    config: AlphaVantageConfig,
}

impl AlphaVantageJsonProvider {
    pub fn new(path: impl Into<PathBuf>, config: AlphaVantageConfig) -> Self {
        Self {
            path: path.into(),
            config,
        }
    }
}

impl SeriesProvider for AlphaVantageJsonProvider {
    fn describe(&self) -> String {
        format!("alpha-vantage-json:{}", self.path.display())
    }

    fn load(&self) -> Result<DailySeries> {
        let text = fs::read_to_string(&self.path)
            .with_context(|| format!("Unable to read {}", self.path.display()))?;
        let series = parse_daily_payload(&text, &self.config)
            .with_context(|| format!("Failed to parse payload {}", self.path.display()))?;
        info!(
            rows = series.len(),
            first = ?series.first_date(),
            last = ?series.last_date(),
            cutoff = ?self.config.cutoff(),
            path = %self.path.display(),
            "Loaded daily series from JSON payload"
        );
        Ok(series)
    }
}

#[derive(Debug, Deserialize)]
struct DailyPayload {
    #[serde(rename = "Error Message")]
    error_message: Option<String>,
    #[serde(rename = "Information", alias = "Note")]
    information: Option<String>,
    #[serde(rename = "Time Series (Daily)")]
    series: Option<BTreeMap<String, DailyBar>>,
}

#[derive(Debug, Deserialize)]
struct DailyBar {
    #[serde(rename = "1. open")]
    open: String,
    #[serde(rename = "2. high")]
    high: String,
    #[serde(rename = "3. low")]
    low: String,
    #[serde(rename = "4. close")]
    close: String,
    #[serde(rename = "5. volume")]
    volume: String,
}

/// Parse a daily time-series payload into a normalized series.
pub fn parse_daily_payload(text: &str, config: &AlphaVantageConfig) -> Result<DailySeries> {
    let payload: DailyPayload =
        serde_json::from_str(text).with_context(|| "Payload is not valid JSON")?;
    if let Some(message) = payload.error_message {
        bail!("API error: {message}");
    }
    let Some(bars) = payload.series else {
        return Err(match payload.information {
            Some(info) => anyhow!("Unexpected API response format: {info}"),
            None => anyhow!("Unexpected API response format: missing 'Time Series (Daily)'"),
        });
    };

    let cutoff = config.cutoff();
    let mut days = Vec::with_capacity(bars.len());
    for (row, (raw_date, bar)) in bars.iter().enumerate() {
        let date = NaiveDate::parse_from_str(raw_date, ISO_DATE_FORMAT).map_err(|err| {
            EngineError::parse(row, "date", raw_date.as_str(), format!("{err}"))
        })?;
        if cutoff.is_some_and(|cutoff| date < cutoff) {
            continue;
        }
        days.push(TradingDay {
            date,
            open: parse_price(row, "1. open", Some(bar.open.as_str()))?,
            high: parse_price(row, "2. high", Some(bar.high.as_str()))?,
            low: parse_price(row, "3. low", Some(bar.low.as_str()))?,
            close: parse_price(row, "4. close", Some(bar.close.as_str()))?,
            volume: parse_volume(row, "5. volume", Some(bar.volume.as_str()))?,
            buy_signal: None,
        });
    }

    Ok(normalize_records(days, false)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAYLOAD: &str = r#"{
        "Meta Data": {"2. Symbol": "NXPI"},
        "Time Series (Daily)": {
            "2024-01-05": {"1. open": "10.0", "2. high": "11.0", "3. low": "9.5", "4. close": "10.5", "5. volume": "1000"},
            "2024-01-03": {"1. open": "9.0", "2. high": "10.0", "3. low": "8.5", "4. close": "9.5", "5. volume": "900"},
            "2019-06-03": {"1. open": "5.0", "2. high": "5.5", "3. low": "4.5", "4. close": "5.2", "5. volume": "500"}
        }
    }"#;

    fn config(years: Option<u32>) -> AlphaVantageConfig {
        AlphaVantageConfig {
            history_years: years,
            as_of: NaiveDate::from_ymd_opt(2024, 1, 10).unwrap(),
        }
    }

    #[test]
    fn payload_is_sorted_and_cut_off() -> Result<()> {
        let all = parse_daily_payload(PAYLOAD, &config(None))?;
        assert_eq!(all.len(), 3);
        assert_eq!(all.close(), vec![5.2, 9.5, 10.5]);

        let recent = parse_daily_payload(PAYLOAD, &config(Some(1)))?;
        assert_eq!(recent.len(), 2);
        assert_eq!(recent.first_date(), NaiveDate::from_ymd_opt(2024, 1, 3));
        Ok(())
    }

    #[test]
    fn api_error_message_is_surfaced() {
        let err = parse_daily_payload(r#"{"Error Message": "Invalid API call."}"#, &config(None))
            .unwrap_err();
        assert!(err.to_string().contains("Invalid API call."));
    }

    #[test]
    fn missing_series_is_unexpected_format() {
        let err = parse_daily_payload(r#"{"Meta Data": {}}"#, &config(None)).unwrap_err();
        assert!(err.to_string().contains("Unexpected API response format"));
    }
}
