use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use pricesmith_rs::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};

use crate::transforms::EmaAdjust;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MacdConfig {
    pub fast: usize,
    pub slow: usize,
    pub signal: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BollingerConfig {
    pub window: usize,
    pub num_std: f64,
}

/// Windows compared by the trend flags and the golden-cross indicator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrendConfig {
    pub fast: usize,
    pub slow: usize,
}

/// Window and period parameters for every feature family.
///
/// Any field omitted from a JSON config keeps its default. Windows that one
/// family needs from another (the trend SMAs, the MACD EMAs, the Bollinger
/// deviation) are added to the catalog even when not listed here.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    pub sma_windows: Vec<usize>,
    pub ema_spans: Vec<usize>,
    pub ema_adjust: EmaAdjust,
    pub macd: MacdConfig,
    pub rsi_window: usize,
    pub bollinger: BollingerConfig,
    pub volatility_windows: Vec<usize>,
    pub lag_periods: Vec<usize>,
    pub roc_periods: Vec<usize>,
    pub support_window: usize,
    pub trend: TrendConfig,
    /// Emit `buy_signal_strength`; requires the label column.
    pub buy_signal_strength: bool,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            sma_windows: vec![5, 10, 20, 50],
            ema_spans: vec![12, 26],
            ema_adjust: EmaAdjust::Adjusted,
            macd: MacdConfig {
                fast: 12,
                slow: 26,
                signal: 9,
            },
            rsi_window: 14,
            bollinger: BollingerConfig {
                window: 20,
                num_std: 2.0,
            },
            volatility_windows: vec![5, 20],
            lag_periods: vec![1, 2, 3, 5],
            roc_periods: vec![5, 10, 20],
            support_window: 20,
            trend: TrendConfig { fast: 5, slow: 20 },
            buy_signal_strength: true,
        }
    }
}

impl FeatureConfig {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Unable to read feature config {}", path.display()))?;
        let config: Self = serde_json::from_str(&text)
            .with_context(|| format!("Invalid feature config {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("Rejected feature config {}", path.display()))?;
        Ok(config)
    }

    pub fn validate(&self) -> EngineResult<()> {
        positive_all("sma_windows", &self.sma_windows)?;
        positive_all("ema_spans", &self.ema_spans)?;
        positive_all("lag_periods", &self.lag_periods)?;
        positive_all("roc_periods", &self.roc_periods)?;
        positive("macd.fast", self.macd.fast)?;
        positive("macd.slow", self.macd.slow)?;
        positive("macd.signal", self.macd.signal)?;
        positive("rsi_window", self.rsi_window)?;
        positive("support_window", self.support_window)?;
        positive("trend.fast", self.trend.fast)?;
        positive("trend.slow", self.trend.slow)?;

        for &window in self.volatility_windows.iter().chain([&self.bollinger.window]) {
            if window < 2 {
                return Err(EngineError::Config(format!(
                    "standard deviation windows need at least 2 rows, got {window}"
                )));
            }
        }
        if !self.bollinger.num_std.is_finite() || self.bollinger.num_std <= 0.0 {
            return Err(EngineError::Config(format!(
                "bollinger.num_std must be a positive number, got {}",
                self.bollinger.num_std
            )));
        }
        if self.trend.fast == self.trend.slow {
            return Err(EngineError::Config(format!(
                "trend.fast and trend.slow must differ, both are {}",
                self.trend.fast
            )));
        }
        Ok(())
    }
}

fn positive(name: &str, value: usize) -> EngineResult<()> {
    if value == 0 {
        return Err(EngineError::Config(format!("{name} must be at least 1")));
    }
    Ok(())
}

fn positive_all(name: &str, values: &[usize]) -> EngineResult<()> {
    values.iter().try_for_each(|&value| positive(name, value))
}

/// Run-level options for a single engine invocation.
#[derive(Clone, Debug, PartialEq)]
pub struct EngineConfig {
    pub features: FeatureConfig,
    /// Treat the forward-looking target as required, dropping the last row.
    pub require_lookahead: bool,
    /// Drop rows with undefined required cells. Disabled only for inspection.
    pub prune: bool,
    /// Evaluate independent features of a dependency level on the rayon pool.
    pub parallel: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            features: FeatureConfig::default(),
            require_lookahead: false,
            prune: true,
            parallel: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn partial_json_keeps_defaults() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("features.json");
        fs::write(&path, r#"{"sma_windows": [3, 7], "ema_adjust": "recursive"}"#)?;

        let config = FeatureConfig::from_json_file(&path)?;
        assert_eq!(config.sma_windows, vec![3, 7]);
        assert_eq!(config.ema_adjust, EmaAdjust::Recursive);
        assert_eq!(config.rsi_window, 14);
        assert_eq!(config.macd.signal, 9);
        Ok(())
    }

    #[test]
    fn zero_windows_and_bad_multipliers_are_rejected() {
        let mut config = FeatureConfig::default();
        config.lag_periods = vec![1, 0];
        assert!(matches!(config.validate(), Err(EngineError::Config(_))));

        let mut config = FeatureConfig::default();
        config.volatility_windows = vec![1];
        assert!(config.validate().is_err());

        let mut config = FeatureConfig::default();
        config.bollinger.num_std = f64::NAN;
        assert!(config.validate().is_err());
    }
}
