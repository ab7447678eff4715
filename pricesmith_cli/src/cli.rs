use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use clap::{Args, Parser, Subcommand};
use features_rs::{EngineConfig, FeatureConfig, PrepareConfig};
use pricesmith_rs::{
    AlphaVantageConfig, AlphaVantageJsonProvider, CsvSeriesProvider, InputSchema,
    OverwritePolicy, SeriesProvider,
};

const LOG_FILE_NAME: &str = "pricesmith.log";

#[derive(Parser, Debug)]
#[command(
    name = "pricesmith",
    about = "Feature engineering for daily OHLCV price series"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Engineer every feature for a daily series and write the enhanced CSV
    #[command(name = "enhance")]
    Enhance(EnhanceArgs),
    /// List the feature catalog with families and expected warmups
    #[command(name = "catalog")]
    Catalog(CatalogArgs),
}

#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
pub struct SourceArgs {
    /// Delimited daily file with Date,open,high,low,close,volume[,BuySignal]
    #[arg(long = "csv", value_name = "FILE", value_hint = clap::ValueHint::FilePath)]
    pub csv_path: Option<PathBuf>,

    /// Saved TIME_SERIES_DAILY JSON payload
    #[arg(
        long = "alpha-vantage-json",
        value_name = "FILE",
        value_hint = clap::ValueHint::FilePath
    )]
    pub alpha_vantage_json: Option<PathBuf>,
}

#[derive(Parser, Debug)]
pub struct EnhanceArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Path of the enhanced CSV to write
    #[arg(long, value_name = "FILE", value_hint = clap::ValueHint::FilePath)]
    pub output: PathBuf,

    /// JSON file overriding feature windows and periods
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Do not emit buy_signal_strength (allows inputs without a label column)
    #[arg(long = "skip-buy-signal", default_value_t = false)]
    pub skip_buy_signal: bool,

    /// Treat next_day_return as required, dropping the final row
    #[arg(long = "require-lookahead", default_value_t = false)]
    pub require_lookahead: bool,

    /// Keep rows with undefined features (diagnostics only)
    #[arg(long = "no-prune", default_value_t = false)]
    pub no_prune: bool,

    /// Evaluate independent feature columns on the rayon thread pool
    #[arg(long, default_value_t = false)]
    pub parallel: bool,

    /// Replace an existing output whose content differs
    #[arg(long, default_value_t = false)]
    pub overwrite: bool,

    /// Keep only this many years of JSON payload history (JSON source only)
    #[arg(long = "history-years", value_name = "YEARS", requires = "alpha_vantage_json")]
    pub history_years: Option<u32>,

    /// Reference date for --history-years (YYYY-MM-DD); defaults to today
    #[arg(long = "as-of", value_name = "DATE", requires = "alpha_vantage_json")]
    pub as_of: Option<String>,

    /// Log file path; defaults to pricesmith.log next to the output
    #[arg(long = "log-file", value_name = "FILE", conflicts_with = "no_file_log")]
    pub log_file: Option<PathBuf>,

    /// Log to stdout only
    #[arg(long = "no-file-log", default_value_t = false)]
    pub no_file_log: bool,
}

#[derive(Parser, Debug)]
pub struct CatalogArgs {
    /// JSON file overriding feature windows and periods
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Assume a label column and include buy_signal_strength
    #[arg(long = "with-buy-signal", default_value_t = false)]
    pub with_buy_signal: bool,
}

impl Cli {
    pub fn parse() -> Self {
        <Cli as Parser>::parse()
    }
}

impl EnhanceArgs {
    pub fn log_file(&self) -> Option<PathBuf> {
        if self.no_file_log {
            return None;
        }
        self.log_file.clone().or_else(|| {
            let dir = self
                .output
                .parent()
                .filter(|parent| !parent.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            Some(dir.join(LOG_FILE_NAME))
        })
    }

    pub fn engine_config(&self) -> Result<EngineConfig> {
        let mut features = load_feature_config(self.config.as_deref())?;
        if self.skip_buy_signal {
            features.buy_signal_strength = false;
        }
        Ok(EngineConfig {
            features,
            require_lookahead: self.require_lookahead,
            prune: !self.no_prune,
            parallel: self.parallel,
        })
    }

    pub fn prepare_config(&self) -> Result<PrepareConfig> {
        Ok(PrepareConfig {
            output: self.output.clone(),
            engine: self.engine_config()?,
            headers: InputSchema::default(),
            overwrite: if self.overwrite {
                OverwritePolicy::Overwrite
            } else {
                OverwritePolicy::Refuse
            },
        })
    }

    pub fn provider(&self) -> Result<Box<dyn SeriesProvider>> {
        if let Some(path) = &self.source.csv_path {
            return Ok(Box::new(CsvSeriesProvider::new(path, InputSchema::default())));
        }
        let path = self
            .source
            .alpha_vantage_json
            .as_ref()
            .context("Either --csv or --alpha-vantage-json is required")?;
        let as_of = match parse_optional_date(self.as_of.as_deref())? {
            Some(date) => date,
            None => Local::now().date_naive(),
        };
        Ok(Box::new(AlphaVantageJsonProvider::new(
            path,
            AlphaVantageConfig {
                history_years: self.history_years,
                as_of,
            },
        )))
    }
}

impl CatalogArgs {
    pub fn feature_config(&self) -> Result<FeatureConfig> {
        let mut features = load_feature_config(self.config.as_deref())?;
        features.buy_signal_strength = self.with_buy_signal;
        Ok(features)
    }
}

fn load_feature_config(path: Option<&Path>) -> Result<FeatureConfig> {
    match path {
        Some(path) => FeatureConfig::from_json_file(path),
        None => Ok(FeatureConfig::default()),
    }
}

fn parse_optional_date(value: Option<&str>) -> Result<Option<NaiveDate>> {
    match value {
        Some(raw) => {
            let parsed = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .with_context(|| format!("Invalid date format for {raw}. Expected YYYY-MM-DD"))?;
            Ok(Some(parsed))
        }
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_enhance(args: &[&str]) -> EnhanceArgs {
        let argv = std::iter::once("pricesmith")
            .chain(std::iter::once("enhance"))
            .chain(args.iter().copied());
        match <Cli as Parser>::try_parse_from(argv).expect("valid arguments").command {
            Commands::Enhance(args) => args,
            other => panic!("expected enhance, got {other:?}"),
        }
    }

    #[test]
    fn flags_map_onto_engine_config() {
        let args = parse_enhance(&[
            "--csv",
            "daily.csv",
            "--output",
            "out/enhanced.csv",
            "--skip-buy-signal",
            "--require-lookahead",
            "--parallel",
        ]);
        let engine = args.engine_config().unwrap();
        assert!(!engine.features.buy_signal_strength);
        assert!(engine.require_lookahead);
        assert!(engine.prune);
        assert!(engine.parallel);
        assert_eq!(args.log_file(), Some(PathBuf::from("out").join(LOG_FILE_NAME)));
    }

    #[test]
    fn exactly_one_source_is_required() {
        let both = <Cli as Parser>::try_parse_from([
            "pricesmith",
            "enhance",
            "--csv",
            "a.csv",
            "--alpha-vantage-json",
            "a.json",
            "--output",
            "o.csv",
        ]);
        assert!(both.is_err());

        let neither =
            <Cli as Parser>::try_parse_from(["pricesmith", "enhance", "--output", "o.csv"]);
        assert!(neither.is_err());
    }

    #[test]
    fn history_window_flags_require_json_source() {
        for extra in [["--history-years", "5"], ["--as-of", "2023-06-30"]] {
            let argv = ["pricesmith", "enhance", "--csv", "d.csv", "--output", "o.csv"]
                .into_iter()
                .chain(extra);
            assert!(<Cli as Parser>::try_parse_from(argv).is_err(), "{extra:?}");
        }

        let args = parse_enhance(&[
            "--alpha-vantage-json",
            "d.json",
            "--output",
            "o.csv",
            "--history-years",
            "5",
            "--as-of",
            "2023-06-30",
        ]);
        assert_eq!(args.history_years, Some(5));
        assert!(args.provider().is_ok());
    }

    #[test]
    fn no_file_log_disables_the_file_layer() {
        let args = parse_enhance(&["--csv", "d.csv", "--output", "o.csv", "--no-file-log"]);
        assert_eq!(args.log_file(), None);
        let args = parse_enhance(&["--csv", "d.csv", "--output", "o.csv"]);
        assert_eq!(args.log_file(), Some(PathBuf::from(".").join(LOG_FILE_NAME)));
    }

    #[test]
    fn parse_optional_date_accepts_valid_yyyy_mm_dd() {
        let parsed = parse_optional_date(Some("2024-11-30")).unwrap();
        assert_eq!(parsed, NaiveDate::from_ymd_opt(2024, 11, 30));
        assert!(parse_optional_date(Some("30-Nov-24")).is_err());
    }
}
