pub mod column;
pub mod config;
pub mod data;
pub mod error;
pub mod normalize;
pub mod provider;
pub mod series;
pub mod storage;

pub use column::{Column, ColumnKind, FeatureFamily, FeatureTable, Requirement};
pub use data::load_raw_csv;
pub use config::{DATE_FORMAT, InputSchema, OverwritePolicy};
pub use error::{EngineError, EngineResult};
pub use normalize::{RawFrame, normalize_raw, normalize_records};
pub use provider::{
    AlphaVantageConfig, AlphaVantageJsonProvider, CsvSeriesProvider, SeriesProvider,
    parse_daily_payload,
};
pub use series::{DailySeries, TradingDay};
pub use storage::{WriteOutcome, WriteStatus, fingerprint_table, sha256_file, write_feature_table};
