pub mod catalog;
pub mod config;
mod engine;
mod finalize;
pub mod transforms;

use std::path::PathBuf;

use anyhow::{Context, Result};
use pricesmith_rs::storage::{WriteStatus, write_feature_table};
use pricesmith_rs::{InputSchema, OverwritePolicy, SeriesProvider};
use tracing::info;

pub use catalog::{ColumnWarmup, FeatureCatalog, FeatureNode, Transform, Warmup};
pub use config::{BollingerConfig, EngineConfig, FeatureConfig, MacdConfig, TrendConfig};
pub use engine::{EngineOutput, FeatureEngine};
pub use finalize::PruneReport;
pub use transforms::{CalendarField, EmaAdjust};

/// Where and how a prepared feature table is written.
#[derive(Clone, Debug)]
pub struct PrepareConfig {
    pub output: PathBuf,
    pub engine: EngineConfig,
    /// Header names for the date and base columns of the written table.
    pub headers: InputSchema,
    pub overwrite: OverwritePolicy,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PreparedDataset {
    pub path: PathBuf,
    pub rows: usize,
    /// Including the date index.
    pub columns: usize,
    pub sha256: String,
    pub status: WriteStatus,
    pub report: PruneReport,
}

/// Load a series, engineer every feature, and persist the finalized table
/// behind the overwrite guard.
pub fn prepare_dataset(
    config: &PrepareConfig,
    provider: &dyn SeriesProvider,
) -> Result<PreparedDataset> {
    let source = provider.describe();
    let series = provider
        .load()
        .with_context(|| format!("Failed to load daily series from {source}"))?;
    let engine = FeatureEngine::new(config.engine.clone())?;
    let output = engine
        .run(&series)
        .with_context(|| format!("Feature engineering failed for {source}"))?;

    let outcome = write_feature_table(
        &output.table,
        &config.output,
        &config.headers,
        config.overwrite,
    )?;
    info!(
        source = %source,
        rows = output.table.height(),
        columns = output.report.columns,
        sha256 = %outcome.sha256,
        path = %config.output.display(),
        "Enhanced dataset ready"
    );
    Ok(PreparedDataset {
        path: config.output.clone(),
        rows: output.table.height(),
        columns: output.report.columns,
        sha256: outcome.sha256,
        status: outcome.status,
        report: output.report,
    })
}
