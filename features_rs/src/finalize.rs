use pricesmith_rs::{EngineResult, FeatureTable};
use serde::Serialize;
use tracing::{info, warn};

/// What the finalizer did to a table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PruneReport {
    pub rows_in: usize,
    pub rows_out: usize,
    /// Output columns including the date index.
    pub columns: usize,
    /// Input position of the first retained row.
    pub first_row_kept: Option<usize>,
    pub pruned: bool,
}

impl PruneReport {
    pub fn rows_dropped(&self) -> usize {
        self.rows_in - self.rows_out
    }
}

/// Drop every row with an undefined required cell. Retained values and
/// their order are untouched.
pub fn prune_incomplete_rows(table: &FeatureTable) -> EngineResult<(FeatureTable, PruneReport)> {
    let height = table.height();
    let keep: Vec<bool> = (0..height).map(|row| table.row_is_complete(row)).collect();
    let pruned = table.filter_rows(&keep)?;

    let report = PruneReport {
        rows_in: height,
        rows_out: pruned.height(),
        columns: pruned.width() + 1,
        first_row_kept: keep.iter().position(|keep| *keep),
        pruned: true,
    };

    if report.rows_out == 0 && height > 0 {
        let never_defined: Vec<&str> = table
            .columns()
            .iter()
            .filter(|column| column.is_required() && column.first_defined().is_none())
            .map(|column| column.name.as_str())
            .collect();
        warn!(
            rows_in = height,
            never_defined = ?never_defined,
            "Every row has an undefined required feature; history is shorter than the longest warmup"
        );
    } else {
        info!(
            rows_in = report.rows_in,
            rows_out = report.rows_out,
            dropped = report.rows_dropped(),
            columns = report.columns,
            first_row_kept = ?report.first_row_kept,
            "Dropped rows with undefined required features"
        );
    }
    Ok((pruned, report))
}

/// Report for a table returned without pruning.
pub fn unpruned_report(table: &FeatureTable) -> PruneReport {
    PruneReport {
        rows_in: table.height(),
        rows_out: table.height(),
        columns: table.width() + 1,
        first_row_kept: (table.height() > 0).then_some(0),
        pruned: false,
    }
}
