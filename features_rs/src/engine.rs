use std::collections::HashMap;

use chrono::NaiveDate;
use pricesmith_rs::{
    Column, ColumnKind, DailySeries, EngineError, EngineResult, FeatureTable, Requirement,
};
use rayon::prelude::*;
use tracing::{debug, info};

use crate::catalog::{
    BUY_SIGNAL, CLOSE, FeatureCatalog, FeatureNode, HIGH, LOW, OPEN, Transform, VOLUME,
};
use crate::config::EngineConfig;
use crate::finalize::{PruneReport, prune_incomplete_rows, unpruned_report};
use crate::transforms::{self, Cells};

#[derive(Clone, Debug, PartialEq)]
pub struct EngineOutput {
    pub table: FeatureTable,
    pub report: PruneReport,
}

/// Computes every catalog column for a daily series, then finalizes.
#[derive(Clone, Debug)]
pub struct FeatureEngine {
    config: EngineConfig,
}

impl FeatureEngine {
    pub fn new(config: EngineConfig) -> EngineResult<Self> {
        config.features.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn catalog(&self, has_label: bool) -> FeatureCatalog {
        FeatureCatalog::build(&self.config.features, has_label)
    }

    pub fn run(&self, series: &DailySeries) -> EngineResult<EngineOutput> {
        let table = self.compute(series)?;
        let (table, report) = if self.config.prune {
            prune_incomplete_rows(&table)?
        } else {
            let report = unpruned_report(&table);
            (table, report)
        };
        Ok(EngineOutput { table, report })
    }

    /// Base columns plus every derived column in catalog order, undefined
    /// cells intact.
    pub fn compute(&self, series: &DailySeries) -> EngineResult<FeatureTable> {
        let base = base_table(series)?;
        let catalog = self.catalog(series.has_label());
        catalog.validate(&base.column_names())?;

        let nodes = catalog.nodes();
        let positions: HashMap<&str, usize> = nodes
            .iter()
            .enumerate()
            .map(|(idx, node)| (node.name.as_str(), idx))
            .collect();
        let mut derived: Vec<Option<Cells>> = vec![None; nodes.len()];

        for (depth, level) in catalog.levels().iter().enumerate() {
            let ctx = EvalContext {
                base: &base,
                derived: &derived,
                positions: &positions,
            };
            let evaluate = |&idx: &usize| (idx, ctx.evaluate(&nodes[idx]));
            let results: Vec<(usize, EngineResult<Cells>)> = if self.config.parallel {
                level.par_iter().map(evaluate).collect()
            } else {
                level.iter().map(evaluate).collect()
            };
            debug!(level = depth, columns = level.len(), "Evaluated feature level");
            for (idx, values) in results {
                derived[idx] = Some(values?);
            }
        }

        let mut table = base;
        for (node, values) in nodes.iter().zip(derived) {
            let values = values.ok_or_else(|| {
                EngineError::Config(format!("feature '{}' was never evaluated", node.name))
            })?;
            let requirement = match node.requirement {
                Requirement::Lookahead if self.config.require_lookahead => Requirement::Required,
                other => other,
            };
            table.push_column(Column::new(
                node.name.clone(),
                node.family,
                node.kind,
                requirement,
                values,
            ))?;
        }

        for (family, count) in table.family_counts() {
            info!(family = %family, columns = count, "Feature family summary");
        }
        info!(
            rows = table.height(),
            columns = table.width() + 1,
            parallel = self.config.parallel,
            "Feature columns computed"
        );
        Ok(table)
    }
}

fn base_table(series: &DailySeries) -> EngineResult<FeatureTable> {
    let mut table = FeatureTable::new(series.dates());
    for (name, values) in [
        (OPEN, series.open()),
        (HIGH, series.high()),
        (LOW, series.low()),
        (CLOSE, series.close()),
    ] {
        table.push_column(Column::base(name, ColumnKind::Float, transforms::defined(&values)))?;
    }
    table.push_column(Column::base(
        VOLUME,
        ColumnKind::Integer,
        transforms::defined(&series.volume()),
    ))?;
    if let Some(label) = series.buy_signal() {
        table.push_column(Column::base(BUY_SIGNAL, ColumnKind::Integer, label))?;
    }
    Ok(table)
}

struct EvalContext<'a> {
    base: &'a FeatureTable,
    derived: &'a [Option<Cells>],
    positions: &'a HashMap<&'a str, usize>,
}

impl EvalContext<'_> {
    fn dates(&self) -> &[NaiveDate] {
        self.base.dates()
    }

    fn input(&self, name: &str) -> EngineResult<&[Option<f64>]> {
        if let Some(column) = self.base.column(name) {
            return Ok(column.values.as_slice());
        }
        self.positions
            .get(name)
            .and_then(|&idx| self.derived[idx].as_deref())
            .ok_or_else(|| EngineError::missing_column(name, "feature input not yet computed"))
    }

    fn evaluate(&self, node: &FeatureNode) -> EngineResult<Cells> {
        let values = match &node.transform {
            Transform::Difference { left, right } => {
                transforms::difference(self.input(left)?, self.input(right)?)
            }
            Transform::Ratio {
                numerator,
                denominator,
            } => transforms::ratio(self.input(numerator)?, self.input(denominator)?),
            Transform::PercentDifference {
                minuend,
                subtrahend,
                base,
            } => transforms::percent_difference(
                self.input(minuend)?,
                self.input(subtrahend)?,
                self.input(base)?,
            ),
            Transform::Product { left, right } => {
                transforms::product(self.input(left)?, self.input(right)?)
            }
            Transform::Sma { source, window } => transforms::sma(self.input(source)?, *window),
            Transform::Ema {
                source,
                span,
                adjust,
            } => transforms::ema(self.input(source)?, *span, *adjust),
            Transform::RollingStd { source, window } => {
                transforms::rolling_std(self.input(source)?, *window)
            }
            Transform::RollingMax { source, window } => {
                transforms::rolling_max(self.input(source)?, *window)
            }
            Transform::RollingMin { source, window } => {
                transforms::rolling_min(self.input(source)?, *window)
            }
            Transform::Band {
                middle,
                spread,
                multiplier,
            } => transforms::band(self.input(middle)?, self.input(spread)?, *multiplier),
            Transform::Position {
                value,
                lower,
                upper,
            } => transforms::position(
                self.input(value)?,
                self.input(lower)?,
                self.input(upper)?,
            ),
            Transform::Rsi { source, window } => transforms::rsi(self.input(source)?, *window),
            Transform::Lag { source, periods } => transforms::lag(self.input(source)?, *periods),
            Transform::RateOfChange { source, periods } => {
                transforms::rate_of_change(self.input(source)?, *periods)
            }
            Transform::FractionalChange { source, periods } => {
                transforms::fractional_change(self.input(source)?, *periods)
            }
            Transform::Above { left, right } => {
                transforms::above(self.input(left)?, self.input(right)?)
            }
            Transform::Calendar { field } => transforms::calendar(self.dates(), *field),
            Transform::ForwardReturn { source } => transforms::forward_return(self.input(source)?),
        };
        Ok(values)
    }
}
