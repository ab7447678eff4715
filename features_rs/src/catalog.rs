//! Feature catalog: the ordered dependency graph of derived columns.
//!
//! Nodes are listed so that every input is either a base column or a node
//! appearing earlier. Evaluation, level partitioning and the static warmup
//! analysis all walk this order.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;

use pricesmith_rs::{ColumnKind, EngineError, EngineResult, FeatureFamily, Requirement};
use serde::Serialize;

use crate::config::FeatureConfig;
use crate::transforms::{CalendarField, EmaAdjust};

pub const OPEN: &str = "open";
pub const HIGH: &str = "high";
pub const LOW: &str = "low";
pub const CLOSE: &str = "close";
pub const VOLUME: &str = "volume";
/// Output name of the optional label column.
pub const BUY_SIGNAL: &str = "buy_signal";

/// The always-present base columns, in output order.
pub const PRICE_COLUMNS: [&str; 5] = [OPEN, HIGH, LOW, CLOSE, VOLUME];

/// A pure column transform and the columns it reads.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Transform {
    Difference { left: String, right: String },
    Ratio { numerator: String, denominator: String },
    /// `(minuend - subtrahend) / base * 100`.
    PercentDifference {
        minuend: String,
        subtrahend: String,
        base: String,
    },
    Product { left: String, right: String },
    Sma { source: String, window: usize },
    Ema {
        source: String,
        span: usize,
        adjust: EmaAdjust,
    },
    RollingStd { source: String, window: usize },
    RollingMax { source: String, window: usize },
    RollingMin { source: String, window: usize },
    /// `middle + multiplier * spread`.
    Band {
        middle: String,
        spread: String,
        multiplier: f64,
    },
    Position {
        value: String,
        lower: String,
        upper: String,
    },
    Rsi { source: String, window: usize },
    Lag { source: String, periods: usize },
    RateOfChange { source: String, periods: usize },
    FractionalChange { source: String, periods: usize },
    Above { left: String, right: String },
    Calendar { field: CalendarField },
    ForwardReturn { source: String },
}

impl Transform {
    pub fn inputs(&self) -> Vec<&str> {
        match self {
            Self::Difference { left, right }
            | Self::Product { left, right }
            | Self::Above { left, right } => vec![left.as_str(), right.as_str()],
            Self::Ratio {
                numerator,
                denominator,
            } => vec![numerator.as_str(), denominator.as_str()],
            Self::PercentDifference {
                minuend,
                subtrahend,
                base,
            } => vec![minuend.as_str(), subtrahend.as_str(), base.as_str()],
            Self::Sma { source, .. }
            | Self::Ema { source, .. }
            | Self::RollingStd { source, .. }
            | Self::RollingMax { source, .. }
            | Self::RollingMin { source, .. }
            | Self::Rsi { source, .. }
            | Self::Lag { source, .. }
            | Self::RateOfChange { source, .. }
            | Self::FractionalChange { source, .. }
            | Self::ForwardReturn { source } => vec![source.as_str()],
            Self::Band { middle, spread, .. } => vec![middle.as_str(), spread.as_str()],
            Self::Position {
                value,
                lower,
                upper,
            } => vec![value.as_str(), lower.as_str(), upper.as_str()],
            Self::Calendar { .. } => Vec::new(),
        }
    }

    /// Undefined leading/trailing rows of the output, given those of the
    /// inputs, on input free of zero denominators and flat stretches.
    fn warmup(&self, inputs: &[Warmup]) -> Warmup {
        let merged = inputs.iter().fold(Warmup::default(), |acc, w| Warmup {
            leading: acc.leading.max(w.leading),
            trailing: acc.trailing.max(w.trailing),
        });
        match self {
            Self::Sma { window, .. }
            | Self::RollingStd { window, .. }
            | Self::RollingMax { window, .. }
            | Self::RollingMin { window, .. }
            | Self::Rsi { window, .. } => Warmup {
                leading: merged.leading + window - 1,
                ..merged
            },
            Self::Lag { periods, .. } => Warmup {
                leading: merged.leading + periods,
                trailing: merged.trailing.saturating_sub(*periods),
            },
            Self::RateOfChange { periods, .. } | Self::FractionalChange { periods, .. } => {
                Warmup {
                    leading: merged.leading + periods,
                    ..merged
                }
            }
            Self::ForwardReturn { .. } => Warmup {
                trailing: merged.trailing + 1,
                ..merged
            },
            _ => merged,
        }
    }
}

impl fmt::Display for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Difference { left, right } => write!(f, "{left} - {right}"),
            Self::Ratio {
                numerator,
                denominator,
            } => write!(f, "{numerator} / {denominator}"),
            Self::PercentDifference {
                minuend,
                subtrahend,
                base,
            } => write!(f, "({minuend} - {subtrahend}) / {base} * 100"),
            Self::Product { left, right } => write!(f, "{left} * {right}"),
            Self::Sma { source, window } => write!(f, "sma({source}, {window})"),
            Self::Ema { source, span, .. } => write!(f, "ema({source}, span={span})"),
            Self::RollingStd { source, window } => write!(f, "std({source}, {window})"),
            Self::RollingMax { source, window } => write!(f, "max({source}, {window})"),
            Self::RollingMin { source, window } => write!(f, "min({source}, {window})"),
            Self::Band {
                middle,
                spread,
                multiplier,
            } => write!(f, "{middle} + {multiplier} * {spread}"),
            Self::Position {
                value,
                lower,
                upper,
            } => write!(f, "({value} - {lower}) / ({upper} - {lower})"),
            Self::Rsi { source, window } => write!(f, "rsi({source}, {window})"),
            Self::Lag { source, periods } => write!(f, "lag({source}, {periods})"),
            Self::RateOfChange { source, periods } => write!(f, "roc({source}, {periods})"),
            Self::FractionalChange { source, periods } => {
                write!(f, "pct_change({source}, {periods})")
            }
            Self::Above { left, right } => write!(f, "{left} > {right}"),
            Self::Calendar { field } => write!(f, "calendar({field:?})"),
            Self::ForwardReturn { source } => write!(f, "{source}[+1] / {source} - 1"),
        }
    }
}

/// Leading and trailing undefined rows of a column.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Warmup {
    pub leading: usize,
    pub trailing: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FeatureNode {
    pub name: String,
    pub family: FeatureFamily,
    pub kind: ColumnKind,
    pub requirement: Requirement,
    pub transform: Transform,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ColumnWarmup {
    pub name: String,
    pub family: FeatureFamily,
    pub kind: ColumnKind,
    pub requirement: Requirement,
    pub warmup: Warmup,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FeatureCatalog {
    base: Vec<(String, ColumnKind)>,
    nodes: Vec<FeatureNode>,
}

impl FeatureCatalog {
    /// Expand the configured windows into nodes in dependency order.
    pub fn build(config: &FeatureConfig, has_label: bool) -> Self {
        let mut base: Vec<(String, ColumnKind)> = PRICE_COLUMNS
            .iter()
            .map(|name| {
                let kind = if *name == VOLUME {
                    ColumnKind::Integer
                } else {
                    ColumnKind::Float
                };
                (name.to_string(), kind)
            })
            .collect();
        if has_label {
            base.push((BUY_SIGNAL.to_string(), ColumnKind::Integer));
        }

        let mut builder = CatalogBuilder::default();
        builder.price_structure();
        builder.moving_averages(config);
        builder.volatility(config);
        builder.momentum(config);
        builder.bollinger(config);
        builder.volume_dynamics();
        builder.lags(config);
        builder.rates_of_change(config);
        builder.support_resistance(config);
        builder.calendar();
        builder.trend(config);
        builder.targets(config);

        Self {
            base,
            nodes: builder.nodes,
        }
    }

    pub fn base_columns(&self) -> &[(String, ColumnKind)] {
        &self.base
    }

    pub fn nodes(&self) -> &[FeatureNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, name: &str) -> Option<&FeatureNode> {
        self.nodes.iter().find(|node| node.name == name)
    }

    /// Check that every input is materialized before the node reading it and
    /// that every name is unique.
    pub fn validate(&self, base_columns: &[&str]) -> EngineResult<()> {
        let mut available: HashSet<&str> = HashSet::with_capacity(base_columns.len() + self.len());
        for &name in base_columns {
            if !available.insert(name) {
                return Err(EngineError::Config(format!(
                    "base column '{name}' is listed twice"
                )));
            }
        }
        for node in &self.nodes {
            for input in node.transform.inputs() {
                if !available.contains(input) {
                    return Err(EngineError::missing_column(
                        input,
                        format!("input of feature '{}'", node.name),
                    ));
                }
            }
            if !available.insert(node.name.as_str()) {
                return Err(EngineError::Config(format!(
                    "feature '{}' collides with an existing column",
                    node.name
                )));
            }
        }
        Ok(())
    }

    /// Partition node indices into dependency levels. Level `k` only reads
    /// base columns and nodes of levels below `k`.
    pub fn levels(&self) -> Vec<Vec<usize>> {
        let mut depth: HashMap<&str, usize> = HashMap::with_capacity(self.len());
        let mut levels: Vec<Vec<usize>> = Vec::new();
        for (idx, node) in self.nodes.iter().enumerate() {
            let level = node
                .transform
                .inputs()
                .iter()
                .filter_map(|input| depth.get(input).map(|d| d + 1))
                .max()
                .unwrap_or(0);
            depth.insert(node.name.as_str(), level);
            if levels.len() <= level {
                levels.resize_with(level + 1, Vec::new);
            }
            levels[level].push(idx);
        }
        levels
    }

    /// Static warmup of every column on clean input, base columns first.
    pub fn expected_warmup(&self) -> EngineResult<Vec<ColumnWarmup>> {
        let base_names: Vec<&str> = self.base.iter().map(|(name, _)| name.as_str()).collect();
        self.validate(&base_names)?;

        let mut known: HashMap<&str, Warmup> = HashMap::with_capacity(self.base.len() + self.len());
        let mut out = Vec::with_capacity(self.base.len() + self.len());
        for (name, kind) in &self.base {
            known.insert(name.as_str(), Warmup::default());
            out.push(ColumnWarmup {
                name: name.clone(),
                family: FeatureFamily::Base,
                kind: *kind,
                requirement: Requirement::Required,
                warmup: Warmup::default(),
            });
        }
        for node in &self.nodes {
            let inputs: Vec<Warmup> = node
                .transform
                .inputs()
                .iter()
                .filter_map(|input| known.get(input).copied())
                .collect();
            let warmup = node.transform.warmup(&inputs);
            known.insert(node.name.as_str(), warmup);
            out.push(ColumnWarmup {
                name: node.name.clone(),
                family: node.family,
                kind: node.kind,
                requirement: node.requirement,
                warmup,
            });
        }
        Ok(out)
    }

    /// Rows the finalizer is expected to drop at each end on clean input.
    pub fn expected_pruning(&self, require_lookahead: bool) -> EngineResult<Warmup> {
        let columns = self.expected_warmup()?;
        Ok(columns
            .iter()
            .filter(|column| require_lookahead || column.requirement == Requirement::Required)
            .fold(Warmup::default(), |acc, column| Warmup {
                leading: acc.leading.max(column.warmup.leading),
                trailing: acc.trailing.max(column.warmup.trailing),
            }))
    }
}

pub fn sma_name(window: usize) -> String {
    format!("sma_{window}")
}

pub fn ema_name(span: usize) -> String {
    format!("ema_{span}")
}

pub fn volatility_name(window: usize) -> String {
    format!("volatility_{window}")
}

fn sorted_unique(values: impl IntoIterator<Item = usize>) -> Vec<usize> {
    values.into_iter().collect::<BTreeSet<_>>().into_iter().collect()
}

#[derive(Default)]
struct CatalogBuilder {
    nodes: Vec<FeatureNode>,
}

impl CatalogBuilder {
    fn push(
        &mut self,
        name: impl Into<String>,
        family: FeatureFamily,
        kind: ColumnKind,
        transform: Transform,
    ) {
        self.nodes.push(FeatureNode {
            name: name.into(),
            family,
            kind,
            requirement: Requirement::Required,
            transform,
        });
    }

    fn float(&mut self, name: impl Into<String>, family: FeatureFamily, transform: Transform) {
        self.push(name, family, ColumnKind::Float, transform);
    }

    fn price_structure(&mut self) {
        use FeatureFamily::PriceStructure as F;
        self.float("price_range", F, difference(HIGH, LOW));
        self.float("price_change", F, difference(CLOSE, OPEN));
        self.float(
            "price_change_pct",
            F,
            percent_difference(CLOSE, OPEN, OPEN),
        );
        self.float("close_to_open_ratio", F, ratio(CLOSE, OPEN));
        self.float("high_to_low_ratio", F, ratio(HIGH, LOW));
        self.float("close_to_high_ratio", F, ratio(CLOSE, HIGH));
        self.float("close_to_low_ratio", F, ratio(CLOSE, LOW));
    }

    fn moving_averages(&mut self, config: &FeatureConfig) {
        use FeatureFamily::MovingAverage as F;
        let sma_windows = sorted_unique(
            config
                .sma_windows
                .iter()
                .copied()
                .chain([config.trend.fast, config.trend.slow]),
        );
        for window in sma_windows {
            let sma = sma_name(window);
            let volume_sma = format!("volume_sma_{window}");
            self.float(&sma, F, rolling(CLOSE, window, RollingKind::Mean));
            self.float(&volume_sma, F, rolling(VOLUME, window, RollingKind::Mean));
            self.float(format!("close_vs_sma_{window}"), F, ratio(CLOSE, &sma));
            self.float(
                format!("volume_vs_sma_{window}"),
                F,
                ratio(VOLUME, &volume_sma),
            );
        }

        let ema_spans = sorted_unique(
            config
                .ema_spans
                .iter()
                .copied()
                .chain([config.macd.fast, config.macd.slow]),
        );
        for span in ema_spans {
            self.float(
                ema_name(span),
                F,
                Transform::Ema {
                    source: CLOSE.to_string(),
                    span,
                    adjust: config.ema_adjust,
                },
            );
        }
    }

    fn volatility(&mut self, config: &FeatureConfig) {
        use FeatureFamily::Volatility as F;
        let windows = sorted_unique(
            config
                .volatility_windows
                .iter()
                .copied()
                .chain([config.bollinger.window]),
        );
        for window in windows {
            self.float(
                volatility_name(window),
                F,
                rolling(CLOSE, window, RollingKind::Std),
            );
        }
        self.float(
            "price_range_pct",
            F,
            percent_difference(HIGH, LOW, CLOSE),
        );
    }

    fn momentum(&mut self, config: &FeatureConfig) {
        use FeatureFamily::Momentum as F;
        self.float(
            "macd",
            F,
            difference(&ema_name(config.macd.fast), &ema_name(config.macd.slow)),
        );
        self.float(
            "macd_signal",
            F,
            Transform::Ema {
                source: "macd".to_string(),
                span: config.macd.signal,
                adjust: config.ema_adjust,
            },
        );
        self.float("macd_histogram", F, difference("macd", "macd_signal"));
        self.float(
            "rsi",
            F,
            Transform::Rsi {
                source: CLOSE.to_string(),
                window: config.rsi_window,
            },
        );
    }

    fn bollinger(&mut self, config: &FeatureConfig) {
        use FeatureFamily::Bollinger as F;
        let spread = volatility_name(config.bollinger.window);
        self.float(
            "bb_middle",
            F,
            rolling(CLOSE, config.bollinger.window, RollingKind::Mean),
        );
        for (name, multiplier) in [
            ("bb_upper", config.bollinger.num_std),
            ("bb_lower", -config.bollinger.num_std),
        ] {
            self.float(
                name,
                F,
                Transform::Band {
                    middle: "bb_middle".to_string(),
                    spread: spread.clone(),
                    multiplier,
                },
            );
        }
        self.float("bb_width", F, difference("bb_upper", "bb_lower"));
        self.float(
            "bb_position",
            F,
            Transform::Position {
                value: CLOSE.to_string(),
                lower: "bb_lower".to_string(),
                upper: "bb_upper".to_string(),
            },
        );
    }

    fn volume_dynamics(&mut self) {
        use FeatureFamily::Volume as F;
        self.float(
            "volume_change",
            F,
            Transform::FractionalChange {
                source: VOLUME.to_string(),
                periods: 1,
            },
        );
        self.float(
            "volume_price_trend",
            F,
            Transform::Product {
                left: VOLUME.to_string(),
                right: "price_change_pct".to_string(),
            },
        );
    }

    fn lags(&mut self, config: &FeatureConfig) {
        use FeatureFamily::Lag as F;
        for periods in sorted_unique(config.lag_periods.iter().copied()) {
            for (prefix, source, kind) in [
                ("close", CLOSE, ColumnKind::Float),
                ("volume", VOLUME, ColumnKind::Integer),
                ("price_change", "price_change_pct", ColumnKind::Float),
            ] {
                self.push(
                    format!("{prefix}_lag_{periods}"),
                    F,
                    kind,
                    Transform::Lag {
                        source: source.to_string(),
                        periods,
                    },
                );
            }
        }
    }

    fn rates_of_change(&mut self, config: &FeatureConfig) {
        for periods in sorted_unique(config.roc_periods.iter().copied()) {
            self.float(
                format!("roc_{periods}"),
                FeatureFamily::RateOfChange,
                Transform::RateOfChange {
                    source: CLOSE.to_string(),
                    periods,
                },
            );
        }
    }

    fn support_resistance(&mut self, config: &FeatureConfig) {
        use FeatureFamily::SupportResistance as F;
        self.float(
            "recent_high",
            F,
            rolling(HIGH, config.support_window, RollingKind::Max),
        );
        self.float(
            "recent_low",
            F,
            rolling(LOW, config.support_window, RollingKind::Min),
        );
        self.float(
            "distance_to_high",
            F,
            percent_difference("recent_high", CLOSE, CLOSE),
        );
        self.float(
            "distance_to_low",
            F,
            percent_difference(CLOSE, "recent_low", CLOSE),
        );
    }

    fn calendar(&mut self) {
        for (name, field) in [
            ("day_of_week", CalendarField::DayOfWeek),
            ("month", CalendarField::Month),
            ("quarter", CalendarField::Quarter),
            ("year", CalendarField::Year),
        ] {
            self.push(
                name,
                FeatureFamily::Calendar,
                ColumnKind::Integer,
                Transform::Calendar { field },
            );
        }
    }

    fn trend(&mut self, config: &FeatureConfig) {
        use FeatureFamily::Trend as F;
        let fast = sma_name(config.trend.fast);
        let slow = sma_name(config.trend.slow);
        for (name, left, right) in [
            (format!("trend_{}", config.trend.fast), CLOSE, fast.as_str()),
            (format!("trend_{}", config.trend.slow), CLOSE, slow.as_str()),
            ("golden_cross".to_string(), fast.as_str(), slow.as_str()),
        ] {
            self.push(
                name,
                F,
                ColumnKind::Integer,
                Transform::Above {
                    left: left.to_string(),
                    right: right.to_string(),
                },
            );
        }
    }

    fn targets(&mut self, config: &FeatureConfig) {
        use FeatureFamily::Target as F;
        self.nodes.push(FeatureNode {
            name: "next_day_return".to_string(),
            family: F,
            kind: ColumnKind::Float,
            requirement: Requirement::Lookahead,
            transform: Transform::ForwardReturn {
                source: CLOSE.to_string(),
            },
        });
        if config.buy_signal_strength {
            self.float(
                "buy_signal_strength",
                F,
                Transform::Product {
                    left: BUY_SIGNAL.to_string(),
                    right: "price_change_pct".to_string(),
                },
            );
        }
    }
}

enum RollingKind {
    Mean,
    Std,
    Max,
    Min,
}

fn rolling(source: &str, window: usize, kind: RollingKind) -> Transform {
    let source = source.to_string();
    match kind {
        RollingKind::Mean => Transform::Sma { source, window },
        RollingKind::Std => Transform::RollingStd { source, window },
        RollingKind::Max => Transform::RollingMax { source, window },
        RollingKind::Min => Transform::RollingMin { source, window },
    }
}

fn difference(left: &str, right: &str) -> Transform {
    Transform::Difference {
        left: left.to_string(),
        right: right.to_string(),
    }
}

fn ratio(numerator: &str, denominator: &str) -> Transform {
    Transform::Ratio {
        numerator: numerator.to_string(),
        denominator: denominator.to_string(),
    }
}

fn percent_difference(minuend: &str, subtrahend: &str, base: &str) -> Transform {
    Transform::PercentDifference {
        minuend: minuend.to_string(),
        subtrahend: subtrahend.to_string(),
        base: base.to_string(),
    }
}
