//! Pure column transforms over date-ordered cells.
//!
//! Every function takes already-materialized columns and returns a new
//! column of the same length. `None` marks an undefined cell: warmup rows,
//! zero denominators, and anything derived from an undefined input. No
//! function ever emits NaN or an infinity.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

pub type Cells = Vec<Option<f64>>;

/// Weighting used by exponential moving averages.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmaAdjust {
    /// Bias-corrected weights: `num_t = x_t + (1-a) num_{t-1}`,
    /// `den_t = 1 + (1-a) den_{t-1}`, value `num_t / den_t`.
    #[default]
    Adjusted,
    /// Plain recursion: `ema_t = a x_t + (1-a) ema_{t-1}`.
    Recursive,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalendarField {
    /// Monday = 0 .. Sunday = 6.
    DayOfWeek,
    Month,
    Quarter,
    Year,
}

#[inline]
fn finite(value: f64) -> Option<f64> {
    value.is_finite().then_some(value)
}

#[inline]
fn nonzero(value: f64) -> Option<f64> {
    (value != 0.0).then_some(value)
}

/// Lift a plain series into cells.
pub fn defined(values: &[f64]) -> Cells {
    values.iter().map(|&value| finite(value)).collect()
}

fn window_slice(values: &[Option<f64>], end: usize, window: usize) -> Option<Vec<f64>> {
    if window == 0 || end + 1 < window {
        return None;
    }
    values[end + 1 - window..=end].iter().copied().collect()
}

/// Trailing simple moving average; undefined until a full window of
/// defined values is available.
pub fn sma(values: &[Option<f64>], window: usize) -> Cells {
    (0..values.len())
        .map(|i| {
            let slice = window_slice(values, i, window)?;
            finite(slice.iter().sum::<f64>() / window as f64)
        })
        .collect()
}

/// Exponentially weighted mean with `alpha = 2 / (span + 1)`, seeded by the
/// first defined value and defined from that row on.
///
/// Undefined rows stay undefined in the output, but the weight of earlier
/// observations keeps decaying across them, so the next defined row is
/// weighted by its absolute distance from older rows.
pub fn ema(values: &[Option<f64>], span: usize, adjust: EmaAdjust) -> Cells {
    if span == 0 {
        return vec![None; values.len()];
    }
    let alpha = 2.0 / (span as f64 + 1.0);
    let decay = 1.0 - alpha;
    let new_weight = match adjust {
        EmaAdjust::Adjusted => 1.0,
        EmaAdjust::Recursive => alpha,
    };
    let mut old_weight = 1.0_f64;
    let mut mean: Option<f64> = None;

    values
        .iter()
        .map(|value| {
            let Some(last) = mean else {
                mean = *value;
                return (*value).and_then(finite);
            };
            old_weight *= decay;
            let x = (*value)?;
            let next = (old_weight * last + new_weight * x) / (old_weight + new_weight);
            old_weight = match adjust {
                EmaAdjust::Adjusted => old_weight + new_weight,
                EmaAdjust::Recursive => 1.0,
            };
            mean = Some(next);
            finite(next)
        })
        .collect()
}

/// Trailing sample standard deviation (ddof = 1).
pub fn rolling_std(values: &[Option<f64>], window: usize) -> Cells {
    if window < 2 {
        return vec![None; values.len()];
    }
    (0..values.len())
        .map(|i| {
            let slice = window_slice(values, i, window)?;
            let mean = slice.iter().sum::<f64>() / window as f64;
            let variance_sum = slice.iter().map(|x| (x - mean).powi(2)).sum::<f64>();
            finite((variance_sum / (window - 1) as f64).sqrt())
        })
        .collect()
}

pub fn rolling_max(values: &[Option<f64>], window: usize) -> Cells {
    (0..values.len())
        .map(|i| {
            let slice = window_slice(values, i, window)?;
            Some(slice.into_iter().fold(f64::MIN, f64::max))
        })
        .collect()
}

pub fn rolling_min(values: &[Option<f64>], window: usize) -> Cells {
    (0..values.len())
        .map(|i| {
            let slice = window_slice(values, i, window)?;
            Some(slice.into_iter().fold(f64::MAX, f64::min))
        })
        .collect()
}

fn zip_with(
    left: &[Option<f64>],
    right: &[Option<f64>],
    f: impl Fn(f64, f64) -> Option<f64>,
) -> Cells {
    left.iter()
        .zip(right.iter())
        .map(|(l, r)| match (l, r) {
            (Some(l), Some(r)) => f(*l, *r).and_then(finite),
            _ => None,
        })
        .collect()
}

pub fn difference(left: &[Option<f64>], right: &[Option<f64>]) -> Cells {
    zip_with(left, right, |l, r| Some(l - r))
}

pub fn product(left: &[Option<f64>], right: &[Option<f64>]) -> Cells {
    zip_with(left, right, |l, r| Some(l * r))
}

/// `numerator / denominator`, undefined on a zero denominator.
pub fn ratio(numerator: &[Option<f64>], denominator: &[Option<f64>]) -> Cells {
    zip_with(numerator, denominator, |n, d| nonzero(d).map(|d| n / d))
}

/// `(minuend - subtrahend) / base * 100`, undefined on a zero base.
pub fn percent_difference(
    minuend: &[Option<f64>],
    subtrahend: &[Option<f64>],
    base: &[Option<f64>],
) -> Cells {
    minuend
        .iter()
        .zip(subtrahend.iter())
        .zip(base.iter())
        .map(|((m, s), b)| match (m, s, b) {
            (Some(m), Some(s), Some(b)) => nonzero(*b).and_then(|b| finite((m - s) / b * 100.0)),
            _ => None,
        })
        .collect()
}

/// `middle + multiplier * spread`.
pub fn band(middle: &[Option<f64>], spread: &[Option<f64>], multiplier: f64) -> Cells {
    zip_with(middle, spread, |m, s| Some(m + s * multiplier))
}

/// `(value - lower) / (upper - lower)`, undefined when the bands coincide.
pub fn position(value: &[Option<f64>], lower: &[Option<f64>], upper: &[Option<f64>]) -> Cells {
    value
        .iter()
        .zip(lower.iter())
        .zip(upper.iter())
        .map(|((v, l), u)| match (v, l, u) {
            (Some(v), Some(l), Some(u)) => nonzero(u - l).and_then(|width| finite((v - l) / width)),
            _ => None,
        })
        .collect()
}

/// Value `periods` rows earlier.
pub fn lag(values: &[Option<f64>], periods: usize) -> Cells {
    (0..values.len())
        .map(|i| if i < periods { None } else { values[i - periods] })
        .collect()
}

/// `(x_i - x_{i-p}) / x_{i-p} * 100`.
pub fn rate_of_change(values: &[Option<f64>], periods: usize) -> Cells {
    shifted_compare(values, periods, |current, previous| {
        (current - previous) / previous * 100.0
    })
}

/// `x_i / x_{i-p} - 1`.
pub fn fractional_change(values: &[Option<f64>], periods: usize) -> Cells {
    shifted_compare(values, periods, |current, previous| current / previous - 1.0)
}

fn shifted_compare(values: &[Option<f64>], periods: usize, f: impl Fn(f64, f64) -> f64) -> Cells {
    (0..values.len())
        .map(|i| {
            if periods == 0 || i < periods {
                return None;
            }
            let current = values[i]?;
            let previous = nonzero(values[i - periods]?)?;
            finite(f(current, previous))
        })
        .collect()
}

/// `x_{i+1} / x_i - 1`; the single forward-looking transform.
pub fn forward_return(values: &[Option<f64>]) -> Cells {
    (0..values.len())
        .map(|i| {
            let next = (*values.get(i + 1)?)?;
            let current = nonzero(values[i]?)?;
            finite(next / current - 1.0)
        })
        .collect()
}

/// 1 when `left > right`, 0 otherwise, undefined if either side is.
pub fn above(left: &[Option<f64>], right: &[Option<f64>]) -> Cells {
    zip_with(left, right, |l, r| Some(if l > r { 1.0 } else { 0.0 }))
}

/// Relative strength index over simple rolling means of gains and losses.
///
/// The first row has no predecessor and contributes a zero gain and loss,
/// so the index is defined from row `window - 1`. A zero mean loss leaves
/// the value undefined.
pub fn rsi(values: &[Option<f64>], window: usize) -> Cells {
    let len = values.len();
    let mut gains: Cells = vec![None; len];
    let mut losses: Cells = vec![None; len];
    for i in 0..len {
        let Some(current) = values[i] else {
            continue;
        };
        let change = match i.checked_sub(1).and_then(|prev| values[prev]) {
            Some(previous) => current - previous,
            None => 0.0,
        };
        gains[i] = Some(change.max(0.0));
        losses[i] = Some((-change).max(0.0));
    }

    let mean_gain = sma(&gains, window);
    let mean_loss = sma(&losses, window);
    zip_with(&mean_gain, &mean_loss, |gain, loss| {
        let rs = gain / nonzero(loss)?;
        Some(100.0 - 100.0 / (1.0 + rs))
    })
}

pub fn calendar(dates: &[NaiveDate], field: CalendarField) -> Cells {
    dates
        .iter()
        .map(|date| {
            let value = match field {
                CalendarField::DayOfWeek => date.weekday().num_days_from_monday(),
                CalendarField::Month => date.month(),
                CalendarField::Quarter => (date.month() - 1) / 3 + 1,
                CalendarField::Year => date.year() as u32,
            };
            Some(f64::from(value))
        })
        .collect()
}
