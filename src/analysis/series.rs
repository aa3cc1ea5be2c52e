/// Leakage-safe series primitives.
///
/// A series here is one value slot per grid day, in date order, with `None`
/// for a missing day. Every function that aggregates history takes a
/// `Shift`, which cannot be zero: the aggregation window always ends at
/// least one day before the row being computed. There is deliberately no
/// public way to aggregate an unshifted series.
///
/// Rolling statistics use a minimum-periods policy of 1: the mean is taken
/// over however many valid points the window holds. Early rows of a table
/// are therefore averaged over fewer points than the window length.

use std::num::NonZeroUsize;

/// Shift depth in days, always >= 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Shift(NonZeroUsize);

impl Shift {
    pub const ONE: Shift = Shift(NonZeroUsize::MIN);

    /// `None` for a depth of 0.
    pub fn new(days: usize) -> Option<Self> {
        NonZeroUsize::new(days).map(Shift)
    }

    pub fn days(self) -> usize {
        self.0.get()
    }
}

/// Value `shift` days before each row: `out[i] = series[i - shift]`.
pub fn lag(series: &[Option<f64>], shift: Shift) -> Vec<Option<f64>> {
    let k = shift.days();
    (0..series.len())
        .map(|i| if i >= k { series[i - k] } else { None })
        .collect()
}

/// Mean of the `window` values ending `shift` days before each row.
///
/// Row `i` averages the valid values at positions
/// `i - shift - window + 1 ..= i - shift`. With no valid value in that span
/// the result is `None`. Values are summed oldest-first so repeated runs are
/// bit-identical.
pub fn shifted_rolling_mean(
    series: &[Option<f64>],
    shift: Shift,
    window: usize,
) -> Vec<Option<f64>> {
    let k = shift.days();
    (0..series.len())
        .map(|i| {
            if window == 0 || i < k {
                return None;
            }
            let last = i - k;
            let first = (last + 1).saturating_sub(window);
            let mut sum = 0.0;
            let mut count = 0usize;
            for value in series[first..=last].iter().flatten() {
                sum += value;
                count += 1;
            }
            (count > 0).then(|| sum / count as f64)
        })
        .collect()
}

/// Days since the most recent valid value strictly before each row,
/// `None` when there is none within `ceiling_days`.
pub fn days_since_previous(series: &[Option<f64>], ceiling_days: usize) -> Vec<Option<f64>> {
    let mut out = Vec::with_capacity(series.len());
    let mut last_seen: Option<usize> = None;
    for (i, value) in series.iter().enumerate() {
        let age = last_seen
            .map(|j| i - j)
            .filter(|age| *age <= ceiling_days)
            .map(|age| age as f64);
        out.push(age);
        if value.is_some() {
            last_seen = Some(i);
        }
    }
    out
}

/// 1.0 where the value is missing, 0.0 where present. Computed on the
/// unshifted series: it describes the row's own day.
pub fn missing_flags(series: &[Option<f64>]) -> Vec<Option<f64>> {
    series
        .iter()
        .map(|v| Some(if v.is_none() { 1.0 } else { 0.0 }))
        .collect()
}

/// Pearson correlation between consecutive values, `None` with fewer than
/// three points or zero variance.
pub fn lag1_autocorrelation(values: &[f64]) -> Option<f64> {
    if values.len() < 3 {
        return None;
    }
    let x = &values[..values.len() - 1];
    let y = &values[1..];
    let n = x.len() as f64;
    let mean_x = x.iter().sum::<f64>() / n;
    let mean_y = y.iter().sum::<f64>() / n;
    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (a, b) in x.iter().zip(y) {
        cov += (a - mean_x) * (b - mean_y);
        var_x += (a - mean_x).powi(2);
        var_y += (b - mean_y).powi(2);
    }
    if var_x == 0.0 || var_y == 0.0 {
        return None;
    }
    Some(cov / (var_x.sqrt() * var_y.sqrt()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
