/// Label generator.
///
/// For each date `d` the target looks at the forward window `(d, d + h]`:
/// label 1 if any chlorophyll observed in the window exceeds the frozen
/// threshold, 0 otherwise. Only same-day observations count; values the
/// wide builder carried forward are ignored so one sample cannot be seen
/// twice.
///
/// A date is unlabelable when `d + h` falls after the last grid date
/// (incomplete window), or when a complete window holds no exceedance and
/// fewer observations than `min_observations_in_window` (sparse window).
/// Labels are produced alongside features and never feed back into them.

use serde::{Deserialize, Serialize};

use crate::config::LabelConfig;
use crate::model::{Determinand, Label, LabelRow, UnlabelableReason};
use crate::threshold::FrozenThreshold;
use crate::wide::WideTable;

pub fn build_labels(
    wide: &WideTable,
    config: &LabelConfig,
    threshold: &FrozenThreshold,
) -> Vec<LabelRow> {
    let chl = wide.observed_series(Determinand::Chlorophyll);
    let horizon = config.horizon_days as usize;
    let min_obs = config.min_observations_in_window as usize;

    let labels: Vec<LabelRow> = wide
        .rows
        .iter()
        .enumerate()
        .map(|(i, row)| {
            let label = if i + horizon >= chl.len() {
                Label::Unlabelable(UnlabelableReason::IncompleteWindow)
            } else {
                let window = &chl[i + 1..=i + horizon];
                let observed = window.iter().flatten().count();
                let exceeded = window
                    .iter()
                    .flatten()
                    .any(|v| threshold.is_exceeded_by(*v, config.strictly_greater));
                if exceeded {
                    Label::Exceedance
                } else if observed < min_obs {
                    Label::Unlabelable(UnlabelableReason::SparseWindow)
                } else {
                    Label::NoExceedance
                }
            };
            LabelRow { date: row.date, label }
        })
        .collect();

    let summary = LabelCounts::tally(&labels);
    log::info!(
        target: "labels",
        "{}: {} dates, {} positive, {} negative, {} unlabelable ({} incomplete, {} sparse)",
        wide.site_id,
        labels.len(),
        summary.n_pos,
        summary.n_neg,
        summary.n_incomplete + summary.n_sparse,
        summary.n_incomplete,
        summary.n_sparse
    );
    if summary.n_pos + summary.n_neg == 0 && !labels.is_empty() {
        log::warn!(target: "labels", "{}: no labelable dates", wide.site_id);
    }

    labels
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct LabelCounts {
    n_pos: usize,
    n_neg: usize,
    n_incomplete: usize,
    n_sparse: usize,
}

impl LabelCounts {
    fn tally(rows: &[LabelRow]) -> Self {
        let mut counts = Self::default();
        for row in rows {
            match row.label {
                Label::Exceedance => counts.n_pos += 1,
                Label::NoExceedance => counts.n_neg += 1,
                Label::Unlabelable(UnlabelableReason::IncompleteWindow) => counts.n_incomplete += 1,
                Label::Unlabelable(UnlabelableReason::SparseWindow) => counts.n_sparse += 1,
            }
        }
        counts
    }
}

// ---------------------------------------------------------------------------
// Audit
// ---------------------------------------------------------------------------

/// Label audit written next to the label table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelSummary {
    pub n: usize,
    pub n_pos: usize,
    pub n_neg: usize,
    pub n_unlabelable: usize,
    pub n_incomplete_window: usize,
    pub n_sparse_window: usize,
    /// Positive share of labelled rows; `None` when nothing is labelled.
    pub pos_rate: Option<f64>,
    pub cycle_id: String,
    pub threshold_ug_l: f64,
    pub strictly_greater: bool,
    pub horizon_days: u32,
    pub label_version: String,
    pub config_fingerprint: String,
}

pub fn summarize_labels(
    rows: &[LabelRow],
    config: &LabelConfig,
    threshold: &FrozenThreshold,
    config_fingerprint: &str,
) -> LabelSummary {
    let counts = LabelCounts::tally(rows);
    let labelled = counts.n_pos + counts.n_neg;
    LabelSummary {
        n: rows.len(),
        n_pos: counts.n_pos,
        n_neg: counts.n_neg,
        n_unlabelable: counts.n_incomplete + counts.n_sparse,
        n_incomplete_window: counts.n_incomplete,
        n_sparse_window: counts.n_sparse,
        pos_rate: (labelled > 0).then(|| counts.n_pos as f64 / labelled as f64),
        cycle_id: threshold.cycle_id().to_string(),
        threshold_ug_l: threshold.value(),
        strictly_greater: config.strictly_greater,
        horizon_days: config.horizon_days,
        label_version: config.version.clone(),
        config_fingerprint: config_fingerprint.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::calendar::{DateRange, days_after};
    use crate::model::WideRow;
    use chrono::NaiveDate;

    fn wide_from_chl(chl: &[Option<f64>]) -> WideTable {
        let start = NaiveDate::from_ymd_opt(2019, 8, 1).unwrap();
        let range = DateRange::new(start, days_after(start, chl.len() as u32 - 1)).unwrap();
        let rows = range
            .iter()
            .zip(chl)
            .map(|(date, v)| {
                let mut row = WideRow::empty(date);
                row.values[0] = *v;
                row.ages_days[0] = v.map(|_| 0);
                row
            })
            .collect();
        WideTable {
            site_id: "NW-88010013".to_string(),
            range,
            rows,
        }
    }

    /// Exceedance on day 3 only.
    fn scenario() -> Vec<Option<f64>> {
        [10.0, 10.0, 10.0, 25.0, 10.0, 10.0, 10.0, 10.0]
            .into_iter()
            .map(Some)
            .collect()
    }

    fn cfg(horizon: u32) -> LabelConfig {
        LabelConfig {
            horizon_days: horizon,
            ..LabelConfig::default()
        }
    }

    fn threshold() -> FrozenThreshold {
        FrozenThreshold::fixed("c1", 20.0).unwrap()
    }

    #[test]
    fn test_scenario_window_three() {
        let chl = scenario();
        let labels = build_labels(&wide_from_chl(&chl), &cfg(3), &threshold());
        assert_eq!(labels[0].label, Label::Exceedance);
        assert_eq!(labels[2].label, Label::Exceedance);
        assert_eq!(labels[3].label, Label::NoExceedance, "own day is not in the window");
        assert_eq!(labels[4].label, Label::NoExceedance);
        assert_eq!(labels[5].label, Label::Unlabelable(UnlabelableReason::IncompleteWindow));
        assert_eq!(labels[7].label, Label::Unlabelable(UnlabelableReason::IncompleteWindow));
    }

    #[test]
    fn test_exceedance_on_day_ten_with_default_horizon() {
        let mut chl = vec![Some(5.0); 40];
        chl[10] = Some(35.0);
        let labels = build_labels(&wide_from_chl(&chl), &LabelConfig::default(), &threshold());
        assert_eq!(labels[0].label, Label::Exceedance);
        assert_eq!(labels[9].label, Label::Exceedance);
        assert_eq!(labels[10].label, Label::NoExceedance);
        assert_eq!(labels[11].label, Label::NoExceedance);
    }

    #[test]
    fn test_window_end_is_inclusive() {
        // Exceedance exactly horizon days ahead counts; one day further does not.
        let mut chl = vec![Some(1.0); 30];
        chl[14] = Some(50.0);
        let labels = build_labels(&wide_from_chl(&chl), &LabelConfig::default(), &threshold());
        assert_eq!(labels[0].label, Label::Exceedance);
        chl[14] = Some(1.0);
        chl[15] = Some(50.0);
        let labels = build_labels(&wide_from_chl(&chl), &LabelConfig::default(), &threshold());
        assert_eq!(labels[0].label, Label::NoExceedance);
    }

    #[test]
    fn test_tail_is_unlabelable() {
        let chl = vec![Some(1.0); 20];
        let labels = build_labels(&wide_from_chl(&chl), &LabelConfig::default(), &threshold());
        let incomplete = labels
            .iter()
            .filter(|l| l.label == Label::Unlabelable(UnlabelableReason::IncompleteWindow))
            .count();
        assert_eq!(incomplete, 14);
        assert_eq!(labels[5].label, Label::NoExceedance);
        assert_eq!(labels[6].label, Label::Unlabelable(UnlabelableReason::IncompleteWindow));
    }

    #[test]
    fn test_sparse_window() {
        let mut chl = vec![None; 10];
        chl[0] = Some(3.0);
        let labels = build_labels(&wide_from_chl(&chl), &cfg(3), &threshold());
        assert_eq!(labels[0].label, Label::Unlabelable(UnlabelableReason::SparseWindow));

        let lenient = LabelConfig {
            min_observations_in_window: 0,
            ..cfg(3)
        };
        let labels = build_labels(&wide_from_chl(&chl), &lenient, &threshold());
        assert_eq!(labels[0].label, Label::NoExceedance);
    }

    #[test]
    fn test_sparse_window_with_exceedance_is_positive() {
        let mut chl = vec![None; 10];
        chl[2] = Some(40.0);
        let config = LabelConfig {
            min_observations_in_window: 3,
            ..cfg(3)
        };
        let labels = build_labels(&wide_from_chl(&chl), &config, &threshold());
        assert_eq!(labels[0].label, Label::Exceedance);
        assert_eq!(labels[3].label, Label::Unlabelable(UnlabelableReason::SparseWindow));
    }

    #[test]
    fn test_strictness_at_threshold() {
        let chl = vec![Some(1.0), Some(20.0), Some(1.0)];
        let strict = build_labels(&wide_from_chl(&chl), &cfg(1), &threshold());
        assert_eq!(strict[0].label, Label::NoExceedance);
        let inclusive = LabelConfig {
            strictly_greater: false,
            ..cfg(1)
        };
        let labels = build_labels(&wide_from_chl(&chl), &inclusive, &threshold());
        assert_eq!(labels[0].label, Label::Exceedance);
    }

    #[test]
    fn test_carried_values_do_not_count() {
        let mut wide = wide_from_chl(&[Some(1.0), None, None]);
        wide.rows[1].values[0] = Some(50.0);
        wide.rows[1].ages_days[0] = Some(1);
        let labels = build_labels(&wide, &cfg(1), &threshold());
        assert_eq!(labels[0].label, Label::Unlabelable(UnlabelableReason::SparseWindow));
    }

    #[test]
    fn test_summary_counts() {
        let chl = scenario();
        let config = cfg(3);
        let labels = build_labels(&wide_from_chl(&chl), &config, &threshold());
        let summary = summarize_labels(&labels, &config, &threshold(), "abc");
        assert_eq!(summary.n, 8);
        assert_eq!(summary.n_pos, 3);
        assert_eq!(summary.n_neg, 2);
        assert_eq!(summary.n_unlabelable, 3);
        assert_eq!(summary.pos_rate, Some(0.6));
        assert_eq!(summary.threshold_ug_l, 20.0);
        assert_eq!(summary.label_version, "LBL_V1");
    }

    #[test]
    fn test_summary_of_nothing_labelled_has_no_rate() {
        let summary = summarize_labels(&[], &cfg(3), &threshold(), "abc");
        assert_eq!(summary.pos_rate, None);
    }
}
