/// Historical replay for train/score parity verification
///
/// Replays a stretch of history as if each day were "today": observations
/// are truncated at that date and pushed through the scoring path, and the
/// resulting row is compared with the batch training row for the same date.
/// Any difference means a feature looked past its own date or the two paths
/// diverged, and is reported per date and column.
///
/// Dates inside the first lookback-ceiling days of the training window are
/// skipped: the batch table has less history there than a scoring window.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::analysis::calendar::{DateRange, days_after};
use crate::clean::clean_observations;
use crate::config::PipelineConfig;
use crate::features::build_feature_table;
use crate::model::{Observation, PipelineError, Result};
use crate::parity::{TrainingManifest, check_parity};
use crate::pipeline::features_as_of;
use crate::wide::build_wide_table;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayMismatch {
    pub date: NaiveDate,
    pub column: String,
    pub batch: Option<f64>,
    pub replayed: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayReport {
    pub site_id: String,
    pub dates_checked: usize,
    pub dates_skipped_warmup: usize,
    pub mismatches: Vec<ReplayMismatch>,
}

impl ReplayReport {
    pub fn is_clean(&self) -> bool {
        self.mismatches.is_empty()
    }
}

/// Replays every date in `dates` for one site.
///
/// `dates` must lie inside the training window. The batch table is built
/// with the full observation set, the replayed rows only ever see
/// observations up to their own date.
pub fn verify_replay(
    observations: &[Observation],
    config: &PipelineConfig,
    manifest: &TrainingManifest,
    site_id: &str,
    dates: DateRange,
) -> Result<ReplayReport> {
    check_parity(manifest, config, &manifest.threshold)?;
    if !config.site.ids.iter().any(|id| id == site_id) {
        return Err(PipelineError::UnknownSite(site_id.to_string()));
    }
    let window = DateRange::new(config.window.start, config.window.end)?;
    if !(window.contains(dates.start()) && window.contains(dates.end())) {
        return Err(PipelineError::Config(format!(
            "replay dates {}..{} fall outside the training window",
            dates.start(),
            dates.end()
        )));
    }

    let threshold = &manifest.threshold;
    let (clean, _) = clean_observations(observations, &config.clean);
    let batch_wide = build_wide_table(&clean, site_id, window, &config.wide);
    let batch = build_feature_table(&batch_wide, &config.features, threshold, &config.site)?;

    let first_full = days_after(window.start(), config.features.lookback_ceiling_days);
    let mut report = ReplayReport {
        site_id: site_id.to_string(),
        dates_checked: 0,
        dates_skipped_warmup: 0,
        mismatches: Vec::new(),
    };

    for date in dates.iter() {
        if date < first_full {
            report.dates_skipped_warmup += 1;
            continue;
        }
        let truncated: Vec<_> = clean
            .iter()
            .filter(|o| o.timestamp.date_naive() <= date)
            .cloned()
            .collect();
        let (_, replayed) = features_as_of(&truncated, site_id, date, config, threshold)?;

        let (Some(offset), Some(replayed_row)) = (window.offset_of(date), replayed.latest()) else {
            continue;
        };
        let batch_row = &batch.rows[offset];
        for (i, column) in batch.columns.iter().enumerate() {
            let (b, r) = (batch_row.values[i], replayed_row.values[i]);
            if !same_value(b, r) {
                report.mismatches.push(ReplayMismatch {
                    date,
                    column: column.clone(),
                    batch: b,
                    replayed: r,
                });
            }
        }
        report.dates_checked += 1;
    }

    if report.is_clean() {
        log::info!(
            target: "parity",
            "{}: replay matched batch on {} dates ({} warm-up dates skipped)",
            site_id,
            report.dates_checked,
            report.dates_skipped_warmup
        );
    } else {
        log::error!(
            target: "parity",
            "{}: replay diverged from batch in {} cells",
            site_id,
            report.mismatches.len()
        );
    }
    Ok(report)
}

/// Bitwise equality, with `None == None`.
fn same_value(a: Option<f64>, b: Option<f64>) -> bool {
    match (a, b) {
        (Some(x), Some(y)) => x.to_bits() == y.to_bits(),
        (None, None) => true,
        _ => false,
    }
}
