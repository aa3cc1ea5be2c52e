/// Data viability report
///
/// Deterministic checks run before anyone fits a model: is there enough
/// chlorophyll history, are both classes present, how autocorrelated is the
/// series, how sparse is each feature column, and do two feature tables
/// (say a train and a test split) carry the same columns in the same order.
///
/// The report is serializable so it can be archived next to the artifacts.

use chrono::Datelike;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::analysis::calendar::DateRange;
use crate::analysis::series::lag1_autocorrelation;
use crate::clean::CleanObservation;
use crate::features::FeatureTable;
use crate::labels::LabelSummary;
use crate::model::Determinand;
use crate::threshold::FrozenThreshold;

/// Positive rates outside this band make a cycle marginal.
const MIN_POS_RATE: f64 = 0.05;
const MAX_POS_RATE: f64 = 0.95;

// ============================================================================
// Report types
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ViabilityStatus {
    Viable,
    Marginal,
    NotViable,
}

/// Exceedance balance over individual chlorophyll samples.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SampleBalance {
    pub n_total: usize,
    pub n_pos: usize,
    pub n_neg: usize,
    pub pos_rate: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ViabilityReport {
    pub site_id: String,
    pub status: ViabilityStatus,
    pub sample_balance: SampleBalance,
    pub label_balance: LabelSummary,
    pub chl_counts_by_year: BTreeMap<i32, usize>,
    pub missing_years: Vec<i32>,
    pub chl_lag1_autocorrelation: Option<f64>,
    pub na_rates: BTreeMap<String, f64>,
    pub notes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ColumnParity {
    pub missing_in_other: Vec<String>,
    pub extra_in_other: Vec<String>,
    pub order_matches: bool,
}

impl ColumnParity {
    pub fn is_identical(&self) -> bool {
        self.missing_in_other.is_empty() && self.extra_in_other.is_empty() && self.order_matches
    }
}

// ============================================================================
// Checks
// ============================================================================

pub fn sample_balance(
    chl_values: &[f64],
    threshold: &FrozenThreshold,
    strictly_greater: bool,
) -> SampleBalance {
    let n_total = chl_values.len();
    let n_pos = chl_values
        .iter()
        .filter(|v| threshold.is_exceeded_by(**v, strictly_greater))
        .count();
    SampleBalance {
        n_total,
        n_pos,
        n_neg: n_total - n_pos,
        pos_rate: (n_total > 0).then(|| n_pos as f64 / n_total as f64),
    }
}

/// Fraction of null cells per feature column.
pub fn na_rates(table: &FeatureTable) -> BTreeMap<String, f64> {
    table
        .columns
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let nulls = table.rows.iter().filter(|r| r.values[i].is_none()).count();
            let rate = if table.is_empty() {
                1.0
            } else {
                nulls as f64 / table.len() as f64
            };
            (name.clone(), rate)
        })
        .collect()
}

pub fn column_parity(reference: &FeatureTable, other: &FeatureTable) -> ColumnParity {
    let missing_in_other = reference
        .columns
        .iter()
        .filter(|c| !other.columns.contains(c))
        .cloned()
        .collect();
    let extra_in_other = other
        .columns
        .iter()
        .filter(|c| !reference.columns.contains(c))
        .cloned()
        .collect();
    ColumnParity {
        missing_in_other,
        extra_in_other,
        order_matches: reference.columns == other.columns,
    }
}

/// Viability of one site's training data.
///
/// `clean` may hold other sites; only `site_id` chlorophyll inside `window`
/// is read.
pub fn assess_viability(
    site_id: &str,
    clean: &[CleanObservation],
    window: DateRange,
    features: &FeatureTable,
    label_summary: &LabelSummary,
    threshold: &FrozenThreshold,
) -> ViabilityReport {
    let mut chl: Vec<&CleanObservation> = clean
        .iter()
        .filter(|o| o.site_id == site_id && o.determinand == Determinand::Chlorophyll)
        .filter(|o| window.contains(o.timestamp.date_naive()))
        .collect();
    chl.sort_by_key(|o| o.timestamp);
    let values: Vec<f64> = chl.iter().map(|o| o.value).collect();

    let mut chl_counts_by_year: BTreeMap<i32, usize> = BTreeMap::new();
    for o in &chl {
        *chl_counts_by_year.entry(o.timestamp.year()).or_default() += 1;
    }
    let missing_years: Vec<i32> = (window.start().year()..=window.end().year())
        .filter(|y| !chl_counts_by_year.contains_key(y))
        .collect();

    let sample_balance = sample_balance(&values, threshold, label_summary.strictly_greater);
    let chl_lag1_autocorrelation = lag1_autocorrelation(&values);

    let mut notes = Vec::new();
    let labelled = label_summary.n_pos + label_summary.n_neg;
    let status = if labelled == 0 || label_summary.n_pos == 0 || label_summary.n_neg == 0 {
        notes.push(format!(
            "single-class or empty labels: {} positive, {} negative",
            label_summary.n_pos, label_summary.n_neg
        ));
        ViabilityStatus::NotViable
    } else {
        let mut marginal = false;
        if let Some(rate) = label_summary.pos_rate {
            if !(MIN_POS_RATE..=MAX_POS_RATE).contains(&rate) {
                notes.push(format!(
                    "positive rate {:.3} outside {}..{}",
                    rate, MIN_POS_RATE, MAX_POS_RATE
                ));
                marginal = true;
            }
        }
        if !missing_years.is_empty() {
            notes.push(format!("no chlorophyll samples in {:?}", missing_years));
            marginal = true;
        }
        if marginal {
            ViabilityStatus::Marginal
        } else {
            ViabilityStatus::Viable
        }
    };

    match status {
        ViabilityStatus::Viable => {
            log::info!(target: "system", "{}: training data viable", site_id)
        }
        ViabilityStatus::Marginal => log::warn!(
            target: "system",
            "{}: training data marginal: {}",
            site_id,
            notes.join("; ")
        ),
        ViabilityStatus::NotViable => log::error!(
            target: "system",
            "{}: training data not viable: {}",
            site_id,
            notes.join("; ")
        ),
    }

    ViabilityReport {
        site_id: site_id.to_string(),
        status,
        sample_balance,
        label_balance: label_summary.clone(),
        chl_counts_by_year,
        missing_years,
        chl_lag1_autocorrelation,
        na_rates: na_rates(features),
        notes,
    }
}
