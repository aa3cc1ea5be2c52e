/// Clean layer: typed, filtered, deduplicated observations.
///
/// Sits between ingestion and the wide builder. It never aggregates or
/// pivots; it only resolves determinand codes, applies the validity rules
/// in `CleanConfig`, and puts the result in a stable order. Every dropped
/// row is counted by reason in the `CleanReport`.
///
/// Duplicate records (same site, timestamp and determinand) keep the one
/// that appears last in the input, so a re-issued lab result supersedes
/// the earlier one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::config::{CensoringPolicy, CleanConfig, sha256_hex};
use crate::determinands;
use crate::logging;
use crate::model::{Censoring, Determinand, Observation};

/// An observation that passed every clean-layer rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanObservation {
    pub timestamp: DateTime<Utc>,
    pub site_id: String,
    pub determinand: Determinand,
    pub value: f64,
    pub censoring: Censoring,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DropCounts {
    pub unknown_determinand: usize,
    pub non_numeric: usize,
    pub missing_or_bad_unit: usize,
    pub negative: usize,
    pub out_of_range: usize,
    pub censored: usize,
    pub duplicates: usize,
}

impl DropCounts {
    pub fn total(&self) -> usize {
        self.unknown_determinand
            + self.non_numeric
            + self.missing_or_bad_unit
            + self.negative
            + self.out_of_range
            + self.censored
            + self.duplicates
    }
}

/// What the clean layer did, reproducible for the same input and config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanReport {
    pub config_fingerprint: String,
    pub rows_in: usize,
    pub rows_out: usize,
    pub dropped: DropCounts,
}

// ---------------------------------------------------------------------------
// Clean
// ---------------------------------------------------------------------------

pub fn clean_observations(
    observations: &[Observation],
    config: &CleanConfig,
) -> (Vec<CleanObservation>, CleanReport) {
    let mut dropped = DropCounts::default();
    let mut kept: Vec<CleanObservation> = Vec::with_capacity(observations.len());

    for obs in observations {
        let Some(entry) = determinands::find_by_code(&obs.determinand_code) else {
            dropped.unknown_determinand += 1;
            continue;
        };
        let Some(value) = obs.value.filter(|v| v.is_finite()) else {
            dropped.non_numeric += 1;
            continue;
        };

        let unit_ok = match obs.unit.as_deref() {
            None => !config.require_units,
            Some(unit) => {
                !config.enforce_allowed_units
                    || determinands::unit_is_allowed(entry.determinand, unit)
            }
        };
        if !unit_ok {
            dropped.missing_or_bad_unit += 1;
            continue;
        }

        if config.drop_negative && value < 0.0 {
            dropped.negative += 1;
            continue;
        }
        let (min, max) = entry.plausible_range;
        if config.enforce_plausible_range && (value < min || value > max) {
            dropped.out_of_range += 1;
            continue;
        }
        if config.censoring == CensoringPolicy::Drop && obs.censoring != Censoring::Uncensored {
            dropped.censored += 1;
            continue;
        }

        kept.push(CleanObservation {
            timestamp: obs.timestamp,
            site_id: obs.site_id.clone(),
            determinand: entry.determinand,
            value,
            censoring: obs.censoring,
        });
    }

    let before_dedupe = kept.len();
    let mut cleaned = dedupe_keep_last(kept);
    dropped.duplicates = before_dedupe - cleaned.len();

    // Stable sort: equal keys keep their relative order
    cleaned.sort_by(|a, b| {
        a.timestamp
            .cmp(&b.timestamp)
            .then_with(|| a.site_id.cmp(&b.site_id))
            .then_with(|| a.determinand.cmp(&b.determinand))
    });

    let report = CleanReport {
        config_fingerprint: sha256_hex(&serde_json::to_vec(config).unwrap_or_default()),
        rows_in: observations.len(),
        rows_out: cleaned.len(),
        dropped,
    };

    logging::log_stage_summary(
        logging::Stage::Clean,
        report.rows_in,
        report.rows_out,
        report.dropped.total(),
    );

    (cleaned, report)
}

/// Keeps the last record for each (site, timestamp, determinand) key while
/// preserving the input order of the survivors.
fn dedupe_keep_last(observations: Vec<CleanObservation>) -> Vec<CleanObservation> {
    let mut last_index: HashMap<(String, DateTime<Utc>, Determinand), usize> = HashMap::new();
    for (i, obs) in observations.iter().enumerate() {
        last_index.insert((obs.site_id.clone(), obs.timestamp, obs.determinand), i);
    }
    observations
        .into_iter()
        .enumerate()
        .filter(|(i, obs)| {
            last_index.get(&(obs.site_id.clone(), obs.timestamp, obs.determinand)) == Some(i)
        })
        .map(|(_, obs)| obs)
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
