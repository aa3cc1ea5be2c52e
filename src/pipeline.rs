/// End-to-end training and scoring runs.
///
/// Both runs share one transform path: clean → wide → features. Training
/// builds every table over the configured window, freezes the threshold and
/// writes a manifest. Scoring first checks the manifest against the
/// scoring-time config, then rebuilds features over a lookback-ceiling
/// window ending at `as_of` and keeps only the final row.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::alert::stalenesses::{Freshness, assess_freshness_at};
use crate::alert::thresholds::{RiskAlert, check_bloom_risk};
use crate::analysis::calendar::{DateRange, days_before};
use crate::analysis::groupings::group_by_site;
use crate::artifacts::{self, ArtifactLayout, FeatureTableMetadata};
use crate::clean::{CleanObservation, CleanReport, clean_observations};
use crate::config::{AlertConfig, PipelineConfig};
use crate::features::{FeatureTable, build_feature_table};
use crate::labels::{LabelSummary, build_labels, summarize_labels};
use crate::model::{Determinand, FeatureRow, LabelRow, Observation, PipelineError, Result};
use crate::parity::{TrainingManifest, check_parity};
use crate::threshold::FrozenThreshold;
use crate::viability::{ViabilityReport, assess_viability};
use crate::wide::{WideTable, build_wide_table, build_wide_tables};

// ============================================================================
// Training
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct SiteTables {
    pub wide: WideTable,
    pub features: FeatureTable,
    pub labels: Vec<LabelRow>,
    pub label_summary: LabelSummary,
    pub viability: ViabilityReport,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrainingRun {
    pub threshold: FrozenThreshold,
    pub manifest: TrainingManifest,
    pub clean_report: CleanReport,
    pub sites: BTreeMap<String, SiteTables>,
}

/// Builds wide, feature and label tables for every configured site over the
/// training window.
pub fn run_training(observations: &[Observation], config: &PipelineConfig) -> Result<TrainingRun> {
    config.validate()?;
    let range = DateRange::new(config.window.start, config.window.end)?;
    let fingerprint = config.fingerprint();
    log::info!(
        target: "system",
        "Training cycle {} over {}..{} for {} site(s)",
        config.cycle.id,
        range.start(),
        range.end(),
        config.site.ids.len()
    );

    for (site_id, rows) in group_by_site(observations) {
        if config.site.ids.contains(&site_id) {
            log::info!(target: "ingest", "{}: {} raw observations", site_id, rows.len());
        } else {
            log::warn!(
                target: "ingest",
                "{}: {} observations from an unconfigured site ignored",
                site_id,
                rows.len()
            );
        }
    }

    let (clean, clean_report) = clean_observations(observations, &config.clean);

    let training_chl: Vec<f64> = clean
        .iter()
        .filter(|o| o.determinand == Determinand::Chlorophyll)
        .filter(|o| range.contains(o.timestamp.date_naive()))
        .filter(|o| config.site.ids.contains(&o.site_id))
        .map(|o| o.value)
        .collect();
    let threshold = FrozenThreshold::from_config(&config.cycle, &training_chl)?;

    let mut sites = BTreeMap::new();
    for (site_id, wide) in build_wide_tables(&clean, &config.site.ids, range, &config.wide) {
        let features = build_feature_table(&wide, &config.features, &threshold, &config.site)?;
        let labels = build_labels(&wide, &config.labels, &threshold);
        let label_summary = summarize_labels(&labels, &config.labels, &threshold, &fingerprint);
        let viability =
            assess_viability(&site_id, &clean, range, &features, &label_summary, &threshold);
        sites.insert(
            site_id,
            SiteTables {
                wide,
                features,
                labels,
                label_summary,
                viability,
            },
        );
    }

    let manifest = TrainingManifest::freeze(config, &threshold);
    Ok(TrainingRun {
        threshold,
        manifest,
        clean_report,
        sites,
    })
}

/// Writes the threshold, manifest and every site's tables.
pub fn write_training_artifacts(run: &TrainingRun, layout: &ArtifactLayout) -> Result<()> {
    std::fs::create_dir_all(layout.root()).map_err(|source| PipelineError::Io {
        path: layout.root().to_path_buf(),
        source,
    })?;
    run.threshold.save(layout.threshold_json())?;
    run.manifest.save(layout.manifest_json())?;

    for (site_id, tables) in &run.sites {
        let metadata = FeatureTableMetadata {
            cycle_id: run.manifest.cycle_id.clone(),
            site_id: site_id.clone(),
            feature_version: run.manifest.features.version.clone(),
            label_version: run.manifest.labels.version.clone(),
            lookback_ceiling_days: run.manifest.lookback_ceiling_days,
            threshold_ug_l: run.threshold.value(),
            config_fingerprint: run.manifest.config_fingerprint.clone(),
            n_rows: tables.features.len(),
            n_columns: tables.features.columns.len(),
            pos_rate: tables.label_summary.pos_rate,
        };
        artifacts::save_site_tables(
            layout,
            &tables.wide,
            &tables.features,
            &tables.labels,
            &tables.label_summary,
            &metadata,
        )?;
        artifacts::save_json(&tables.viability, layout.viability_json(site_id))?;
    }
    Ok(())
}

// ============================================================================
// Scoring
// ============================================================================

/// The single feature row handed to the model for one site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringRow {
    pub site_id: String,
    pub cycle_id: String,
    pub columns: Vec<String>,
    pub row: FeatureRow,
    pub freshness: Freshness,
}

impl ScoringRow {
    /// Alert for the model's probability on this row, if any.
    pub fn alert(&self, probability: f64, config: &AlertConfig) -> Option<RiskAlert> {
        check_bloom_risk(self.row.date, probability, &self.freshness, config)
    }
}

/// Scoring-side transform: wide and feature tables over the lookback window
/// ending at `as_of`. Nothing observed after `as_of` is read.
pub fn features_as_of(
    clean: &[CleanObservation],
    site_id: &str,
    as_of: NaiveDate,
    config: &PipelineConfig,
    threshold: &FrozenThreshold,
) -> Result<(WideTable, FeatureTable)> {
    let start = days_before(as_of, config.features.lookback_ceiling_days);
    let range = DateRange::new(start, as_of)?;
    let wide = build_wide_table(clean, site_id, range, &config.wide);
    let features = build_feature_table(&wide, &config.features, threshold, &config.site)?;
    Ok((wide, features))
}

/// Latest feature row per configured site, after the parity check.
///
/// The threshold comes from the manifest; a config that differs from the
/// frozen one in any transform parameter is refused before any data is
/// touched.
pub fn score_latest(
    observations: &[Observation],
    config: &PipelineConfig,
    manifest: &TrainingManifest,
    as_of: NaiveDate,
) -> Result<Vec<ScoringRow>> {
    config.validate()?;
    check_parity(manifest, config, &manifest.threshold)?;

    let (clean, _) = clean_observations(observations, &config.clean);
    let mut scored = Vec::with_capacity(config.site.ids.len());

    for site_id in &config.site.ids {
        let (_, features) = features_as_of(&clean, site_id, as_of, config, &manifest.threshold)?;
        let Some(row) = features.latest().cloned() else {
            continue;
        };

        let last_chl = clean
            .iter()
            .filter(|o| o.site_id == *site_id && o.determinand == Determinand::Chlorophyll)
            .map(|o| o.timestamp.date_naive())
            .filter(|d| *d <= as_of)
            .max();
        let freshness = assess_freshness_at(last_chl, config.alert.max_data_age_days, as_of);

        log::info!(
            target: "system",
            "Scored {} as of {} ({} columns, chlorophyll age {})",
            site_id,
            as_of,
            features.columns.len(),
            freshness
                .age_days
                .map(|a| format!("{} days", a))
                .unwrap_or_else(|| "unknown".to_string())
        );

        scored.push(ScoringRow {
            site_id: site_id.clone(),
            cycle_id: manifest.cycle_id.clone(),
            columns: features.columns,
            row,
            freshness,
        });
    }
    Ok(scored)
}
