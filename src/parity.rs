/// Train/score parity.
///
/// Training freezes everything that shapes a feature row into a
/// `TrainingManifest`: the cycle id and threshold, each transform section of
/// the config, the resulting column list and the config fingerprint.
/// Scoring must present an identical configuration. Any difference, down to
/// a single lag depth or the lookback ceiling, is reported field by field
/// and scoring is refused.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::path::Path;

use crate::config::{
    CleanConfig, FeatureConfig, LabelConfig, PipelineConfig, SiteConfig, ThresholdMethod,
    WideConfig,
};
use crate::features::feature_columns;
use crate::model::{PipelineError, Result};
use crate::threshold::FrozenThreshold;

// ---------------------------------------------------------------------------
// Manifest
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingManifest {
    pub cycle_id: String,
    pub config_fingerprint: String,
    pub threshold_method: ThresholdMethod,
    pub threshold: FrozenThreshold,
    pub lookback_ceiling_days: u32,
    pub clean: CleanConfig,
    pub wide: WideConfig,
    pub features: FeatureConfig,
    pub labels: LabelConfig,
    pub site: SiteConfig,
    pub columns: Vec<String>,
}

impl TrainingManifest {
    pub fn freeze(config: &PipelineConfig, threshold: &FrozenThreshold) -> Self {
        Self {
            cycle_id: config.cycle.id.clone(),
            config_fingerprint: config.fingerprint(),
            threshold_method: config.cycle.threshold.clone(),
            threshold: threshold.clone(),
            lookback_ceiling_days: config.features.lookback_ceiling_days,
            clean: config.clean.clone(),
            wide: config.wide.clone(),
            features: config.features.clone(),
            labels: config.labels.clone(),
            site: config.site.clone(),
            columns: feature_columns(&config.features, &config.site),
        }
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).map_err(|source| PipelineError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| PipelineError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_str(&text)?)
    }
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParityViolation {
    pub field: String,
    pub trained: String,
    pub scoring: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParityReport {
    pub cycle_id: String,
    pub violations: Vec<ParityViolation>,
}

impl ParityReport {
    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn touches(&self, field: &str) -> bool {
        self.violations.iter().any(|v| v.field == field)
    }
}

impl fmt::Display for ParityReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cycle {}: {} difference(s)", self.cycle_id, self.violations.len())?;
        for v in &self.violations {
            write!(f, "; {} trained={} scoring={}", v.field, v.trained, v.scoring)?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Check
// ---------------------------------------------------------------------------

/// Compares the scoring-time configuration and threshold with the frozen
/// manifest. Returns `PipelineError::Parity` listing every difference.
pub fn check_parity(
    manifest: &TrainingManifest,
    config: &PipelineConfig,
    threshold: &FrozenThreshold,
) -> Result<()> {
    let report = compare(manifest, config, threshold)?;
    if report.is_clean() {
        log::info!(
            target: "parity",
            "Scoring config matches cycle {} (fingerprint {})",
            manifest.cycle_id,
            short(&manifest.config_fingerprint)
        );
        return Ok(());
    }
    for v in &report.violations {
        log::error!(
            target: "parity",
            "{}: trained {} but scoring {}",
            v.field,
            v.trained,
            v.scoring
        );
    }
    Err(PipelineError::Parity(report))
}

fn compare(
    manifest: &TrainingManifest,
    config: &PipelineConfig,
    threshold: &FrozenThreshold,
) -> Result<ParityReport> {
    let mut violations = Vec::new();
    let mut diff = |field: &str, trained: Value, scoring: Value| {
        if trained != scoring {
            violations.push(ParityViolation {
                field: field.to_string(),
                trained: trained.to_string(),
                scoring: scoring.to_string(),
            });
        }
    };

    let f = &config.features;
    let m = &manifest.features;
    diff("cycle.id", manifest.cycle_id.clone().into(), config.cycle.id.clone().into());
    diff(
        "cycle.threshold",
        serde_json::to_value(&manifest.threshold_method)?,
        serde_json::to_value(&config.cycle.threshold)?,
    );
    diff("threshold", serde_json::to_value(&manifest.threshold)?, serde_json::to_value(threshold)?);
    diff(
        "features.lookback_ceiling_days",
        manifest.lookback_ceiling_days.into(),
        f.lookback_ceiling_days.into(),
    );
    diff("features.version", m.version.clone().into(), f.version.clone().into());
    diff(
        "features.persistence",
        serde_json::to_value(&m.persistence)?,
        serde_json::to_value(&f.persistence)?,
    );
    diff(
        "features.seasonality",
        serde_json::to_value(&m.seasonality)?,
        serde_json::to_value(&f.seasonality)?,
    );
    diff(
        "features.nutrients",
        serde_json::to_value(&m.nutrients)?,
        serde_json::to_value(&f.nutrients)?,
    );
    diff("features.context", serde_json::to_value(&m.context)?, serde_json::to_value(&f.context)?);
    diff(
        "features.missingness",
        serde_json::to_value(&m.missingness)?,
        serde_json::to_value(&f.missingness)?,
    );
    diff("clean", serde_json::to_value(&manifest.clean)?, serde_json::to_value(&config.clean)?);
    diff("wide", serde_json::to_value(&manifest.wide)?, serde_json::to_value(&config.wide)?);
    diff("labels", serde_json::to_value(&manifest.labels)?, serde_json::to_value(&config.labels)?);
    diff("site", serde_json::to_value(&manifest.site)?, serde_json::to_value(&config.site)?);
    diff(
        "columns",
        serde_json::to_value(&manifest.columns)?,
        serde_json::to_value(feature_columns(f, &config.site))?,
    );
    diff(
        "config_fingerprint",
        manifest.config_fingerprint.clone().into(),
        config.fingerprint().into(),
    );

    Ok(ParityReport {
        cycle_id: manifest.cycle_id.clone(),
        violations,
    })
}

fn short(fingerprint: &str) -> &str {
    fingerprint.get(..12).unwrap_or(fingerprint)
}
