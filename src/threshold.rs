/// Frozen chlorophyll threshold.
///
/// A threshold is fixed once per training cycle and bound to that cycle's
/// id. It is passed explicitly into labelling and feature building; nothing
/// re-derives it from scoring-time data.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::config::{CycleConfig, ThresholdMethod};
use crate::model::{PipelineError, Result};

/// How the frozen value was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ThresholdSource {
    Fixed,
    /// Linear-interpolated quantile over `sample_size` training values.
    Quantile { quantile: f64, sample_size: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrozenThreshold {
    cycle_id: String,
    value_ug_l: f64,
    source: ThresholdSource,
}

impl FrozenThreshold {
    pub fn fixed(cycle_id: impl Into<String>, value_ug_l: f64) -> Result<Self> {
        if !value_ug_l.is_finite() || value_ug_l <= 0.0 {
            return Err(PipelineError::ThresholdDerivation(format!(
                "fixed threshold must be positive, got {}",
                value_ug_l
            )));
        }
        Ok(Self {
            cycle_id: cycle_id.into(),
            value_ug_l,
            source: ThresholdSource::Fixed,
        })
    }

    /// Quantile of training chlorophyll values (linear interpolation
    /// between order statistics). Non-finite values are ignored.
    pub fn derive(cycle_id: impl Into<String>, chl_values: &[f64], quantile: f64) -> Result<Self> {
        if !(quantile > 0.0 && quantile < 1.0) {
            return Err(PipelineError::ThresholdDerivation(format!(
                "quantile must be in (0, 1), got {}",
                quantile
            )));
        }
        let mut sorted: Vec<f64> = chl_values.iter().copied().filter(|v| v.is_finite()).collect();
        if sorted.is_empty() {
            return Err(PipelineError::ThresholdDerivation(
                "no chlorophyll values in the training window".to_string(),
            ));
        }
        sorted.sort_by(f64::total_cmp);

        let value_ug_l = interpolated_quantile(&sorted, quantile);
        let cycle_id = cycle_id.into();
        log::info!(
            target: "labels",
            "Derived threshold {:.3} ug/l for cycle {} (q={}, n={})",
            value_ug_l,
            cycle_id,
            quantile,
            sorted.len()
        );
        Ok(Self {
            cycle_id,
            value_ug_l,
            source: ThresholdSource::Quantile {
                quantile,
                sample_size: sorted.len(),
            },
        })
    }

    /// Threshold for a cycle as configured. `training_chl` is only read for
    /// quantile thresholds.
    pub fn from_config(cycle: &CycleConfig, training_chl: &[f64]) -> Result<Self> {
        match cycle.threshold {
            ThresholdMethod::Fixed { value_ug_l } => Self::fixed(cycle.id.clone(), value_ug_l),
            ThresholdMethod::Quantile { quantile } => {
                Self::derive(cycle.id.clone(), training_chl, quantile)
            }
        }
    }

    pub fn cycle_id(&self) -> &str {
        &self.cycle_id
    }

    pub fn value(&self) -> f64 {
        self.value_ug_l
    }

    pub fn source(&self) -> ThresholdSource {
        self.source
    }

    /// Whether `chl` counts as an exceedance.
    pub fn is_exceeded_by(&self, chl: f64, strictly_greater: bool) -> bool {
        if strictly_greater {
            chl > self.value_ug_l
        } else {
            chl >= self.value_ug_l
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

fn interpolated_quantile(sorted: &[f64], q: f64) -> f64 {
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}
