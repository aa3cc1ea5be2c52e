/// Pipeline configuration.
///
/// Everything that shapes the wide table, the feature table and the labels
/// lives in one declarative `PipelineConfig`, loaded from TOML. The same
/// structure drives training-time batch runs and daily scoring, so the
/// transform path can't fork between the two. `validate` rejects bad
/// family/parameter combinations before any data is touched.
///
/// ```toml
/// [cycle]
/// id = "2026-cycle-1"
/// threshold = { method = "fixed", value_ug_l = 20.0 }
///
/// [window]
/// start = "2005-01-01"
/// end = "2018-12-31"
///
/// [site]
/// ids = ["NW-88010013"]
/// mode = "excluded"
/// ```

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;

use crate::model::{PipelineError, Result};

/// Environment variable naming the config file, read after `.env`.
pub const CONFIG_ENV_VAR: &str = "BLOOMRISK_CONFIG";

/// Used when `BLOOMRISK_CONFIG` is unset.
pub const DEFAULT_CONFIG_PATH: &str = "./bloomrisk.toml";

// ============================================================================
// Top-level configuration
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    pub cycle: CycleConfig,
    pub window: WindowConfig,
    #[serde(default)]
    pub clean: CleanConfig,
    #[serde(default)]
    pub wide: WideConfig,
    #[serde(default)]
    pub features: FeatureConfig,
    #[serde(default)]
    pub labels: LabelConfig,
    pub site: SiteConfig,
    #[serde(default)]
    pub alert: AlertConfig,
}

/// Training cycle identity and how its threshold is chosen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CycleConfig {
    pub id: String,
    pub threshold: ThresholdMethod,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum ThresholdMethod {
    /// A governance-agreed cutoff.
    Fixed { value_ug_l: f64 },
    /// A quantile of the cleaned training chlorophyll distribution.
    Quantile { quantile: f64 },
}

/// Inclusive training window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WindowConfig {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

// ============================================================================
// Clean layer
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CensoringPolicy {
    /// Keep censored results at their reported limit.
    Keep,
    Drop,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CleanConfig {
    pub require_units: bool,
    pub enforce_allowed_units: bool,
    pub drop_negative: bool,
    pub enforce_plausible_range: bool,
    pub censoring: CensoringPolicy,
}

impl Default for CleanConfig {
    fn default() -> Self {
        Self {
            require_units: true,
            enforce_allowed_units: false,
            drop_negative: true,
            enforce_plausible_range: true,
            censoring: CensoringPolicy::Keep,
        }
    }
}

// ============================================================================
// Wide base table
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WideConfig {
    /// How many days an observation may be carried forward onto later grid
    /// days by the backward as-of match. 0 keeps same-day values only.
    pub carry_forward_days: u32,
}

impl Default for WideConfig {
    fn default() -> Self {
        Self { carry_forward_days: 0 }
    }
}

// ============================================================================
// Feature families
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FeatureConfig {
    pub version: String,
    /// Hard cap on how far back any feature may look, in days.
    pub lookback_ceiling_days: u32,
    pub persistence: PersistenceFamily,
    pub seasonality: SeasonalityFamily,
    pub nutrients: NutrientFamily,
    pub context: ContextFamily,
    pub missingness: MissingnessFamily,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            version: "FEAT_V1".to_string(),
            lookback_ceiling_days: 30,
            persistence: PersistenceFamily::default(),
            seasonality: SeasonalityFamily::default(),
            nutrients: NutrientFamily::default(),
            context: ContextFamily::default(),
            missingness: MissingnessFamily::default(),
        }
    }
}

/// Lags and rolling means of chlorophyll.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PersistenceFamily {
    pub enabled: bool,
    pub lags: Vec<u32>,
    pub rolling_windows: Vec<u32>,
    /// Yesterday's chlorophyll above the frozen threshold.
    pub prev_exceedance: bool,
    pub days_since_obs: bool,
}

impl Default for PersistenceFamily {
    fn default() -> Self {
        Self {
            enabled: true,
            lags: vec![1, 7],
            rolling_windows: vec![7, 30],
            prev_exceedance: true,
            days_since_obs: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SeasonalityFamily {
    pub enabled: bool,
    pub month: bool,
    pub month_cyclic: bool,
    pub day_of_year: bool,
}

impl Default for SeasonalityFamily {
    fn default() -> Self {
        Self {
            enabled: true,
            month: true,
            month_cyclic: false,
            day_of_year: true,
        }
    }
}

/// Lags and rolling means of total nitrogen and total phosphorus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NutrientFamily {
    pub enabled: bool,
    pub tn_lags: Vec<u32>,
    pub tp_lags: Vec<u32>,
    pub tn_rolling_windows: Vec<u32>,
    pub tp_rolling_windows: Vec<u32>,
    pub days_since_obs: bool,
}

impl Default for NutrientFamily {
    fn default() -> Self {
        Self {
            enabled: true,
            tn_lags: vec![7],
            tp_lags: vec![7],
            tn_rolling_windows: vec![30],
            tp_rolling_windows: vec![30],
            days_since_obs: false,
        }
    }
}

/// Same-day pH and water temperature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ContextFamily {
    pub enabled: bool,
    pub ph: bool,
    pub temperature: bool,
}

impl Default for ContextFamily {
    fn default() -> Self {
        Self {
            enabled: true,
            ph: true,
            temperature: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MissingnessFamily {
    pub enabled: bool,
}

impl Default for MissingnessFamily {
    fn default() -> Self {
        Self { enabled: true }
    }
}

// ============================================================================
// Labels
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LabelConfig {
    /// Forward window length; the window for date d is (d, d + horizon].
    pub horizon_days: u32,
    /// `>` when true, `>=` otherwise.
    pub strictly_greater: bool,
    /// Complete windows with fewer chlorophyll observations than this are
    /// unlabelable rather than negative. 0 disables the check.
    pub min_observations_in_window: u32,
    pub version: String,
}

impl Default for LabelConfig {
    fn default() -> Self {
        Self {
            horizon_days: 14,
            strictly_greater: true,
            min_observations_in_window: 1,
            version: "LBL_V1".to_string(),
        }
    }
}

// ============================================================================
// Site handling
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SiteMode {
    /// Site identity never reaches the feature table.
    Excluded,
    /// Site id is carried as table metadata but is not a predictor.
    Diagnostic,
    /// One-hot `site_is_<id>` predictor columns over `ids`.
    Categorical,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SiteConfig {
    pub ids: Vec<String>,
    pub mode: SiteMode,
}

// ============================================================================
// Alerting
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AlertConfig {
    pub elevated_probability: f64,
    pub high_probability: f64,
    /// Latest chlorophyll observation older than this makes scoring
    /// data insufficient.
    pub max_data_age_days: u32,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            elevated_probability: 0.3,
            high_probability: 0.6,
            max_data_age_days: 14,
        }
    }
}

// ============================================================================
// Loading
// ============================================================================

impl PipelineConfig {
    /// Parses and validates a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: PipelineConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads and validates a config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| PipelineError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&text)?;
        log::info!(
            target: "system",
            "Loaded config {} (cycle {})",
            path.display(),
            config.cycle.id
        );
        Ok(config)
    }

    /// Loads the file named by `BLOOMRISK_CONFIG` (after reading `.env`),
    /// falling back to `./bloomrisk.toml`.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        let path =
            std::env::var(CONFIG_ENV_VAR).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load(path)
    }

    // ------------------------------------------------------------------------
    // Validation
    // ------------------------------------------------------------------------

    pub fn validate(&self) -> Result<()> {
        if self.cycle.id.trim().is_empty() {
            return Err(config_err("cycle.id must not be empty"));
        }
        match self.cycle.threshold {
            ThresholdMethod::Fixed { value_ug_l } => {
                if !value_ug_l.is_finite() || value_ug_l <= 0.0 {
                    return Err(config_err("cycle.threshold.value_ug_l must be a positive number"));
                }
            }
            ThresholdMethod::Quantile { quantile } => {
                if !(quantile > 0.0 && quantile < 1.0) {
                    return Err(config_err("cycle.threshold.quantile must be in (0, 1)"));
                }
            }
        }

        if self.window.start > self.window.end {
            return Err(config_err("window.start must not be after window.end"));
        }

        self.features.validate()?;

        let ceiling = self.features.lookback_ceiling_days;
        let carry = self.wide.carry_forward_days;
        if carry > ceiling {
            return Err(config_err(
                "wide.carry_forward_days must not exceed features.lookback_ceiling_days",
            ));
        }
        // A lag of k on a carried column reads a sample up to k + carry days old.
        let deepest = self.features.deepest_carried_lag();
        if deepest + carry > ceiling {
            return Err(config_err(&format!(
                "deepest lag {} plus wide.carry_forward_days {} exceeds the lookback ceiling \
                 of {} days",
                deepest, carry, ceiling
            )));
        }

        let labels = &self.labels;
        if labels.horizon_days == 0 {
            return Err(config_err("labels.horizon_days must be >= 1"));
        }
        if labels.min_observations_in_window > labels.horizon_days {
            return Err(config_err(
                "labels.min_observations_in_window cannot exceed labels.horizon_days",
            ));
        }

        if self.site.ids.is_empty() {
            return Err(config_err("site.ids must list at least one site"));
        }
        let mut seen = std::collections::BTreeSet::new();
        for id in &self.site.ids {
            if id.trim().is_empty() {
                return Err(config_err("site.ids must not contain empty identifiers"));
            }
            if !seen.insert(id.as_str()) {
                return Err(config_err(&format!("duplicate site id '{}'", id)));
            }
        }

        let alert = &self.alert;
        if !(0.0 < alert.elevated_probability
            && alert.elevated_probability < alert.high_probability
            && alert.high_probability <= 1.0)
        {
            return Err(config_err(
                "alert probabilities must satisfy 0 < elevated < high <= 1",
            ));
        }

        Ok(())
    }

    // ------------------------------------------------------------------------
    // Fingerprint
    // ------------------------------------------------------------------------

    /// SHA-256 over every section that shapes features or labels. Two configs
    /// with the same fingerprint produce the same tables from the same
    /// observations.
    pub fn fingerprint(&self) -> String {
        #[derive(Serialize)]
        struct ParitySections<'a> {
            clean: &'a CleanConfig,
            wide: &'a WideConfig,
            features: &'a FeatureConfig,
            labels: &'a LabelConfig,
            site: &'a SiteConfig,
        }

        let sections = ParitySections {
            clean: &self.clean,
            wide: &self.wide,
            features: &self.features,
            labels: &self.labels,
            site: &self.site,
        };
        // Plain structs of strings, numbers and vectors always serialize.
        let payload = serde_json::to_vec(&sections).unwrap_or_default();
        sha256_hex(&payload)
    }
}

impl FeatureConfig {
    /// Largest shift applied to a column that may hold carried values:
    /// enabled chlorophyll and nutrient lags, plus 1 for previous exceedance.
    pub fn deepest_carried_lag(&self) -> u32 {
        let p = &self.persistence;
        let n = &self.nutrients;
        let mut depths: Vec<u32> = Vec::new();
        if p.enabled {
            depths.extend(&p.lags);
            if p.prev_exceedance {
                depths.push(1);
            }
        }
        if n.enabled {
            depths.extend(&n.tn_lags);
            depths.extend(&n.tp_lags);
        }
        depths.into_iter().max().unwrap_or(0)
    }

    pub fn validate(&self) -> Result<()> {
        let ceiling = self.lookback_ceiling_days;
        if ceiling == 0 {
            return Err(config_err("features.lookback_ceiling_days must be >= 1"));
        }
        if self.version.trim().is_empty() {
            return Err(config_err("features.version must not be empty"));
        }

        let p = &self.persistence;
        let n = &self.nutrients;
        let s = &self.seasonality;
        let c = &self.context;

        if !(p.enabled || n.enabled || s.enabled || c.enabled || self.missingness.enabled) {
            return Err(config_err("at least one feature family must be enabled"));
        }

        if p.enabled {
            check_depths("features.persistence.lags", &p.lags, ceiling)?;
            check_depths("features.persistence.rolling_windows", &p.rolling_windows, ceiling)?;
            let empty = p.lags.is_empty()
                && p.rolling_windows.is_empty()
                && !p.prev_exceedance
                && !p.days_since_obs;
            if empty {
                return Err(config_err("features.persistence is enabled but selects no features"));
            }
        }
        if n.enabled {
            check_depths("features.nutrients.tn_lags", &n.tn_lags, ceiling)?;
            check_depths("features.nutrients.tp_lags", &n.tp_lags, ceiling)?;
            check_depths("features.nutrients.tn_rolling_windows", &n.tn_rolling_windows, ceiling)?;
            check_depths("features.nutrients.tp_rolling_windows", &n.tp_rolling_windows, ceiling)?;
            let empty = n.tn_lags.is_empty()
                && n.tp_lags.is_empty()
                && n.tn_rolling_windows.is_empty()
                && n.tp_rolling_windows.is_empty()
                && !n.days_since_obs;
            if empty {
                return Err(config_err("features.nutrients is enabled but selects no features"));
            }
        }
        if s.enabled && !(s.month || s.month_cyclic || s.day_of_year) {
            return Err(config_err("features.seasonality is enabled but selects no features"));
        }
        if c.enabled && !(c.ph || c.temperature) {
            return Err(config_err("features.context is enabled but selects no features"));
        }
        Ok(())
    }
}

/// Every lag depth or rolling window must be in 1..=ceiling and unique.
fn check_depths(name: &str, depths: &[u32], ceiling: u32) -> Result<()> {
    let mut seen = std::collections::BTreeSet::new();
    for &d in depths {
        if d == 0 {
            return Err(config_err(&format!("{} entries must be >= 1 (got 0)", name)));
        }
        if d > ceiling {
            return Err(config_err(&format!(
                "{} entry {} exceeds the lookback ceiling of {} days",
                name, d, ceiling
            )));
        }
        if !seen.insert(d) {
            return Err(config_err(&format!("{} contains duplicate entry {}", name, d)));
        }
    }
    Ok(())
}

fn config_err(msg: &str) -> PipelineError {
    PipelineError::Config(msg.to_string())
}

pub(crate) fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
