/// Feature transform engine.
///
/// Turns a site's wide table into a feature table of the same length and
/// date alignment. Families and their parameters come from `FeatureConfig`;
/// the column set is a pure function of the config, so training and scoring
/// always agree on names and order.
///
/// History-dependent columns (lags, rolling means, previous exceedance,
/// days since last observation) go through `analysis::series`, which only
/// aggregates after a shift of at least one day. Only the context family
/// (pH and temperature as of the row's date) and the missingness flags read
/// the row's own date. A missingness flag is 0 only for a same-day sample;
/// carried values still count as missing.

use serde::{Deserialize, Serialize};

use crate::analysis::calendar;
use crate::analysis::series::{self, Shift};
use crate::config::{FeatureConfig, SiteConfig, SiteMode};
use crate::model::{Determinand, FeatureRow, PipelineError, Result};
use crate::threshold::FrozenThreshold;
use crate::wide::WideTable;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureTable {
    /// Present unless site identity is excluded.
    pub site_id: Option<String>,
    pub columns: Vec<String>,
    pub rows: Vec<FeatureRow>,
}

impl FeatureTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Values of one named column, top to bottom.
    pub fn column(&self, name: &str) -> Option<Vec<Option<f64>>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(|r| r.values[idx]).collect())
    }

    pub fn latest(&self) -> Option<&FeatureRow> {
        self.rows.last()
    }
}

/// Column names produced by `config` for `site`, in table order.
pub fn feature_columns(config: &FeatureConfig, site: &SiteConfig) -> Vec<String> {
    let mut cols = Vec::new();

    let p = &config.persistence;
    if p.enabled {
        cols.extend(p.lags.iter().map(|k| format!("chl_lag_{}", k)));
        cols.extend(p.rolling_windows.iter().map(|w| format!("chl_roll_mean_{}", w)));
        if p.prev_exceedance {
            cols.push("chl_prev_exceed".to_string());
        }
        if p.days_since_obs {
            cols.push("chl_days_since_obs".to_string());
        }
    }

    let s = &config.seasonality;
    if s.enabled {
        if s.month {
            cols.push("month".to_string());
        }
        if s.month_cyclic {
            cols.push("month_sin".to_string());
            cols.push("month_cos".to_string());
        }
        if s.day_of_year {
            cols.push("doy_sin".to_string());
            cols.push("doy_cos".to_string());
        }
    }

    let n = &config.nutrients;
    if n.enabled {
        cols.extend(n.tn_lags.iter().map(|k| format!("tn_lag_{}", k)));
        cols.extend(n.tp_lags.iter().map(|k| format!("tp_lag_{}", k)));
        cols.extend(n.tn_rolling_windows.iter().map(|w| format!("tn_roll_mean_{}", w)));
        cols.extend(n.tp_rolling_windows.iter().map(|w| format!("tp_roll_mean_{}", w)));
        if n.days_since_obs {
            cols.push("tn_days_since_obs".to_string());
            cols.push("tp_days_since_obs".to_string());
        }
    }

    let c = &config.context;
    if c.enabled {
        if c.ph {
            cols.push("ph".to_string());
        }
        if c.temperature {
            cols.push("temp".to_string());
        }
    }

    if config.missingness.enabled {
        cols.extend(Determinand::ALL.iter().map(|d| format!("miss_{}", d.column())));
    }

    if site.mode == SiteMode::Categorical {
        cols.extend(site.ids.iter().map(|id| format!("site_is_{}", id)));
    }

    cols
}

/// Build the feature table for one site's wide table.
///
/// Fails only when site identity is required (diagnostic or categorical
/// mode) and the table's site is not in `site.ids`.
pub fn build_feature_table(
    wide: &WideTable,
    config: &FeatureConfig,
    threshold: &FrozenThreshold,
    site: &SiteConfig,
) -> Result<FeatureTable> {
    let known_site = site.ids.iter().any(|id| *id == wide.site_id);
    if site.mode != SiteMode::Excluded && !known_site {
        return Err(PipelineError::UnknownSite(wide.site_id.clone()));
    }

    let columns = feature_columns(config, site);
    // Column-major build, transposed into rows at the end.
    let mut data: Vec<Vec<Option<f64>>> = Vec::with_capacity(columns.len());
    let ceiling = config.lookback_ceiling_days as usize;

    let p = &config.persistence;
    if p.enabled {
        let chl = wide.series(Determinand::Chlorophyll);
        let chl_observed = wide.observed_series(Determinand::Chlorophyll);
        push_lags(&mut data, &chl, &p.lags);
        push_rolling(&mut data, &chl_observed, &p.rolling_windows);
        if p.prev_exceedance {
            // Null when yesterday has no value; missingness is its own flag.
            data.push(
                series::lag(&chl, Shift::ONE)
                    .into_iter()
                    .map(|v| v.map(|x| if threshold.is_exceeded_by(x, true) { 1.0 } else { 0.0 }))
                    .collect(),
            );
        }
        if p.days_since_obs {
            data.push(series::days_since_previous(&chl_observed, ceiling));
        }
    }

    let s = &config.seasonality;
    if s.enabled {
        let dates: Vec<_> = wide.rows.iter().map(|r| r.date).collect();
        if s.month {
            data.push(dates.iter().map(|d| Some(calendar::month(*d))).collect());
        }
        if s.month_cyclic {
            let pairs: Vec<_> = dates.iter().map(|d| calendar::month_cyclic(*d)).collect();
            data.push(pairs.iter().map(|(sin, _)| Some(*sin)).collect());
            data.push(pairs.iter().map(|(_, cos)| Some(*cos)).collect());
        }
        if s.day_of_year {
            let pairs: Vec<_> = dates.iter().map(|d| calendar::day_of_year_cyclic(*d)).collect();
            data.push(pairs.iter().map(|(sin, _)| Some(*sin)).collect());
            data.push(pairs.iter().map(|(_, cos)| Some(*cos)).collect());
        }
    }

    let n = &config.nutrients;
    if n.enabled {
        let tn = wide.series(Determinand::TotalNitrogen);
        let tp = wide.series(Determinand::TotalPhosphorus);
        let tn_observed = wide.observed_series(Determinand::TotalNitrogen);
        let tp_observed = wide.observed_series(Determinand::TotalPhosphorus);
        push_lags(&mut data, &tn, &n.tn_lags);
        push_lags(&mut data, &tp, &n.tp_lags);
        push_rolling(&mut data, &tn_observed, &n.tn_rolling_windows);
        push_rolling(&mut data, &tp_observed, &n.tp_rolling_windows);
        if n.days_since_obs {
            data.push(series::days_since_previous(&tn_observed, ceiling));
            data.push(series::days_since_previous(&tp_observed, ceiling));
        }
    }

    let c = &config.context;
    if c.enabled {
        if c.ph {
            data.push(wide.series(Determinand::Ph));
        }
        if c.temperature {
            data.push(wide.series(Determinand::Temperature));
        }
    }

    if config.missingness.enabled {
        for det in Determinand::ALL {
            data.push(series::missing_flags(&wide.observed_series(det)));
        }
    }

    if site.mode == SiteMode::Categorical {
        for id in &site.ids {
            let flag = if *id == wide.site_id { 1.0 } else { 0.0 };
            data.push(vec![Some(flag); wide.len()]);
        }
    }

    debug_assert_eq!(data.len(), columns.len());

    let rows: Vec<FeatureRow> = wide
        .rows
        .iter()
        .enumerate()
        .map(|(i, row)| FeatureRow {
            date: row.date,
            values: data.iter().map(|col| col[i]).collect(),
        })
        .collect();

    let complete = rows.iter().filter(|r| r.values.iter().all(Option::is_some)).count();
    log::info!(
        target: "features",
        "{}: {} rows x {} columns ({}), {} rows fully populated",
        wide.site_id,
        rows.len(),
        columns.len(),
        config.version,
        complete
    );

    let site_id = match site.mode {
        SiteMode::Excluded => None,
        SiteMode::Diagnostic | SiteMode::Categorical => Some(wide.site_id.clone()),
    };

    Ok(FeatureTable { site_id, columns, rows })
}

fn push_lags(data: &mut Vec<Vec<Option<f64>>>, values: &[Option<f64>], depths: &[u32]) {
    for &k in depths {
        // Validated config never holds a zero depth.
        match Shift::new(k as usize) {
            Some(shift) => data.push(series::lag(values, shift)),
            None => data.push(vec![None; values.len()]),
        }
    }
}

fn push_rolling(data: &mut Vec<Vec<Option<f64>>>, values: &[Option<f64>], windows: &[u32]) {
    for &w in windows {
        data.push(series::shifted_rolling_mean(values, Shift::ONE, w as usize));
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::calendar::DateRange;
    use crate::config::{
        ContextFamily, MissingnessFamily, NutrientFamily, PersistenceFamily, SeasonalityFamily,
    };
    use crate::model::WideRow;
    use chrono::NaiveDate;

    const SITE: &str = "NW-88010013";

    fn start() -> NaiveDate {
        NaiveDate::from_ymd_opt(2021, 6, 1).unwrap()
    }

    fn wide_from_chl(chl: &[Option<f64>]) -> WideTable {
        let end = calendar::days_after(start(), chl.len() as u32 - 1);
        let range = DateRange::new(start(), end).unwrap();
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
            site_id: SITE.to_string(),
            range,
            rows,
        }
    }

    fn site(mode: SiteMode) -> SiteConfig {
        SiteConfig {
            ids: vec![SITE.to_string(), "NW-2".to_string()],
            mode,
        }
    }

    fn threshold() -> FrozenThreshold {
        FrozenThreshold::fixed("c1", 20.0).unwrap()
    }

    fn build_default(wide: &WideTable) -> FeatureTable {
        let cfg = FeatureConfig::default();
        build_feature_table(wide, &cfg, &threshold(), &site(SiteMode::Excluded)).unwrap()
    }

    fn dense(values: &[f64]) -> Vec<Option<f64>> {
        values.iter().copied().map(Some).collect()
    }

    #[test]
    fn test_default_columns() {
        let cols = feature_columns(&FeatureConfig::default(), &site(SiteMode::Excluded));
        assert_eq!(
            cols,
            vec![
                "chl_lag_1",
                "chl_lag_7",
                "chl_roll_mean_7",
                "chl_roll_mean_30",
                "chl_prev_exceed",
                "chl_days_since_obs",
                "month",
                "doy_sin",
                "doy_cos",
                "tn_lag_7",
                "tp_lag_7",
                "tn_roll_mean_30",
                "tp_roll_mean_30",
                "ph",
                "temp",
                "miss_chl",
                "miss_tp",
                "miss_tn",
                "miss_ph",
                "miss_temp",
            ]
        );
    }

    #[test]
    fn test_output_aligned_with_wide_table() {
        let wide = wide_from_chl(&dense(&[1.0, 2.0, 3.0, 4.0]));
        let table = build_default(&wide);
        assert_eq!(table.len(), wide.len());
        for (f, w) in table.rows.iter().zip(&wide.rows) {
            assert_eq!(f.date, w.date);
            assert_eq!(f.values.len(), table.columns.len());
        }
    }

    #[test]
    fn test_scenario_lag_and_prev_exceed() {
        let wide = wide_from_chl(&dense(&[10.0, 10.0, 10.0, 25.0, 10.0, 10.0, 10.0, 10.0]));
        let table = build_default(&wide);
        let lag1 = table.column("chl_lag_1").unwrap();
        assert_eq!(lag1[0], None);
        assert_eq!(lag1[4], Some(25.0));
        let prev = table.column("chl_prev_exceed").unwrap();
        assert_eq!(prev[4], Some(1.0));
        assert_eq!(prev[3], Some(0.0));
        assert_eq!(prev[0], None);
    }

    #[test]
    fn test_rolling_mean_on_second_day_is_first_value() {
        let wide = wide_from_chl(&dense(&[4.0, 9.0, 9.0]));
        let table = build_default(&wide);
        let roll7 = table.column("chl_roll_mean_7").unwrap();
        assert_eq!(roll7[0], None);
        assert_eq!(roll7[1], Some(4.0));
    }

    #[test]
    fn test_perturbing_today_and_later_leaves_history_features_alone() {
        let base: Vec<f64> = (0..40).map(|i| 5.0 + i as f64).collect();
        let d = 25;
        let mut perturbed = base.clone();
        for v in &mut perturbed[d..] {
            *v += 1_000.0;
        }
        let a = build_default(&wide_from_chl(&dense(&base)));
        let b = build_default(&wide_from_chl(&dense(&perturbed)));
        let history = [
            "chl_lag_1",
            "chl_lag_7",
            "chl_roll_mean_7",
            "chl_roll_mean_30",
            "chl_prev_exceed",
            "chl_days_since_obs",
        ];
        for name in history {
            let (ca, cb) = (a.column(name).unwrap(), b.column(name).unwrap());
            assert_eq!(ca[..=d], cb[..=d], "{} moved at or before the perturbed day", name);
        }
    }

    #[test]
    fn test_missingness_flags_follow_raw_value() {
        let wide = wide_from_chl(&[Some(3.0), None, Some(0.0)]);
        let table = build_default(&wide);
        assert_eq!(table.column("miss_chl").unwrap(), vec![Some(0.0), Some(1.0), Some(0.0)]);
        assert_eq!(table.column("miss_ph").unwrap(), vec![Some(1.0); 3]);
    }

    #[test]
    fn test_missingness_ignores_carried_values() {
        use crate::clean::CleanObservation;
        use crate::config::WideConfig;
        use crate::model::Censoring;
        use crate::wide::build_wide_table;
        use chrono::{TimeZone, Utc};

        let observations = vec![CleanObservation {
            timestamp: Utc.with_ymd_and_hms(2021, 7, 1, 9, 0, 0).unwrap(),
            site_id: SITE.to_string(),
            determinand: Determinand::Chlorophyll,
            value: 11.0,
            censoring: Censoring::Uncensored,
        }];
        let range = DateRange::new(
            NaiveDate::from_ymd_opt(2021, 7, 1).unwrap(),
            NaiveDate::from_ymd_opt(2021, 7, 4).unwrap(),
        )
        .unwrap();
        let carry = WideConfig { carry_forward_days: 3 };
        let wide = build_wide_table(&observations, SITE, range, &carry);
        assert_eq!(wide.series(Determinand::Chlorophyll), vec![Some(11.0); 4]);

        let table = build_default(&wide);
        assert_eq!(
            table.column("miss_chl").unwrap(),
            vec![Some(0.0), Some(1.0), Some(1.0), Some(1.0)]
        );
        // Lags still read the carried value.
        assert_eq!(table.column("chl_lag_1").unwrap()[2], Some(11.0));
    }

    #[test]
    fn test_build_is_deterministic() {
        let wide = wide_from_chl(&[Some(3.0), None, Some(8.0), Some(21.0), None]);
        assert_eq!(build_default(&wide), build_default(&wide));
    }

    #[test]
    fn test_family_toggles() {
        let cfg = FeatureConfig {
            persistence: PersistenceFamily {
                enabled: false,
                ..PersistenceFamily::default()
            },
            nutrients: NutrientFamily {
                enabled: false,
                ..NutrientFamily::default()
            },
            context: ContextFamily {
                enabled: false,
                ..ContextFamily::default()
            },
            missingness: MissingnessFamily { enabled: false },
            seasonality: SeasonalityFamily {
                enabled: true,
                month: false,
                month_cyclic: true,
                day_of_year: false,
            },
            ..FeatureConfig::default()
        };
        let cols = feature_columns(&cfg, &site(SiteMode::Excluded));
        assert_eq!(cols, vec!["month_sin", "month_cos"]);
    }

    #[test]
    fn test_site_modes() {
        let wide = wide_from_chl(&dense(&[1.0, 2.0]));
        let cfg = FeatureConfig::default();

        let build = |mode| build_feature_table(&wide, &cfg, &threshold(), &site(mode));

        let excluded = build(SiteMode::Excluded).unwrap();
        assert_eq!(excluded.site_id, None);
        assert!(!excluded.columns.iter().any(|c| c.starts_with("site_is_")));

        let diagnostic = build(SiteMode::Diagnostic).unwrap();
        assert_eq!(diagnostic.site_id.as_deref(), Some(SITE));
        assert_eq!(diagnostic.columns, excluded.columns);

        let categorical = build(SiteMode::Categorical).unwrap();
        assert_eq!(categorical.column(&format!("site_is_{}", SITE)).unwrap(), vec![Some(1.0); 2]);
        assert_eq!(categorical.column("site_is_NW-2").unwrap(), vec![Some(0.0); 2]);
    }

    #[test]
    fn test_unknown_site_rejected_when_identity_is_used() {
        let mut wide = wide_from_chl(&dense(&[1.0]));
        wide.site_id = "NW-unknown".to_string();
        let cfg = FeatureConfig::default();
        assert!(build_feature_table(&wide, &cfg, &threshold(), &site(SiteMode::Excluded)).is_ok());
        let err = build_feature_table(&wide, &cfg, &threshold(), &site(SiteMode::Categorical))
            .unwrap_err();
        assert!(matches!(err, PipelineError::UnknownSite(_)));
    }
}
