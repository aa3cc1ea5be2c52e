/// Wide base table builder.
///
/// Aligns one site's cleaned observations onto a gap-free daily grid: one
/// row per calendar day in the range, one nullable slot per determinand.
/// Matching is backward-only. The row for day `d` holds the latest
/// observation taken on `d` itself, or, when `carry_forward_days > 0`, the
/// latest one within that many days before `d`. Nothing observed after `d`
/// can reach row `d`, and nothing is interpolated or averaged.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::analysis::calendar::{DateRange, days_before};
use crate::clean::CleanObservation;
use crate::config::WideConfig;
use crate::model::{Determinand, WideRow};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WideTable {
    pub site_id: String,
    pub range: DateRange,
    pub rows: Vec<WideRow>,
}

impl WideTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Column for one determinand, carried values included.
    pub fn series(&self, determinand: Determinand) -> Vec<Option<f64>> {
        self.rows.iter().map(|r| r.get(determinand)).collect()
    }

    /// Column for one determinand with only same-day observations.
    pub fn observed_series(&self, determinand: Determinand) -> Vec<Option<f64>> {
        self.rows.iter().map(|r| r.observed_today(determinand)).collect()
    }

    /// Last grid date on which `determinand` was observed.
    pub fn last_observed(&self, determinand: Determinand) -> Option<NaiveDate> {
        self.rows
            .iter()
            .rev()
            .find(|r| r.observed_today(determinand).is_some())
            .map(|r| r.date)
    }
}

/// Build the wide table for `site_id` over `range`.
///
/// Observations from other sites are ignored. Zero matching observations
/// give an all-null table, not an error.
pub fn build_wide_table(
    observations: &[CleanObservation],
    site_id: &str,
    range: DateRange,
    config: &WideConfig,
) -> WideTable {
    let earliest = days_before(range.start(), config.carry_forward_days);

    // Per determinand: date -> (timestamp, value) of the latest observation that day.
    let mut daily: [BTreeMap<NaiveDate, (DateTime<Utc>, f64)>; 5] = Default::default();
    let mut matched = 0usize;

    for obs in observations.iter().filter(|o| o.site_id == site_id) {
        let date = obs.timestamp.date_naive();
        if date < earliest || date > range.end() {
            continue;
        }
        matched += 1;
        let slot = &mut daily[obs.determinand.index()];
        match slot.get(&date) {
            // Equal timestamps: the later record in input order wins.
            Some((ts, _)) if *ts > obs.timestamp => {}
            _ => {
                slot.insert(date, (obs.timestamp, obs.value));
            }
        }
    }

    let rows: Vec<WideRow> = range
        .iter()
        .map(|date| {
            let mut row = WideRow::empty(date);
            for det in Determinand::ALL {
                let latest = daily[det.index()].range(..=date).next_back();
                let Some((&seen, &(_, value))) = latest else {
                    continue;
                };
                let age = (date - seen).num_days() as u32;
                if age <= config.carry_forward_days {
                    row.values[det.index()] = Some(value);
                    row.ages_days[det.index()] = Some(age);
                }
            }
            row
        })
        .collect();

    let chl_days = rows
        .iter()
        .filter(|r| r.observed_today(Determinand::Chlorophyll).is_some())
        .count();
    log::info!(
        target: "wide",
        "{}: {} days {}..{}, {} observations matched, chlorophyll on {} days",
        site_id,
        rows.len(),
        range.start(),
        range.end(),
        matched,
        chl_days
    );
    if matched == 0 {
        log::warn!(target: "wide", "{}: no observations in range, table is all null", site_id);
    }

    WideTable {
        site_id: site_id.to_string(),
        range,
        rows,
    }
}

/// One wide table per site, keyed by site id.
pub fn build_wide_tables(
    observations: &[CleanObservation],
    site_ids: &[String],
    range: DateRange,
    config: &WideConfig,
) -> BTreeMap<String, WideTable> {
    site_ids
        .iter()
        .map(|site| (site.clone(), build_wide_table(observations, site, range, config)))
        .collect()
}
