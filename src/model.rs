/// Observation, WideRow, FeatureRow, LabelRow, PipelineError
/// core data structures and error handling
///
/// Core data types for the bloom-risk pipeline.
///
/// This module defines the shared domain model imported by all other modules.
/// It contains no logic beyond small accessors, and no I/O.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

use crate::parity::ParityReport;

// ---------------------------------------------------------------------------
// Determinands
// ---------------------------------------------------------------------------

/// The five determinands carried on the daily grid, in column order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Determinand {
    Chlorophyll,
    TotalPhosphorus,
    TotalNitrogen,
    Ph,
    Temperature,
}

impl Determinand {
    pub const ALL: [Determinand; 5] = [
        Determinand::Chlorophyll,
        Determinand::TotalPhosphorus,
        Determinand::TotalNitrogen,
        Determinand::Ph,
        Determinand::Temperature,
    ];

    /// Position of this determinand in `WideRow::values`.
    pub fn index(self) -> usize {
        match self {
            Determinand::Chlorophyll => 0,
            Determinand::TotalPhosphorus => 1,
            Determinand::TotalNitrogen => 2,
            Determinand::Ph => 3,
            Determinand::Temperature => 4,
        }
    }

    /// Column name used in the wide table and as a feature-name prefix.
    pub fn column(self) -> &'static str {
        match self {
            Determinand::Chlorophyll => "chl",
            Determinand::TotalPhosphorus => "tp",
            Determinand::TotalNitrogen => "tn",
            Determinand::Ph => "ph",
            Determinand::Temperature => "temp",
        }
    }
}

impl std::fmt::Display for Determinand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.column())
    }
}

// ---------------------------------------------------------------------------
// Observation types
// ---------------------------------------------------------------------------

/// Censoring qualifier reported alongside a laboratory result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Censoring {
    #[default]
    Uncensored,
    /// Reported as "<x": below the limit of detection.
    BelowDetectionLimit,
    /// Reported as ">x": above the measurable range.
    AboveRange,
}

/// A single point-in-time water-quality measurement.
///
/// Corresponds to one row of an EA water-quality observation page. `value`
/// is `None` when the upstream result was not numeric; the clean layer
/// counts and drops those rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub timestamp: DateTime<Utc>,
    pub site_id: String,
    pub determinand_code: String, // EA notation, e.g. "7887"
    pub value: Option<f64>,
    pub unit: Option<String>,
    pub censoring: Censoring,
}

// ---------------------------------------------------------------------------
// Table rows
// ---------------------------------------------------------------------------

/// One calendar day on the wide base grid.
///
/// `values` and `ages_days` are indexed by `Determinand::index`. An age of
/// 0 means the value was observed on `date` itself; larger ages only occur
/// when the wide builder is configured to carry values forward.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WideRow {
    pub date: NaiveDate,
    pub values: [Option<f64>; 5],
    pub ages_days: [Option<u32>; 5],
}

impl WideRow {
    pub fn empty(date: NaiveDate) -> Self {
        Self {
            date,
            values: [None; 5],
            ages_days: [None; 5],
        }
    }

    pub fn get(&self, determinand: Determinand) -> Option<f64> {
        self.values[determinand.index()]
    }

    /// Value only if it was observed on this very date.
    pub fn observed_today(&self, determinand: Determinand) -> Option<f64> {
        match self.ages_days[determinand.index()] {
            Some(0) => self.values[determinand.index()],
            _ => None,
        }
    }
}

/// One row of the feature table. `values` lines up with
/// `FeatureTable::columns`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    pub date: NaiveDate,
    pub values: Vec<Option<f64>>,
}

/// Supervised target for one date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Label {
    Exceedance,
    NoExceedance,
    Unlabelable(UnlabelableReason),
}

/// Why a date could not be labelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnlabelableReason {
    /// The forward window runs past the end of the available data.
    IncompleteWindow,
    /// The window is complete but holds too few chlorophyll observations.
    SparseWindow,
}

impl Label {
    /// 1/0 for labelled rows, `None` for unlabelable ones.
    pub fn as_binary(self) -> Option<u8> {
        match self {
            Label::Exceedance => Some(1),
            Label::NoExceedance => Some(0),
            Label::Unlabelable(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelRow {
    pub date: NaiveDate,
    pub label: Label,
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that can arise anywhere in the pipeline.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// The configuration is internally inconsistent.
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// An input record could not be turned into an `Observation`.
    #[error("Invalid observation at row {row}: {reason}")]
    InvalidObservation { row: usize, reason: String },

    #[error("Unknown determinand code: {0}")]
    UnknownDeterminand(String),

    #[error("Empty date range: {start} is after {end}")]
    EmptyDateRange { start: NaiveDate, end: NaiveDate },

    #[error("Cannot derive threshold: {0}")]
    ThresholdDerivation(String),

    /// Scoring was refused because it diverges from the frozen training cycle.
    #[error("Train/score parity violated: {0}")]
    Parity(ParityReport),

    #[error("Site not configured: {0}")]
    UnknownSite(String),
}

/// Type alias for Results using PipelineError
pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_determinand_indexes_are_distinct_and_dense() {
        let mut seen = [false; 5];
        for det in Determinand::ALL {
            assert!(!seen[det.index()], "duplicate index for {}", det);
            seen[det.index()] = true;
        }
        assert!(seen.iter().all(|s| *s));
    }

    #[test]
    fn test_observed_today_ignores_carried_values() {
        let date = NaiveDate::from_ymd_opt(2020, 6, 1).unwrap();
        let mut row = WideRow::empty(date);
        row.values[Determinand::Chlorophyll.index()] = Some(12.0);
        row.ages_days[Determinand::Chlorophyll.index()] = Some(2);
        assert_eq!(row.get(Determinand::Chlorophyll), Some(12.0));
        assert_eq!(row.observed_today(Determinand::Chlorophyll), None);
    }

    #[test]
    fn test_label_binary_encoding() {
        assert_eq!(Label::Exceedance.as_binary(), Some(1));
        assert_eq!(Label::NoExceedance.as_binary(), Some(0));
        assert_eq!(
            Label::Unlabelable(UnlabelableReason::IncompleteWindow).as_binary(),
            None
        );
    }
}
