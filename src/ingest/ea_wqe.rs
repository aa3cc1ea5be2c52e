/// Environment Agency water-quality observation CSV parser.
///
/// Parses pages exported from the EA Water Quality archive
/// (`/sampling-point/{notation}/observation`, `Accept: text/csv`) into
/// `Observation`s. Only the columns the pipeline needs are read; the
/// archive adds fields over time, so extra columns are ignored.
///
/// Column contract:
///   samplingPoint.notation, phenomenonTime, determinand.notation,
///   result, unit (optional), resultQualifier.notation (optional)

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use csv::{ReaderBuilder, StringRecord};
use std::path::Path;

use crate::model::{Censoring, Observation, PipelineError, Result};

pub const COL_SITE: &str = "samplingPoint.notation";
pub const COL_TIME: &str = "phenomenonTime";
pub const COL_DETERMINAND: &str = "determinand.notation";
pub const COL_RESULT: &str = "result";
pub const COL_UNIT: &str = "unit";
pub const COL_QUALIFIER: &str = "resultQualifier.notation";

/// Naive timestamp layouts seen in archive exports; read as UTC.
const NAIVE_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M"];

// ============================================================================
// Column lookup
// ============================================================================

struct Columns {
    site: usize,
    time: usize,
    determinand: usize,
    result: usize,
    unit: Option<usize>,
    qualifier: Option<usize>,
}

impl Columns {
    fn from_headers(headers: &StringRecord) -> Result<Self> {
        let find = |name: &str| headers.iter().position(|h| h.trim() == name);
        let require = |name: &str| {
            find(name).ok_or_else(|| PipelineError::InvalidObservation {
                row: 0,
                reason: format!("missing required column '{}'", name),
            })
        };
        Ok(Self {
            site: require(COL_SITE)?,
            time: require(COL_TIME)?,
            determinand: require(COL_DETERMINAND)?,
            result: require(COL_RESULT)?,
            unit: find(COL_UNIT),
            qualifier: find(COL_QUALIFIER),
        })
    }
}

// ============================================================================
// Parsing
// ============================================================================

/// Parse an EA observation CSV page.
///
/// An empty body is an empty page, not an error. Rows with an unparseable
/// timestamp or a missing site/determinand are errors. Non-numeric results
/// become `value: None` so the clean layer can count them.
pub fn parse_observations_csv(text: &str) -> Result<Vec<Observation>> {
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }

    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(text.as_bytes());

    let columns = Columns::from_headers(reader.headers()?)?;
    let mut observations = Vec::new();

    for (i, record) in reader.records().enumerate() {
        let record = record?;
        let row = i + 1;
        let field = |idx: usize| record.get(idx).map(str::trim).unwrap_or("");

        let site_id = field(columns.site);
        if site_id.is_empty() {
            return Err(invalid(row, "empty sampling point"));
        }
        let determinand_code = field(columns.determinand);
        if determinand_code.is_empty() {
            return Err(invalid(row, "empty determinand notation"));
        }
        let raw_time = field(columns.time);
        let timestamp = parse_timestamp(raw_time)
            .ok_or_else(|| invalid(row, &format!("unparseable timestamp '{}'", raw_time)))?;

        let (value, mut censoring) = parse_result(field(columns.result));
        if let Some(q) = columns.qualifier {
            match field(q) {
                "<" => censoring = Censoring::BelowDetectionLimit,
                ">" => censoring = Censoring::AboveRange,
                _ => {}
            }
        }

        let unit = columns
            .unit
            .map(field)
            .filter(|u| !u.is_empty())
            .map(String::from);

        observations.push(Observation {
            timestamp,
            site_id: site_id.to_string(),
            determinand_code: determinand_code.to_string(),
            value,
            unit,
            censoring,
        });
    }

    log::debug!(target: "ingest", "Parsed {} observation rows", observations.len());
    Ok(observations)
}

/// Read and parse an EA observation CSV file.
pub fn load_observations(path: impl AsRef<Path>) -> Result<Vec<Observation>> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|source| PipelineError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let observations = parse_observations_csv(&text)?;
    log::info!(
        target: "ingest",
        "Loaded {} observations from {}",
        observations.len(),
        path.display()
    );
    Ok(observations)
}

/// RFC 3339 timestamps keep their offset; naive ones are read as UTC; a bare
/// date is midnight UTC.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Numeric result with any inline "<" / ">" censoring prefix.
fn parse_result(s: &str) -> (Option<f64>, Censoring) {
    let s = s.trim();
    let (censoring, number) = if let Some(rest) = s.strip_prefix('<') {
        (Censoring::BelowDetectionLimit, rest)
    } else if let Some(rest) = s.strip_prefix('>') {
        (Censoring::AboveRange, rest)
    } else {
        (Censoring::Uncensored, s)
    };
    let value = number.trim().parse::<f64>().ok().filter(|v| v.is_finite());
    (value, censoring)
}

fn invalid(row: usize, reason: &str) -> PipelineError {
    PipelineError::InvalidObservation {
        row,
        reason: reason.to_string(),
    }
}

// ============================================================================
// Tests
// ============================================================================
