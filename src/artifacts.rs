/// Persisted artifacts.
///
/// Tables are CSV keyed by date, one file per site and table. Nulls are
/// empty cells and floats use Rust's shortest round-trip formatting, so the
/// same tables always produce the same bytes. Each feature table gets a
/// JSON sidecar recording the cycle, versions and fingerprint it was built
/// under.
///
/// Layout under an output directory:
///
/// ```text
/// threshold.json
/// manifest.json
/// <site>/wide.csv
/// <site>/features.csv
/// <site>/features.meta.json
/// <site>/labels.csv
/// <site>/labels.summary.json
/// <site>/viability.json
/// ```

use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::features::FeatureTable;
use crate::labels::LabelSummary;
use crate::model::{Determinand, Label, LabelRow, PipelineError, Result, UnlabelableReason};
use crate::wide::WideTable;

// ---------------------------------------------------------------------------
// Layout
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactLayout {
    root: PathBuf,
}

impl ArtifactLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn threshold_json(&self) -> PathBuf {
        self.root.join("threshold.json")
    }

    pub fn manifest_json(&self) -> PathBuf {
        self.root.join("manifest.json")
    }

    pub fn site_dir(&self, site_id: &str) -> PathBuf {
        self.root.join(site_id)
    }

    pub fn wide_csv(&self, site_id: &str) -> PathBuf {
        self.site_dir(site_id).join("wide.csv")
    }

    pub fn features_csv(&self, site_id: &str) -> PathBuf {
        self.site_dir(site_id).join("features.csv")
    }

    pub fn features_meta_json(&self, site_id: &str) -> PathBuf {
        self.site_dir(site_id).join("features.meta.json")
    }

    pub fn labels_csv(&self, site_id: &str) -> PathBuf {
        self.site_dir(site_id).join("labels.csv")
    }

    pub fn labels_summary_json(&self, site_id: &str) -> PathBuf {
        self.site_dir(site_id).join("labels.summary.json")
    }

    pub fn viability_json(&self, site_id: &str) -> PathBuf {
        self.site_dir(site_id).join("viability.json")
    }

    /// Creates the root and the site's directory.
    pub fn prepare_site(&self, site_id: &str) -> Result<()> {
        let dir = self.site_dir(site_id);
        std::fs::create_dir_all(&dir).map_err(|source| PipelineError::Io { path: dir, source })
    }
}

// ---------------------------------------------------------------------------
// Metadata sidecar
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureTableMetadata {
    pub cycle_id: String,
    pub site_id: String,
    pub feature_version: String,
    pub label_version: String,
    pub lookback_ceiling_days: u32,
    pub threshold_ug_l: f64,
    pub config_fingerprint: String,
    pub n_rows: usize,
    pub n_columns: usize,
    /// Positive share of labelled rows, when labels were built.
    pub pos_rate: Option<f64>,
}

// ---------------------------------------------------------------------------
// CSV writers
// ---------------------------------------------------------------------------

pub fn write_wide<W: Write>(table: &WideTable, out: W) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(out);
    let mut header = vec!["date".to_string()];
    header.extend(Determinand::ALL.iter().map(|d| d.column().to_string()));
    wtr.write_record(&header)?;
    for row in &table.rows {
        let mut record = vec![row.date.to_string()];
        record.extend(row.values.iter().map(|v| cell(*v)));
        wtr.write_record(&record)?;
    }
    wtr.flush().map_err(csv::Error::from)?;
    Ok(())
}

pub fn write_features<W: Write>(table: &FeatureTable, out: W) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(out);
    let mut header = vec!["date".to_string()];
    header.extend(table.columns.iter().cloned());
    wtr.write_record(&header)?;
    for row in &table.rows {
        let mut record = vec![row.date.to_string()];
        record.extend(row.values.iter().map(|v| cell(*v)));
        wtr.write_record(&record)?;
    }
    wtr.flush().map_err(csv::Error::from)?;
    Ok(())
}

/// `label` is 1/0 or empty; `status` names the unlabelable reason.
pub fn write_labels<W: Write>(rows: &[LabelRow], out: W) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(out);
    wtr.write_record(["date", "label", "status"])?;
    for row in rows {
        let label = row.label.as_binary().map(|b| b.to_string()).unwrap_or_default();
        let status = match row.label {
            Label::Exceedance => "exceedance",
            Label::NoExceedance => "no_exceedance",
            Label::Unlabelable(UnlabelableReason::IncompleteWindow) => "incomplete_window",
            Label::Unlabelable(UnlabelableReason::SparseWindow) => "sparse_window",
        };
        wtr.write_record([row.date.to_string(), label, status.to_string()])?;
    }
    wtr.flush().map_err(csv::Error::from)?;
    Ok(())
}

fn cell(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

// ---------------------------------------------------------------------------
// File wrappers
// ---------------------------------------------------------------------------

fn create(path: &Path) -> Result<std::fs::File> {
    std::fs::File::create(path).map_err(|source| PipelineError::Io {
        path: path.to_path_buf(),
        source,
    })
}

pub fn save_wide(table: &WideTable, path: impl AsRef<Path>) -> Result<()> {
    write_wide(table, create(path.as_ref())?)
}

pub fn save_features(table: &FeatureTable, path: impl AsRef<Path>) -> Result<()> {
    write_features(table, create(path.as_ref())?)
}

pub fn save_labels(rows: &[LabelRow], path: impl AsRef<Path>) -> Result<()> {
    write_labels(rows, create(path.as_ref())?)
}

pub fn save_json<T: Serialize>(value: &T, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json).map_err(|source| PipelineError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Writes every table for one site and logs where they went.
pub fn save_site_tables(
    layout: &ArtifactLayout,
    wide: &WideTable,
    features: &FeatureTable,
    labels: &[LabelRow],
    label_summary: &LabelSummary,
    metadata: &FeatureTableMetadata,
) -> Result<()> {
    let site = wide.site_id.as_str();
    layout.prepare_site(site)?;
    save_wide(wide, layout.wide_csv(site))?;
    save_features(features, layout.features_csv(site))?;
    save_json(metadata, layout.features_meta_json(site))?;
    save_labels(labels, layout.labels_csv(site))?;
    save_json(label_summary, layout.labels_summary_json(site))?;
    log::info!(
        target: "artifacts",
        "{}: wrote {} wide rows, {} feature rows, {} labels to {}",
        site,
        wide.len(),
        features.len(),
        labels.len(),
        layout.site_dir(site).display()
    );
    Ok(())
}
