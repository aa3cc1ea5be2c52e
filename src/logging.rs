/// Structured logging for the bloom-risk pipeline
///
/// A `log::Log` backend that tags every entry with the pipeline stage that
/// produced it (taken from the log target), with optional timestamps on the
/// console and an append-only log file for scheduled runs.
///
/// Modules log through the `log` macros with a stage target:
///
/// ```ignore
/// log::warn!(target: "labels", "{} dates unlabelable", n);
/// ```

use chrono::Utc;
use log::{Level, LevelFilter, Log, Metadata, Record};
use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Pipeline stages
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Ingest,
    Clean,
    Wide,
    Features,
    Labels,
    Parity,
    Artifacts,
    System,
}

impl Stage {
    /// Log target used by modules for this stage.
    pub fn target(self) -> &'static str {
        match self {
            Stage::Ingest => "ingest",
            Stage::Clean => "clean",
            Stage::Wide => "wide",
            Stage::Features => "features",
            Stage::Labels => "labels",
            Stage::Parity => "parity",
            Stage::Artifacts => "artifacts",
            Stage::System => "system",
        }
    }

    /// Stage for a log target; anything unrecognised is `System`.
    pub fn from_target(target: &str) -> Stage {
        match target {
            "ingest" => Stage::Ingest,
            "clean" => Stage::Clean,
            "wide" => Stage::Wide,
            "features" => Stage::Features,
            "labels" => Stage::Labels,
            "parity" => Stage::Parity,
            "artifacts" => Stage::Artifacts,
            _ => Stage::System,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Ingest => write!(f, "INGEST"),
            Stage::Clean => write!(f, "CLEAN"),
            Stage::Wide => write!(f, "WIDE"),
            Stage::Features => write!(f, "FEAT"),
            Stage::Labels => write!(f, "LABEL"),
            Stage::Parity => write!(f, "PARITY"),
            Stage::Artifacts => write!(f, "ART"),
            Stage::System => write!(f, "SYS"),
        }
    }
}

// ---------------------------------------------------------------------------
// Logger
// ---------------------------------------------------------------------------

static LOGGER: OnceLock<PipelineLogger> = OnceLock::new();

pub struct PipelineLogger {
    /// Minimum log level to display
    min_level: LevelFilter,
    /// Optional file path for logging
    log_file: Option<PathBuf>,
    /// Whether to include timestamps in console output
    console_timestamps: bool,
}

impl PipelineLogger {
    fn append_to_file(path: &PathBuf, entry: &str) -> std::io::Result<()> {
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        writeln!(file, "{}", entry)?;
        Ok(())
    }
}

/// One log line as written to the log file.
pub fn format_entry(timestamp: &str, level: Level, stage: Stage, message: &str) -> String {
    format!("{} {:<5} {}: {}", timestamp, level, stage, message)
}

impl Log for PipelineLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.min_level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let stage = Stage::from_target(record.target());
        let message = record.args().to_string();
        let timestamp = Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string();
        let entry = format_entry(&timestamp, record.level(), stage, &message);

        // Console output
        if self.console_timestamps {
            match record.level() {
                Level::Error | Level::Warn => eprintln!("{}", entry),
                _ => println!("{}", entry),
            }
        } else {
            match record.level() {
                Level::Error => eprintln!("   ✗ {}: {}", stage, message),
                Level::Warn => eprintln!("   ⚠ {}: {}", stage, message),
                Level::Info => println!("   {}", message),
                Level::Debug | Level::Trace => println!("   [DEBUG] {}", message),
            }
        }

        // File output
        if let Some(ref path) = self.log_file {
            if let Err(e) = Self::append_to_file(path, &entry) {
                eprintln!("Failed to write to log file {}: {}", path.display(), e);
            }
        }
    }

    fn flush(&self) {}
}

/// Install the pipeline logger as the global `log` backend.
///
/// Only the first call has an effect; later calls return an error from
/// `log::set_logger` and keep the first settings.
pub fn init_logger(
    min_level: LevelFilter,
    log_file: Option<&str>,
    console_timestamps: bool,
) -> Result<(), log::SetLoggerError> {
    let logger = LOGGER.get_or_init(|| PipelineLogger {
        min_level,
        log_file: log_file.map(PathBuf::from),
        console_timestamps,
    });
    log::set_logger(logger)?;
    log::set_max_level(logger.min_level);
    Ok(())
}

// ---------------------------------------------------------------------------
// Stage summaries
// ---------------------------------------------------------------------------

/// Log a per-stage row summary, escalating when rows were lost.
pub fn log_stage_summary(stage: Stage, total: usize, kept: usize, dropped: usize) {
    let message = format!("{}/{} rows kept, {} dropped", kept, total, dropped);

    if dropped == 0 {
        log::info!(target: stage.target(), "{}", message);
    } else if kept == 0 && total > 0 {
        log::error!(target: stage.target(), "{}", message);
    } else {
        log::warn!(target: stage.target(), "{}", message);
    }
}
