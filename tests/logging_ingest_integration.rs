/// Logger installation and file-based observation loading
///
/// Tests verify:
/// 1. `init_logger` installs the file sink once; stage summaries land in it
/// 2. `load_observations` reads an EA page from disk and reports bad paths
///
/// Kept in its own test binary: the logger is process-global.
///
/// Run with: cargo test --test logging_ingest_integration

use bloomrisk_service::ingest::ea_wqe::load_observations;
use bloomrisk_service::logging::{Stage, init_logger, log_stage_summary};
use bloomrisk_service::model::{Censoring, PipelineError};
use log::LevelFilter;
use std::path::PathBuf;

fn temp_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("bloomrisk_{}_{}", name, std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
    dir
}

// ---------------------------------------------------------------------------
// 1. Logger
// ---------------------------------------------------------------------------

#[test]
fn test_stage_summaries_reach_log_file() {
    let dir = temp_dir("log");
    let log_path = dir.join("pipeline.log");
    let log_file = log_path.to_str().expect("temp path should be UTF-8");

    init_logger(LevelFilter::Info, Some(log_file), true).expect("first install succeeds");
    assert!(
        init_logger(LevelFilter::Debug, None, false).is_err(),
        "a second logger must not replace the first"
    );

    log_stage_summary(Stage::Clean, 10, 7, 3);
    log_stage_summary(Stage::Labels, 5, 0, 5);
    log_stage_summary(Stage::Wide, 4, 4, 0);
    log::debug!(target: "features", "below the installed level");

    let written = std::fs::read_to_string(&log_path).expect("log file should exist");
    let line = |needle: &str| written.lines().find(|l| l.contains(needle)).map(str::to_string);

    let clean = line("CLEAN: 7/10 rows kept, 3 dropped").expect("clean summary logged");
    assert!(clean.contains("WARN"));
    let labels = line("LABEL: 0/5 rows kept, 5 dropped").expect("label summary logged");
    assert!(labels.contains("ERROR"));
    let wide = line("WIDE: 4/4 rows kept, 0 dropped").expect("wide summary logged");
    assert!(wide.contains("INFO"));
    assert!(line("below the installed level").is_none());

    let _ = std::fs::remove_dir_all(&dir);
}

// ---------------------------------------------------------------------------
// 2. Loading observations from disk
// ---------------------------------------------------------------------------

#[test]
fn test_load_observations_from_file() {
    let dir = temp_dir("page");
    let path = dir.join("observations.csv");
    std::fs::write(
        &path,
        "@id,samplingPoint.notation,phenomenonTime,determinand.notation,result,unit,resultQualifier.notation\n\
         1,NW-88010013,2023-06-01T09:30:00,7887,14.2,ug/l,\n\
         2,NW-88010013,2023-06-01T09:30:00,0348,0.005,mg/l,<\n\
         3,NW-88010013,2023-06-08T10:00:00,7887,n/a,ug/l,\n",
    )
    .unwrap();

    let observations = load_observations(&path).expect("page on disk should load");
    assert_eq!(observations.len(), 3);
    assert_eq!(observations[0].value, Some(14.2));
    assert_eq!(observations[1].censoring, Censoring::BelowDetectionLimit);
    assert_eq!(observations[2].value, None);

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn test_load_observations_reports_missing_file() {
    let err = load_observations("/nonexistent/observations.csv").expect_err("should fail");
    match err {
        PipelineError::Io { path, .. } => {
            assert_eq!(path, PathBuf::from("/nonexistent/observations.csv"))
        }
        other => panic!("expected an I/O error, got {:?}", other),
    }
}
