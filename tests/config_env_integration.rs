/// Configuration discovery through the environment
///
/// Tests verify:
/// 1. `PipelineConfig::from_env` reads `.env`, then follows BLOOMRISK_CONFIG
/// 2. A BLOOMRISK_CONFIG pointing nowhere is reported with its path
///
/// Kept in its own test binary: it mutates process environment.
///
/// Run with: cargo test --test config_env_integration

use bloomrisk_service::config::{CONFIG_ENV_VAR, PipelineConfig};
use std::env;

#[test]
fn test_from_env_follows_config_variable() {
    dotenv::dotenv().ok();

    let dir = env::temp_dir().join(format!("bloomrisk_env_{}", std::process::id()));
    std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
    let path = dir.join("cycle.toml");
    let sample =
        std::fs::read_to_string("./bloomrisk.toml").expect("sample config ships with the crate");
    let text = sample.replace("windermere-2026-cycle-1", "env-selected-cycle");
    std::fs::write(&path, text).unwrap();

    // SAFETY: the only test in this binary, so no other thread reads the environment.
    unsafe { env::set_var(CONFIG_ENV_VAR, &path) };
    let config = PipelineConfig::from_env().expect("config named by the variable should load");
    assert_eq!(config.cycle.id, "env-selected-cycle");
    assert_eq!(config.site.ids, vec!["NW-88010013", "NW-88010014"]);

    let missing = dir.join("absent.toml");
    unsafe { env::set_var(CONFIG_ENV_VAR, &missing) };
    let err = PipelineConfig::from_env().expect_err("absent file should fail");
    assert!(err.to_string().contains("absent.toml"));

    unsafe { env::remove_var(CONFIG_ENV_VAR) };
    let _ = std::fs::remove_dir_all(&dir);
}
