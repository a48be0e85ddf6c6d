//! Environment overrides for RunnerConfig. These mutate process environment,
//! so they run serially.

use apprun_core::RunnerConfig;
use apprun_core::config::{ConfigError, ENV_MODULE_PATH, ENV_SCRIPT_TIMEOUT_SECS, ENV_STOP_DELAY_MS};
use serial_test::serial;
use std::path::PathBuf;
use std::time::Duration;

fn clear_env() {
    unsafe {
        std::env::remove_var(ENV_SCRIPT_TIMEOUT_SECS);
        std::env::remove_var(ENV_STOP_DELAY_MS);
        std::env::remove_var(ENV_MODULE_PATH);
    }
}

#[test]
#[serial]
fn test_env_overrides_defaults() {
    clear_env();
    let paths = std::env::join_paths(["/opt/lib/a", "/opt/lib/b"]).unwrap();
    unsafe {
        std::env::set_var(ENV_SCRIPT_TIMEOUT_SECS, "0");
        std::env::set_var(ENV_STOP_DELAY_MS, "250");
        std::env::set_var(ENV_MODULE_PATH, &paths);
    }

    let config = RunnerConfig::from_env().unwrap();
    clear_env();

    assert_eq!(config.script_timeout(), None);
    assert_eq!(config.stop_delay(), Duration::from_millis(250));
    assert_eq!(
        config.module_search_path,
        vec![PathBuf::from("/opt/lib/a"), PathBuf::from("/opt/lib/b")]
    );
}

#[test]
#[serial]
fn test_invalid_env_value_is_reported() {
    clear_env();
    unsafe {
        std::env::set_var(ENV_STOP_DELAY_MS, "soon");
    }
    let result = RunnerConfig::from_env();
    clear_env();

    match result {
        Err(ConfigError::InvalidEnv { var, value }) => {
            assert_eq!(var, ENV_STOP_DELAY_MS);
            assert_eq!(value, "soon");
        }
        other => panic!("expected InvalidEnv, got {other:?}"),
    }
}

#[test]
#[serial]
fn test_file_then_env() {
    clear_env();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("apprun.toml");
    std::fs::write(&path, "script_timeout_secs = 5\nmain_queue_capacity = 8\n").unwrap();

    let mut config = RunnerConfig::load_from_file(&path).unwrap();
    unsafe {
        std::env::set_var(ENV_SCRIPT_TIMEOUT_SECS, "7");
    }
    config.apply_env_overrides().unwrap();
    clear_env();

    assert_eq!(config.script_timeout(), Some(Duration::from_secs(7)));
    assert_eq!(config.main_queue_capacity, 8);
    assert!(matches!(
        RunnerConfig::load_from_file(&dir.path().join("missing.toml")),
        Err(ConfigError::Io { .. })
    ));
}
