//! Layering of config file, environment and flags.

use clvec_cli::config::{CliConfig, ConfigBuilder};
use clvec_common::ClvecError;
use clvec_common::config::{ENV_PROFILING, ENV_SEED, ENV_VECTOR_LENGTH};
use serial_test::serial;

// ── Test helpers ─────────────────────────────────────────────────────────────

fn write_config(text: &str) -> (tempfile::TempDir, std::path::PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("clvec.toml");
    std::fs::write(&path, text).unwrap();
    (dir, path)
}

fn clear_env() {
    for key in [ENV_VECTOR_LENGTH, ENV_SEED, ENV_PROFILING] {
        std::env::remove_var(key);
    }
}

// ── File ─────────────────────────────────────────────────────────────────────

#[test]
fn partial_file_keeps_other_defaults() {
    let (_dir, path) = write_config("[dispatch]\nvector_length = 1024\n");
    let config = ConfigBuilder::from_file(&path).unwrap().build().unwrap();
    assert_eq!(config.dispatch.vector_length, 1024);
    assert_eq!(config.dispatch.seed, 42);
    assert_eq!(config.logging, CliConfig::default().logging);
}

#[test]
fn explicit_missing_file_is_a_config_error() {
    let err = ConfigBuilder::discover(Some(std::path::Path::new("/nonexistent/clvec.toml")))
        .unwrap_err();
    assert!(matches!(err, ClvecError::Config(_)));
}

#[test]
fn invalid_values_in_file_fail_validation() {
    let (_dir, path) = write_config("[logging]\nformat = \"yaml\"\n");
    assert!(ConfigBuilder::from_file(&path).unwrap().build().is_err());
}

// ── Environment and flags ────────────────────────────────────────────────────

#[test]
#[serial]
fn env_overrides_file_and_flags_override_env() {
    clear_env();
    let (_dir, path) = write_config("[dispatch]\nvector_length = 1024\nseed = 1\n");
    std::env::set_var(ENV_VECTOR_LENGTH, "2048");
    std::env::set_var(ENV_SEED, "5");
    std::env::set_var(ENV_PROFILING, "false");

    let config = ConfigBuilder::from_file(&path)
        .unwrap()
        .with_env()
        .unwrap()
        .seed(Some(9))
        .build()
        .unwrap();
    clear_env();

    assert_eq!(config.dispatch.vector_length, 2048);
    assert_eq!(config.dispatch.seed, 9);
    assert!(!config.dispatch.profiling);
}

#[test]
#[serial]
fn malformed_env_value_is_a_config_error() {
    clear_env();
    std::env::set_var(ENV_SEED, "not-a-number");
    let result = ConfigBuilder::new().with_env();
    clear_env();
    assert!(matches!(result, Err(ClvecError::Config(_))));
}
