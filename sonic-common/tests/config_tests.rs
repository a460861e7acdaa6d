//! Integration tests for configuration loading and graceful degradation
//!
//! - Missing TOML files fall back to defaults instead of failing startup
//! - Malformed TOML files are configuration errors
//! - Config file resolution priority (CLI, then environment)
//!
//! Tests that manipulate SONIC_CONFIG are marked #[serial] so they do not
//! race each other.

use serial_test::serial;
use sonic_common::config::{
    load_config, load_toml_config, resolve_config_path, write_toml_config, ExtensionRule,
    TomlConfig, CONFIG_ENV_VAR,
};
use sonic_common::Error;
use std::env;
use std::path::PathBuf;
use tempfile::TempDir;

#[test]
fn test_missing_file_yields_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("absent.toml");

    let config = load_toml_config(&path).unwrap();
    assert_eq!(config, TomlConfig::default());
}

#[test]
fn test_malformed_file_is_config_error() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("broken.toml");
    std::fs::write(&path, "[server\nport = ").unwrap();

    let result = load_toml_config(&path);
    assert!(matches!(result, Err(Error::Config(_))));
}

#[test]
fn test_invalid_values_are_rejected_on_load() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("invalid.toml");
    std::fs::write(&path, "[model]\nhop_size = 0\n").unwrap();

    assert!(matches!(load_toml_config(&path), Err(Error::Config(_))));
}

#[test]
fn test_write_then_load_preserves_settings() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("nested").join("config.toml");

    let mut config = TomlConfig::default();
    config.server.port = 6111;
    config.intake.extension_rule = ExtensionRule::Trailing;
    config.model.serialize_calls = true;
    config.logging.level = "debug".to_string();

    write_toml_config(&config, &path).unwrap();
    let loaded = load_toml_config(&path).unwrap();

    assert_eq!(loaded, config);
}

#[test]
#[serial]
fn test_cli_path_wins_over_environment() {
    env::set_var(CONFIG_ENV_VAR, "/tmp/sonicscribe-env.toml");
    let cli = PathBuf::from("/tmp/sonicscribe-cli.toml");

    let resolved = resolve_config_path(Some(&cli));
    env::remove_var(CONFIG_ENV_VAR);

    assert_eq!(resolved, Some(cli));
}

#[test]
#[serial]
fn test_environment_path_used_without_cli() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("env.toml");
    std::fs::write(&path, "[server]\nport = 7001\n").unwrap();

    env::set_var(CONFIG_ENV_VAR, &path);
    let resolved = resolve_config_path(None);
    let config = load_config(None);
    env::remove_var(CONFIG_ENV_VAR);

    assert_eq!(resolved, Some(path));
    assert_eq!(config.unwrap().server.port, 7001);
}
