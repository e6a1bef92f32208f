//! Configuration resolution tests
//!
//! Uses serial_test to prevent ENV variable race conditions: every test
//! touching `MEP_*` variables is marked `#[serial]`.

use mep_common::config::{
    load_toml_config, CliOverrides, CompiledDefaults, PipelineConfig, TomlConfig, ENV_LOG_LEVEL, ENV_PORT,
    ENV_ROOT_FOLDER, ENV_WINDOW_SECS,
};
use mep_common::Error;
use serial_test::serial;
use std::env;
use std::path::PathBuf;

fn clear_env() {
    for name in [
        ENV_ROOT_FOLDER,
        ENV_PORT,
        ENV_WINDOW_SECS,
        ENV_LOG_LEVEL,
        "MEP_BIND",
        "MEP_ENRICHMENT_ENABLED",
        "MEP_RULES_FILE",
        "MEP_EVENT_BUS_CAPACITY",
    ] {
        env::remove_var(name);
    }
}

fn toml_config() -> TomlConfig {
    TomlConfig::from_toml_str(
        r#"
        root_folder = "/from/toml"
        port = 7000
        window_secs = 120

        [logging]
        level = "warn"
        "#,
    )
    .unwrap()
}

#[test]
#[serial]
fn test_no_overrides_uses_compiled_defaults() {
    clear_env();
    let config = PipelineConfig::resolve(&CliOverrides::default(), None).unwrap();
    let defaults = CompiledDefaults::for_current_platform();
    assert_eq!(config.root_folder, defaults.root_folder);
    assert_eq!(config.port, defaults.port);
    assert_eq!(config.window_secs, 60);
    assert!(config.enrichment_enabled);
    assert_eq!(config.log_level, "info");
}

#[test]
#[serial]
fn test_toml_overrides_defaults() {
    clear_env();
    let config = PipelineConfig::resolve(&CliOverrides::default(), Some(&toml_config())).unwrap();
    assert_eq!(config.root_folder, PathBuf::from("/from/toml"));
    assert_eq!(config.port, 7000);
    assert_eq!(config.window_secs, 120);
    assert_eq!(config.log_level, "warn");
}

#[test]
#[serial]
fn test_env_overrides_toml() {
    clear_env();
    env::set_var(ENV_ROOT_FOLDER, "/from/env");
    env::set_var(ENV_PORT, "7100");

    let config = PipelineConfig::resolve(&CliOverrides::default(), Some(&toml_config())).unwrap();
    assert_eq!(config.root_folder, PathBuf::from("/from/env"));
    assert_eq!(config.port, 7100);
    // untouched keys still come from TOML
    assert_eq!(config.window_secs, 120);

    clear_env();
}

#[test]
#[serial]
fn test_cli_overrides_env() {
    clear_env();
    env::set_var(ENV_ROOT_FOLDER, "/from/env");
    env::set_var(ENV_LOG_LEVEL, "debug");

    let cli = CliOverrides {
        root_folder: Some(PathBuf::from("/from/cli")),
        log_level: Some("TRACE".to_string()),
        ..Default::default()
    };
    let config = PipelineConfig::resolve(&cli, Some(&toml_config())).unwrap();
    assert_eq!(config.root_folder, PathBuf::from("/from/cli"));
    assert_eq!(config.log_level, "trace");

    clear_env();
}

#[test]
#[serial]
fn test_invalid_env_value_is_config_error() {
    clear_env();
    env::set_var(ENV_PORT, "eighty");
    let err = PipelineConfig::resolve(&CliOverrides::default(), None).unwrap_err();
    assert!(matches!(err, Error::Config(ref msg) if msg.contains(ENV_PORT)));
    clear_env();
}

#[test]
#[serial]
fn test_out_of_range_window_rejected() {
    clear_env();
    env::set_var(ENV_WINDOW_SECS, "0");
    assert!(PipelineConfig::resolve(&CliOverrides::default(), None).is_err());
    clear_env();
}

#[test]
fn test_explicit_config_file() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "port = 6001\nenrichment_enabled = false\n").unwrap();

    let config = load_toml_config(Some(&path)).unwrap().unwrap();
    assert_eq!(config.port, Some(6001));
    assert_eq!(config.enrichment_enabled, Some(false));
}

#[test]
fn test_explicit_missing_config_file_is_error() {
    let dir = tempfile::TempDir::new().unwrap();
    let missing = dir.path().join("absent.toml");
    assert!(load_toml_config(Some(&missing)).is_err());
}

#[test]
fn test_rules_file_loaded_from_config() {
    let dir = tempfile::TempDir::new().unwrap();
    let rules = dir.path().join("rules.toml");
    std::fs::write(
        &rules,
        r#"
        [[artists]]
        name = "Daft Punk"
        artist_keywords = ["daft punk"]
        mood = "Robotic"
        genres = ["electronic"]
        context = "Dancing"
        similar_tracks = ["One More Time"]

        [fallback]
        mood = "Versatile and engaging"
        context = "Casual listening during daily activities"
        similar_tracks = []
        genre_suffix = []
        unknown_genres = []
        "#,
    )
    .unwrap();

    let config = PipelineConfig {
        rules_file: Some(rules),
        ..Default::default()
    };
    let table = config.rule_table().unwrap();
    assert_eq!(table.artists.len(), 1);
    assert!(table.is_known_artist("Daft Punk"));
}
