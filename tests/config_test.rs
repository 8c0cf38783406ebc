//! Integration tests for configuration loading and validation.

use std::io::Write;

use assert_matches::assert_matches;
use tempfile::NamedTempFile;
use vodcheck::config::{load_config, load_config_or_default, validate_config, Config};

fn write_config(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn empty_file_uses_defaults() {
    let file = write_config("");
    let config = load_config(file.path()).unwrap();

    assert_eq!(config.fetch.timeout_secs, 60);
    assert_eq!(config.fetch.max_body_bytes, 20 * 1024 * 1024);
    assert_eq!(config.fetch.retries, 0);
    assert_eq!(config.fetch.header_prefix_bytes, 65536);
    assert!(config.fetch.user_agent.starts_with("vodcheck/"));
    assert!(!config.fetch.g2o.is_enabled());
    assert_eq!(config.validation.threshold_ticks, 1000);
    assert_eq!(config.validation.keyframe_tolerance_ticks, 2000);
    assert!(config.validation.check_keyframes);
    assert!(config.validation.check_continuity);
    assert_eq!(config.run.concurrency, 8);
    assert_eq!(config.run.max_fragments_per_list, 0);
}

#[test]
fn partial_sections_keep_other_defaults() {
    let file = write_config(
        r#"
[fetch]
retries = 2

[fetch.headers]
Authorization = "Bearer abc"

[fetch.g2o]
key = "secret"
nonce = "n1"

[run]
max_fragments_per_list = 5
"#,
    );
    let config = load_config(file.path()).unwrap();

    assert_eq!(config.fetch.retries, 2);
    assert_eq!(config.fetch.timeout_secs, 60);
    assert_eq!(
        config.fetch.headers.get("Authorization").map(String::as_str),
        Some("Bearer abc")
    );
    assert!(config.fetch.g2o.is_enabled());
    assert_eq!(config.fetch.g2o.nonce, "n1");
    assert_eq!(config.fetch.g2o.version, 5);
    assert_eq!(config.fetch.g2o.data_header, "X-Akamai-G2O-Auth-Data");
    assert_eq!(config.run.max_fragments_per_list, 5);
    assert_eq!(config.run.concurrency, 8);
}

#[test]
fn zero_concurrency_rejected() {
    let file = write_config("[run]\nconcurrency = 0\n");
    let err = load_config(file.path()).unwrap_err();
    assert!(err.to_string().contains("concurrency"));
}

#[test]
fn validation_rejects_nonsense() {
    let mut config = Config::default();
    config.fetch.timeout_secs = 0;
    assert_matches!(validate_config(&config), Err(e) if e.to_string().contains("timeout"));

    let mut config = Config::default();
    config.fetch.max_body_bytes = 0;
    assert_matches!(validate_config(&config), Err(_));

    let mut config = Config::default();
    config.validation.threshold_ticks = -1;
    assert_matches!(validate_config(&config), Err(_));

    let mut config = Config::default();
    config
        .fetch
        .headers
        .insert("bad header".to_string(), "x".to_string());
    assert_matches!(validate_config(&config), Err(e) if e.to_string().contains("bad header"));

    let mut config = Config::default();
    config.fetch.g2o.key = "secret".to_string();
    config.fetch.g2o.data_header.clear();
    assert_matches!(validate_config(&config), Err(_));

    assert_matches!(validate_config(&Config::default()), Ok(()));
}

#[test]
fn malformed_toml_reports_path() {
    let file = write_config("[run\nconcurrency = ");
    let err = load_config(file.path()).unwrap_err();
    assert!(format!("{:#}", err).contains("Failed to parse config file"));
}

#[test]
fn explicit_missing_path_is_error() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nope.toml");
    assert!(load_config_or_default(Some(&missing)).is_err());
}
