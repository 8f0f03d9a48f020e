// SPDX-FileCopyrightText: 2026 Codepool Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for the Codepool configuration system.

use codepool_config::diagnostic::ConfigError;
use codepool_config::model::{CodepoolConfig, NotificationKind};
use codepool_config::{load_and_validate_path, load_and_validate_str, load_config_from_str};
use figment::{
    Figment,
    providers::{Format, Serialized, Toml},
};

/// Valid TOML with every section deserializes successfully.
#[test]
fn valid_toml_deserializes_into_codepool_config() {
    let toml = r#"
[service]
name = "codepool-test"
log_level = "debug"

[storage]
database_path = "/tmp/codepool.db"
wal_mode = false

[blob]
root_dir = "/tmp/blobs"
max_upload_bytes = 2048

[ingest]
min_csv_rows = 2
insert_batch_size = 50
max_concurrent_loads = 8
retry_max_attempts = 5
retry_initial_backoff_ms = 10
retry_max_backoff_ms = 100
stale_load_timeout_secs = 120
sweep_interval_secs = 5

[monitor]
enabled = false
thresholds = [75, 30]
interval_secs = 30

[notification]
kind = "smtp"
smtp_host = "mail.example.com"
smtp_port = 2525
from_address = "codepool@example.com"
to_address = "ops@example.com"
"#;

    let config = load_and_validate_str(toml).expect("valid TOML should load");
    assert_eq!(config.service.name, "codepool-test");
    assert_eq!(config.service.log_level, "debug");
    assert_eq!(config.storage.database_path, "/tmp/codepool.db");
    assert!(!config.storage.wal_mode);
    assert_eq!(config.blob.root_dir, "/tmp/blobs");
    assert_eq!(config.blob.max_upload_bytes, 2048);
    assert_eq!(config.ingest.min_csv_rows, 2);
    assert_eq!(config.ingest.insert_batch_size, 50);
    assert_eq!(config.ingest.max_concurrent_loads, 8);
    assert_eq!(config.ingest.retry_max_attempts, 5);
    assert_eq!(config.ingest.stale_load_timeout_secs, 120);
    assert!(!config.monitor.enabled);
    assert_eq!(config.monitor.thresholds, vec![75, 30]);
    assert_eq!(config.notification.kind, NotificationKind::Smtp);
    assert_eq!(config.notification.smtp_port, 2525);
    assert_eq!(
        config.notification.to_address.as_deref(),
        Some("ops@example.com")
    );
}

#[test]
fn missing_sections_use_defaults() {
    let config = load_config_from_str("[service]\nname = \"only\"\n").unwrap();
    assert_eq!(config.service.name, "only");
    assert_eq!(config.ingest.min_csv_rows, 10);
    assert_eq!(config.monitor.thresholds, vec![50, 25, 10]);
    assert_eq!(config.notification.kind, NotificationKind::Log);
}

/// Env overrides are merged through figment the same way the loader does.
#[test]
fn later_layers_override_earlier_ones() {
    let config: CodepoolConfig = Figment::new()
        .merge(Serialized::defaults(CodepoolConfig::default()))
        .merge(Toml::string("[ingest]\nmax_concurrent_loads = 2\n"))
        .merge(("ingest.max_concurrent_loads", 6))
        .extract()
        .expect("should merge override");
    assert_eq!(config.ingest.max_concurrent_loads, 6);
}

#[test]
fn unknown_key_gets_suggestion() {
    let errors = load_and_validate_str("[ingest]\nmin_csv_row = 3\n").unwrap_err();
    assert_eq!(errors.len(), 1);
    match &errors[0] {
        ConfigError::UnknownKey {
            key,
            suggestion,
            valid_keys,
            ..
        } => {
            assert_eq!(key, "min_csv_row");
            assert_eq!(suggestion.as_deref(), Some("min_csv_rows"));
            assert!(valid_keys.contains("insert_batch_size"));
        }
        other => panic!("expected UnknownKey, got {other:?}"),
    }
}

#[test]
fn unknown_top_level_section_is_rejected() {
    let errors = load_and_validate_str("[agent]\nname = \"x\"\n").unwrap_err();
    assert!(matches!(errors[0], ConfigError::UnknownKey { .. }));
}

#[test]
fn wrong_type_is_reported() {
    let errors = load_and_validate_str("[ingest]\nmin_csv_rows = \"ten\"\n").unwrap_err();
    match &errors[0] {
        ConfigError::InvalidType { key, .. } => assert_eq!(key, "ingest.min_csv_rows"),
        other => panic!("expected InvalidType, got {other:?}"),
    }
}

#[test]
fn unknown_notification_kind_is_rejected() {
    assert!(load_and_validate_str("[notification]\nkind = \"pager\"\n").is_err());
}

#[test]
fn semantic_errors_surface_after_parse() {
    let errors = load_and_validate_str("[monitor]\nthresholds = [10, 50]\n").unwrap_err();
    assert!(matches!(errors[0], ConfigError::Validation { .. }));
    assert!(errors[0].to_string().contains("monitor.thresholds"));
}

#[test]
fn file_errors_name_the_bad_key() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("codepool.toml");
    std::fs::write(&path, "[monitor]\nenabled = true\ntreshold = [50]\n").unwrap();

    let errors = load_and_validate_path(&path).unwrap_err();
    match &errors[0] {
        ConfigError::UnknownKey {
            key,
            suggestion,
            span,
            src,
            ..
        } => {
            assert_eq!(key, "treshold");
            assert_eq!(suggestion.as_deref(), Some("thresholds"));
            assert_eq!(span.is_some(), src.is_some());
        }
        other => panic!("expected UnknownKey, got {other:?}"),
    }
}

#[test]
fn config_error_renders_with_miette() {
    use miette::{Diagnostic, GraphicalReportHandler};

    let error = ConfigError::UnknownKey {
        key: "treshold".into(),
        suggestion: Some("thresholds".into()),
        valid_keys: "enabled, thresholds, interval_secs".into(),
        span: None,
        src: None,
    };
    let mut out = String::new();
    GraphicalReportHandler::new()
        .render_report(&mut out, &error as &dyn Diagnostic)
        .unwrap();
    assert!(out.contains("treshold"));
    assert!(out.contains("did you mean `thresholds`?"));
}

/// `CODEPOOL_<SECTION>_<KEY>` overrides the file value, keeping underscores in the key.
#[test]
#[serial_test::serial]
fn env_var_overrides_file_value() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("codepool.toml");
    std::fs::write(&path, "[ingest]\nmax_concurrent_loads = 2\n").unwrap();

    // SAFETY: serialized test; no other thread reads the environment concurrently.
    unsafe { std::env::set_var("CODEPOOL_INGEST_MAX_CONCURRENT_LOADS", "7") };
    let loaded = load_and_validate_path(&path);
    unsafe { std::env::remove_var("CODEPOOL_INGEST_MAX_CONCURRENT_LOADS") };

    let config = loaded.unwrap();
    assert_eq!(config.ingest.max_concurrent_loads, 7);
}

/// Without the variable, the file value wins.
#[test]
#[serial_test::serial]
fn file_value_applies_without_env_override() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("codepool.toml");
    std::fs::write(&path, "[ingest]\nmax_concurrent_loads = 2\n").unwrap();

    let config = load_and_validate_path(&path).unwrap();
    assert_eq!(config.ingest.max_concurrent_loads, 2);
}
