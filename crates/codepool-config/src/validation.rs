// SPDX-FileCopyrightText: 2026 Codepool Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Checks constraints serde cannot express: non-empty paths, positive pool
//! sizes, ordered thresholds, and SMTP settings when email alerts are on.

use crate::diagnostic::ConfigError;
use crate::model::{CodepoolConfig, NotificationKind};

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Validate a deserialized configuration for semantic correctness.
///
/// Collects every problem instead of stopping at the first one.
pub fn validate_config(config: &CodepoolConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if !LOG_LEVELS.contains(&config.service.log_level.as_str()) {
        errors.push(ConfigError::invalid(
            "service.log_level",
            format!(
                "must be one of {}, got `{}`",
                LOG_LEVELS.join(", "),
                config.service.log_level
            ),
        ));
    }

    if config.storage.database_path.trim().is_empty() {
        errors.push(ConfigError::invalid(
            "storage.database_path",
            "must not be empty",
        ));
    }
    if config.blob.root_dir.trim().is_empty() {
        errors.push(ConfigError::invalid("blob.root_dir", "must not be empty"));
    }
    if config.blob.max_upload_bytes == 0 {
        errors.push(ConfigError::invalid(
            "blob.max_upload_bytes",
            "must be greater than 0",
        ));
    }

    validate_ingest(config, &mut errors);
    validate_monitor(config, &mut errors);
    validate_notification(config, &mut errors);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_ingest(config: &CodepoolConfig, errors: &mut Vec<ConfigError>) {
    let ingest = &config.ingest;
    if ingest.min_csv_rows < 1 {
        errors.push(ConfigError::invalid(
            "ingest.min_csv_rows",
            "must be at least 1",
        ));
    }
    if !(1..=1000).contains(&ingest.insert_batch_size) {
        errors.push(ConfigError::invalid(
            "ingest.insert_batch_size",
            format!("must be between 1 and 1000, got {}", ingest.insert_batch_size),
        ));
    }
    if ingest.max_concurrent_loads < 1 {
        errors.push(ConfigError::invalid(
            "ingest.max_concurrent_loads",
            "must be at least 1",
        ));
    }
    if ingest.retry_max_attempts < 1 {
        errors.push(ConfigError::invalid(
            "ingest.retry_max_attempts",
            "must be at least 1",
        ));
    }
    if ingest.retry_initial_backoff_ms > ingest.retry_max_backoff_ms {
        errors.push(ConfigError::invalid(
            "ingest.retry_initial_backoff_ms",
            format!(
                "({}) must not exceed ingest.retry_max_backoff_ms ({})",
                ingest.retry_initial_backoff_ms, ingest.retry_max_backoff_ms
            ),
        ));
    }
    if ingest.stale_load_timeout_secs == 0 {
        errors.push(ConfigError::invalid(
            "ingest.stale_load_timeout_secs",
            "must be greater than 0",
        ));
    }
    if ingest.sweep_interval_secs == 0 {
        errors.push(ConfigError::invalid(
            "ingest.sweep_interval_secs",
            "must be greater than 0",
        ));
    }
}

fn validate_monitor(config: &CodepoolConfig, errors: &mut Vec<ConfigError>) {
    let thresholds = &config.monitor.thresholds;
    if thresholds.is_empty() {
        errors.push(ConfigError::invalid(
            "monitor.thresholds",
            "must contain at least one percentage",
        ));
    }
    for t in thresholds {
        if !(1..=100).contains(t) {
            errors.push(ConfigError::invalid(
                "monitor.thresholds",
                format!("values must be between 1 and 100, got {t}"),
            ));
        }
    }
    if thresholds.windows(2).any(|w| w[0] <= w[1]) {
        errors.push(ConfigError::invalid(
            "monitor.thresholds",
            format!("must be strictly descending, got {thresholds:?}"),
        ));
    }
    if config.monitor.interval_secs == 0 {
        errors.push(ConfigError::invalid(
            "monitor.interval_secs",
            "must be greater than 0",
        ));
    }
}

fn validate_notification(config: &CodepoolConfig, errors: &mut Vec<ConfigError>) {
    let n = &config.notification;
    if n.kind != NotificationKind::Smtp {
        return;
    }
    let required = [
        ("notification.smtp_host", &n.smtp_host),
        ("notification.from_address", &n.from_address),
        ("notification.to_address", &n.to_address),
    ];
    for (key, value) in required {
        if value.as_deref().is_none_or(|v| v.trim().is_empty()) {
            errors.push(ConfigError::invalid(key, "is required when kind = \"smtp\""));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(errors: &[ConfigError]) -> Vec<String> {
        errors
            .iter()
            .filter_map(|e| match e {
                ConfigError::Validation { key, .. } => Some(key.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn default_config_validates() {
        assert!(validate_config(&CodepoolConfig::default()).is_ok());
    }

    #[test]
    fn empty_database_path_fails_validation() {
        let mut config = CodepoolConfig::default();
        config.storage.database_path = "  ".to_string();
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(keys(&errors), vec!["storage.database_path"]);
    }

    #[test]
    fn thresholds_must_descend() {
        let mut config = CodepoolConfig::default();
        config.monitor.thresholds = vec![10, 25, 50];
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(keys(&errors), vec!["monitor.thresholds"]);

        config.monitor.thresholds = vec![50, 50];
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn thresholds_out_of_range() {
        let mut config = CodepoolConfig::default();
        config.monitor.thresholds = vec![150, 0];
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn batch_size_bounds() {
        let mut config = CodepoolConfig::default();
        config.ingest.insert_batch_size = 0;
        assert!(validate_config(&config).is_err());
        config.ingest.insert_batch_size = 1001;
        assert!(validate_config(&config).is_err());
        config.ingest.insert_batch_size = 1000;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn backoff_order_is_checked() {
        let mut config = CodepoolConfig::default();
        config.ingest.retry_initial_backoff_ms = 20_000;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(keys(&errors), vec!["ingest.retry_initial_backoff_ms"]);
    }

    #[test]
    fn smtp_requires_addresses() {
        let mut config = CodepoolConfig::default();
        config.notification.kind = NotificationKind::Smtp;
        config.notification.smtp_host = Some("mail.example.com".into());
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            keys(&errors),
            vec!["notification.from_address", "notification.to_address"]
        );
    }

    #[test]
    fn smtp_config_from_toml_validates() {
        let toml_str = r#"
[notification]
kind = "smtp"
smtp_host = "mail.example.com"
from_address = "codepool@example.com"
to_address = "ops@example.com"
"#;
        let config: CodepoolConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.notification.kind, NotificationKind::Smtp);
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn ascending_thresholds_from_toml_fail() {
        let toml_str = r#"
[monitor]
thresholds = [10, 25, 50]
"#;
        let config: CodepoolConfig = toml::from_str(toml_str).unwrap();
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(keys(&errors), vec!["monitor.thresholds"]);
    }

    #[test]
    fn collects_all_errors() {
        let mut config = CodepoolConfig::default();
        config.service.log_level = "loud".into();
        config.ingest.min_csv_rows = 0;
        config.ingest.max_concurrent_loads = 0;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 3);
    }
}
