// SPDX-FileCopyrightText: 2026 Codepool Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Codepool bucket code service.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use serde::{Deserialize, Serialize};

/// Top-level Codepool configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CodepoolConfig {
    /// Service identity and logging.
    #[serde(default)]
    pub service: ServiceConfig,

    /// SQLite storage settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Blob store holding uploaded CSV files.
    #[serde(default)]
    pub blob: BlobConfig,

    /// Ingestion worker and upload policy.
    #[serde(default)]
    pub ingest: IngestConfig,

    /// Expiration monitor thresholds and schedule.
    #[serde(default)]
    pub monitor: MonitorConfig,

    /// Notification gateway selection.
    #[serde(default)]
    pub notification: NotificationConfig,
}

/// Service identity configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceConfig {
    /// Display name used in logs and notification senders.
    #[serde(default = "default_service_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
        }
    }
}

fn default_service_name() -> String {
    "codepool".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("codepool").join("codepool.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("codepool.db"))
        .to_string_lossy()
        .into_owned()
}

fn default_wal_mode() -> bool {
    true
}

/// Filesystem blob store configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BlobConfig {
    /// Directory holding `<uid>.csv` blobs.
    #[serde(default = "default_blob_root")]
    pub root_dir: String,

    /// Largest accepted upload, in bytes.
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: u64,
}

impl Default for BlobConfig {
    fn default() -> Self {
        Self {
            root_dir: default_blob_root(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

fn default_blob_root() -> String {
    dirs::data_dir()
        .map(|p| p.join("codepool").join("blobs"))
        .unwrap_or_else(|| std::path::PathBuf::from("blobs"))
        .to_string_lossy()
        .into_owned()
}

fn default_max_upload_bytes() -> u64 {
    10 * 1024 * 1024
}

/// Ingestion worker and upload acceptance configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct IngestConfig {
    /// Minimum number of code rows an upload must contain.
    #[serde(default = "default_min_csv_rows")]
    pub min_csv_rows: usize,

    /// Rows per multi-row INSERT statement.
    #[serde(default = "default_insert_batch_size")]
    pub insert_batch_size: usize,

    /// Loads ingested concurrently by the worker pool.
    #[serde(default = "default_max_concurrent_loads")]
    pub max_concurrent_loads: usize,

    /// Attempts per load before it is marked FAILED (1 disables retries).
    #[serde(default = "default_retry_max_attempts")]
    pub retry_max_attempts: u32,

    #[serde(default = "default_retry_initial_backoff_ms")]
    pub retry_initial_backoff_ms: u64,

    #[serde(default = "default_retry_max_backoff_ms")]
    pub retry_max_backoff_ms: u64,

    /// RUNNING loads untouched for this long are considered abandoned.
    #[serde(default = "default_stale_load_timeout_secs")]
    pub stale_load_timeout_secs: u64,

    /// Period of the pending-load and stale-load sweeps in `serve`.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            min_csv_rows: default_min_csv_rows(),
            insert_batch_size: default_insert_batch_size(),
            max_concurrent_loads: default_max_concurrent_loads(),
            retry_max_attempts: default_retry_max_attempts(),
            retry_initial_backoff_ms: default_retry_initial_backoff_ms(),
            retry_max_backoff_ms: default_retry_max_backoff_ms(),
            stale_load_timeout_secs: default_stale_load_timeout_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

fn default_min_csv_rows() -> usize {
    10
}

fn default_insert_batch_size() -> usize {
    300
}

fn default_max_concurrent_loads() -> usize {
    4
}

fn default_retry_max_attempts() -> u32 {
    3
}

fn default_retry_initial_backoff_ms() -> u64 {
    500
}

fn default_retry_max_backoff_ms() -> u64 {
    10_000
}

fn default_stale_load_timeout_secs() -> u64 {
    3600
}

fn default_sweep_interval_secs() -> u64 {
    60
}

/// Expiration monitor configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MonitorConfig {
    /// Evaluate thresholds after loads, redemptions and on the schedule.
    #[serde(default = "default_monitor_enabled")]
    pub enabled: bool,

    /// Remaining-percentage watch points, strictly descending.
    #[serde(default = "default_thresholds")]
    pub thresholds: Vec<u8>,

    /// Period of the scheduled evaluation over all bucket discounts.
    #[serde(default = "default_monitor_interval_secs")]
    pub interval_secs: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            enabled: default_monitor_enabled(),
            thresholds: default_thresholds(),
            interval_secs: default_monitor_interval_secs(),
        }
    }
}

fn default_monitor_enabled() -> bool {
    true
}

fn default_thresholds() -> Vec<u8> {
    vec![50, 25, 10]
}

fn default_monitor_interval_secs() -> u64 {
    300
}

/// Which notification gateway delivers threshold alerts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    /// Structured log events only.
    #[default]
    Log,
    /// Plain-text email over SMTP.
    Smtp,
}

/// Notification gateway configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct NotificationConfig {
    #[serde(default)]
    pub kind: NotificationKind,

    #[serde(default)]
    pub smtp_host: Option<String>,

    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,

    #[serde(default)]
    pub smtp_username: Option<String>,

    #[serde(default)]
    pub smtp_password: Option<String>,

    /// Sender address for alert emails.
    #[serde(default)]
    pub from_address: Option<String>,

    /// Operator mailbox receiving alerts.
    #[serde(default)]
    pub to_address: Option<String>,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            kind: NotificationKind::default(),
            smtp_host: None,
            smtp_port: default_smtp_port(),
            smtp_username: None,
            smtp_password: None,
            from_address: None,
            to_address: None,
        }
    }
}

fn default_smtp_port() -> u16 {
    587
}
