// SPDX-FileCopyrightText: 2026 Codepool Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./codepool.toml` > `~/.config/codepool/codepool.toml` >
//! `/etc/codepool/codepool.toml` with environment variable overrides via `CODEPOOL_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::CodepoolConfig;

/// Top-level sections that environment variables may address.
const SECTIONS: &[&str] = &[
    "service",
    "storage",
    "blob",
    "ingest",
    "monitor",
    "notification",
];

pub(crate) const SYSTEM_CONFIG_PATH: &str = "/etc/codepool/codepool.toml";
pub(crate) const LOCAL_CONFIG_PATH: &str = "codepool.toml";

pub(crate) fn user_config_path() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("codepool/codepool.toml"))
        .unwrap_or_default()
}

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/codepool/codepool.toml` (system-wide)
/// 3. `~/.config/codepool/codepool.toml` (user XDG config)
/// 4. `./codepool.toml` (local directory)
/// 5. `CODEPOOL_*` environment variables
pub fn load_config() -> Result<CodepoolConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no XDG lookup, no env).
pub fn load_config_from_str(toml_content: &str) -> Result<CodepoolConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(CodepoolConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<CodepoolConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(CodepoolConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Build the layered Figment before extraction.
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(CodepoolConfig::default()))
        .merge(Toml::file(SYSTEM_CONFIG_PATH))
        .merge(Toml::file(user_config_path()))
        .merge(Toml::file(LOCAL_CONFIG_PATH))
        .merge(env_provider())
}

/// Environment provider with explicit section mapping.
///
/// Splitting on `_` would break keys such as `max_concurrent_loads`, so only
/// the leading section name is turned into a dot:
/// `CODEPOOL_INGEST_MAX_CONCURRENT_LOADS` -> `ingest.max_concurrent_loads`.
fn env_provider() -> Env {
    Env::prefixed("CODEPOOL_").map(|key| map_env_key(key.as_str()).into())
}

pub(crate) fn map_env_key(key: &str) -> String {
    for section in SECTIONS {
        if let Some(rest) = key
            .strip_prefix(section)
            .and_then(|rest| rest.strip_prefix('_'))
        {
            return format!("{section}.{rest}");
        }
    }
    key.to_string()
}
