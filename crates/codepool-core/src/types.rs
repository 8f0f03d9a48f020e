// SPDX-FileCopyrightText: 2026 Codepool Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain types shared across the storage, ingestion and monitor crates.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Identifies the kind of external collaborator behind an adapter.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    Storage,
    BlobStore,
    Notifier,
}

/// Lifecycle status of a bucket load.
///
/// Persisted and surfaced externally as `PENDING | RUNNING | FINISHED | FAILED`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoadStatus {
    Pending,
    Running,
    Finished,
    Failed,
}

impl LoadStatus {
    /// PENDING and RUNNING loads block new uploads and discount edits.
    pub fn is_outstanding(self) -> bool {
        matches!(self, Self::Pending | Self::Running)
    }

    /// FINISHED and FAILED are never left.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Finished | Self::Failed)
    }

    /// Whether the state machine allows moving from `self` to `next`.
    pub fn can_transition_to(self, next: LoadStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Running)
                | (Self::Pending, Self::Failed)
                | (Self::Running, Self::Finished)
                | (Self::Running, Self::Failed)
        )
    }
}

/// One ingestion attempt of a CSV of codes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketLoad {
    pub id: i64,
    pub discount_id: i64,
    /// Opaque identifier matching the blob name (`<uid>.csv`).
    pub uid: String,
    /// Original upload name, display only.
    pub file_name: Option<String>,
    pub status: LoadStatus,
    /// Null until the load finishes.
    pub number_of_codes: Option<i64>,
    pub created_at: String,
    pub updated_at: String,
}

impl BucketLoad {
    /// Name of the backing CSV blob.
    pub fn blob_name(&self) -> String {
        csv_blob_name(&self.uid)
    }
}

/// CSV blobs are keyed `<uid>.csv`.
pub fn csv_blob_name(uid: &str) -> String {
    format!("{uid}.csv")
}

/// A single ingested code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketCode {
    pub id: i64,
    /// Opaque code value; duplicates within a discount are allowed.
    pub code: String,
    pub discount_id: i64,
    /// The load that produced this code.
    pub load_id: i64,
    pub is_used: bool,
    pub used_at: Option<String>,
}

/// Materialized per-discount code counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketSummary {
    pub id: i64,
    pub discount_id: i64,
    pub available_codes: i64,
    pub used_codes: i64,
    pub updated_at: String,
}

impl BucketSummary {
    /// Live pool size: codes still available plus codes already consumed.
    pub fn total_codes(&self) -> i64 {
        self.available_codes.max(0) + self.used_codes.max(0)
    }

    /// `floor(100 * available / total)`, or 100 when no codes were ever loaded.
    pub fn remaining_percent(&self) -> u8 {
        remaining_percent(self.available_codes, self.used_codes)
    }
}

/// Percentage of the live pool still available, rounded down.
pub fn remaining_percent(available: i64, used: i64) -> u8 {
    let available = available.max(0) as u128;
    let total = available + used.max(0) as u128;
    if total == 0 {
        return 100;
    }
    (available * 100 / total) as u8
}

/// Idempotency ledger entry for a sent notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub key: String,
    pub sent_at: String,
}

impl NotificationRecord {
    /// Ledger key for a threshold crossing on a discount.
    pub fn key_for(discount_id: i64, threshold: u8) -> String {
        format!("bucket-expiring:{discount_id}:{threshold}")
    }

    /// Prefix shared by every ledger key of one discount.
    pub fn key_prefix(discount_id: i64) -> String {
        format!("bucket-expiring:{discount_id}:")
    }
}

/// How a discount's codes reach the consumer.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiscountCodeType {
    Static,
    LandingPage,
    Api,
    Bucket,
}

/// Publication state of a discount.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiscountState {
    Draft,
    Published,
    Suspended,
}

/// A fully materialized discount record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Discount {
    pub id: i64,
    pub agreement_id: String,
    pub name: String,
    pub code_type: DiscountCodeType,
    pub state: DiscountState,
    /// UID of the most recent CSV upload.
    pub last_bucket_code_file_uid: Option<String>,
    /// The discount's current load pointer.
    pub last_bucket_code_load_id: Option<i64>,
    pub created_at: String,
    pub updated_at: String,
}
