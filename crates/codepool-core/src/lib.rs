// SPDX-FileCopyrightText: 2026 Codepool Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Codepool bucket code service.
//!
//! This crate provides the error type, the domain records of the bucket
//! ingestion pipeline, and the adapter traits for its external
//! collaborators (blob store and notification gateway).

pub mod error;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::CodepoolError;
pub use types::{
    AdapterType, BucketCode, BucketLoad, BucketSummary, Discount, DiscountCodeType,
    DiscountState, HealthStatus, LoadStatus, NotificationRecord, csv_blob_name,
    remaining_percent,
};

pub use traits::{
    BlobStoreAdapter, CsvRecords, NotificationPayload, NotifierAdapter, PluginAdapter,
};
