// SPDX-FileCopyrightText: 2026 Codepool Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence layer for the Codepool bucket code service.
//!
//! Provides WAL-mode SQLite storage with embedded migrations, a single-writer
//! concurrency model via `tokio-rusqlite`, and typed operations for
//! discounts, bucket loads, codes, summaries and the notification ledger.
//!
//! All writes are serialized through `tokio-rusqlite`'s single background
//! thread. Query modules accept `&Database` and call through
//! `Database::connection()`; do not open extra connections for writes.

pub mod database;
pub mod migrations;
pub mod queries;

pub use database::Database;
pub use queries::codes::BucketReset;
pub use queries::discounts::NewDiscount;
