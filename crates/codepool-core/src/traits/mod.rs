// SPDX-FileCopyrightText: 2026 Codepool Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adapter trait definitions for the external collaborators of the pipeline.
//!
//! All adapters extend the [`PluginAdapter`] base trait and use
//! `#[async_trait]` for dynamic dispatch compatibility.

pub mod adapter;
pub mod blob;
pub mod notifier;

pub use adapter::PluginAdapter;
pub use blob::{BlobStoreAdapter, CsvRecords};
pub use notifier::{NotificationPayload, NotifierAdapter};
