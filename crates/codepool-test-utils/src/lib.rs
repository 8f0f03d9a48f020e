// SPDX-FileCopyrightText: 2026 Codepool Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Codepool integration tests.
//!
//! Provides in-memory adapters with failure injection and a harness wiring
//! them to a temp SQLite database, so pipeline tests run without a
//! filesystem blob store or an SMTP server.
//!
//! # Components
//!
//! - [`MemoryBlobStore`] - Blob store with missing-object and transient read failures
//! - [`RecordingNotifier`] - Notification gateway that captures sends and can fail on demand
//! - [`TestHarness`] - Database, adapters, monitor, service and worker in one place

pub mod harness;
pub mod memory_blob;
pub mod recording_notifier;

pub use harness::{TestHarness, codes, csv};
pub use memory_blob::MemoryBlobStore;
pub use recording_notifier::RecordingNotifier;
