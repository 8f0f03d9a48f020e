// SPDX-FileCopyrightText: 2026 Codepool Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bucket code ingestion for Codepool.
//!
//! A CSV upload becomes a PENDING bucket load ([`BucketService`]), the
//! [`IngestionWorker`] moves it to RUNNING and hands it to the
//! [`IngestionEngine`], which ends it FINISHED or FAILED. Transient blob
//! and database failures are retried under a [`RetryPolicy`].

pub mod engine;
pub mod retry;
pub mod service;
pub mod upload;
pub mod worker;

pub use engine::IngestionEngine;
pub use retry::RetryPolicy;
pub use service::BucketService;
pub use upload::UploadPolicy;
pub use worker::IngestionWorker;
