// SPDX-FileCopyrightText: 2026 Codepool Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end pipeline testing.
//!
//! `TestHarness` assembles the bucket pipeline with in-memory adapters and
//! a temp SQLite database: upload acceptance, the ingestion worker and the
//! expiration monitor all share one database.

use std::sync::Arc;

use bytes::Bytes;
use codepool_config::model::CodepoolConfig;
use codepool_core::{BucketLoad, CodepoolError, Discount, DiscountCodeType};
use codepool_ingest::{BucketService, IngestionEngine, IngestionWorker, RetryPolicy, UploadPolicy};
use codepool_monitor::ExpirationMonitor;
use codepool_storage::{Database, NewDiscount};

use crate::memory_blob::MemoryBlobStore;
use crate::recording_notifier::RecordingNotifier;

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    config: CodepoolConfig,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        let mut config = CodepoolConfig::default();
        config.ingest.min_csv_rows = 1;
        Self { config }
    }

    pub fn with_min_csv_rows(mut self, rows: usize) -> Self {
        self.config.ingest.min_csv_rows = rows;
        self
    }

    pub fn with_thresholds(mut self, thresholds: Vec<u8>) -> Self {
        self.config.monitor.thresholds = thresholds;
        self
    }

    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.config.ingest.insert_batch_size = size;
        self
    }

    pub fn with_max_concurrent_loads(mut self, loads: usize) -> Self {
        self.config.ingest.max_concurrent_loads = loads;
        self
    }

    /// Retry attempts for transient failures; backoff is always zero.
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.config.ingest.retry_max_attempts = attempts;
        self
    }

    /// Build the harness, creating the temp database and every component.
    pub async fn build(self) -> Result<TestHarness, CodepoolError> {
        let temp_dir = tempfile::TempDir::new().map_err(CodepoolError::storage)?;
        let db_path = temp_dir.path().join("test.db");
        let db = Database::open(&db_path.to_string_lossy()).await?;

        let blob = Arc::new(MemoryBlobStore::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let monitor = Arc::new(ExpirationMonitor::from_config(
            db.clone(),
            notifier.clone(),
            &self.config.monitor,
        ));

        let engine = Arc::new(IngestionEngine::new(
            db.clone(),
            blob.clone(),
            RetryPolicy::immediate(self.config.ingest.retry_max_attempts),
            self.config.ingest.insert_batch_size,
        ));
        let worker = IngestionWorker::new(
            db.clone(),
            engine,
            self.config.ingest.max_concurrent_loads,
        )
        .with_monitor(Arc::clone(&monitor));
        let service = BucketService::new(
            db.clone(),
            blob.clone(),
            UploadPolicy::from_config(&self.config.ingest, &self.config.blob),
        )
        .with_monitor(Arc::clone(&monitor));

        Ok(TestHarness {
            db,
            blob,
            notifier,
            monitor,
            service,
            worker,
            config: self.config,
            _temp_dir: temp_dir,
        })
    }
}

/// A complete pipeline with in-memory adapters and temp storage.
pub struct TestHarness {
    /// SQLite database (temp file, removed on drop).
    pub db: Database,
    pub blob: Arc<MemoryBlobStore>,
    pub notifier: Arc<RecordingNotifier>,
    pub monitor: Arc<ExpirationMonitor>,
    pub service: BucketService,
    pub worker: IngestionWorker,
    pub config: CodepoolConfig,
    _temp_dir: tempfile::TempDir,
}

impl TestHarness {
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// Create a DRAFT bucket discount.
    pub async fn bucket_discount(&self, name: &str) -> Result<Discount, CodepoolError> {
        self.service
            .create_discount(NewDiscount {
                agreement_id: "agr-test".to_string(),
                name: name.to_string(),
                code_type: DiscountCodeType::Bucket,
            })
            .await
    }

    /// Upload `codes` as a CSV, dispatch the load and wait for it to finish.
    pub async fn load_codes(
        &self,
        discount_id: i64,
        codes: &[String],
    ) -> Result<BucketLoad, CodepoolError> {
        let load = self
            .service
            .register_upload(discount_id, "codes.csv", csv(codes))
            .await?;
        self.worker.dispatch(discount_id).await?;
        self.worker.drain().await;
        codepool_storage::queries::loads::get_load(&self.db, load.id)
            .await?
            .ok_or_else(|| CodepoolError::not_found("bucket load", load.id))
    }
}

/// One code per line.
pub fn csv(codes: &[String]) -> Bytes {
    let mut out = String::new();
    for code in codes {
        out.push_str(code);
        out.push('\n');
    }
    Bytes::from(out)
}

/// `n` distinct codes with a common prefix.
pub fn codes(prefix: &str, n: usize) -> Vec<String> {
    (0..n).map(|i| format!("{prefix}-{i:05}")).collect()
}
