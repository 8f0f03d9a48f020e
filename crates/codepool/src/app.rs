// SPDX-FileCopyrightText: 2026 Codepool Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Wiring of the configured adapters into the bucket pipeline.

use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use codepool_blob::FsBlobStore;
use codepool_config::model::CodepoolConfig;
use codepool_core::{BucketLoad, CodepoolError, HealthStatus, NotifierAdapter, PluginAdapter};
use codepool_ingest::{BucketService, IngestionEngine, IngestionWorker, RetryPolicy, UploadPolicy};
use codepool_monitor::{ExpirationMonitor, build_notifier};
use codepool_storage::Database;
use codepool_storage::queries::loads;
use tracing::{info, warn};

pub struct App {
    pub config: CodepoolConfig,
    pub db: Database,
    pub blob: Arc<FsBlobStore>,
    pub notifier: Arc<dyn NotifierAdapter>,
    pub monitor: Arc<ExpirationMonitor>,
    pub service: BucketService,
    pub worker: IngestionWorker,
}

impl App {
    pub async fn open(config: CodepoolConfig) -> Result<Self, CodepoolError> {
        let db =
            Database::open_with_options(&config.storage.database_path, config.storage.wal_mode)
                .await?;
        let blob = Arc::new(FsBlobStore::open(&config.blob.root_dir).await?);
        let notifier = build_notifier(&config.notification)?;
        let monitor = Arc::new(ExpirationMonitor::from_config(
            db.clone(),
            Arc::clone(&notifier),
            &config.monitor,
        ));

        let engine = Arc::new(IngestionEngine::new(
            db.clone(),
            blob.clone(),
            RetryPolicy::from_config(&config.ingest),
            config.ingest.insert_batch_size,
        ));
        let mut worker =
            IngestionWorker::new(db.clone(), engine, config.ingest.max_concurrent_loads);
        let mut service = BucketService::new(
            db.clone(),
            blob.clone(),
            UploadPolicy::from_config(&config.ingest, &config.blob),
        );
        if config.monitor.enabled {
            worker = worker.with_monitor(Arc::clone(&monitor));
            service = service.with_monitor(Arc::clone(&monitor));
        }

        Ok(Self {
            config,
            db,
            blob,
            notifier,
            monitor,
            service,
            worker,
        })
    }

    /// Register `file` for a discount and, when `wait` is set, ingest it
    /// before returning.
    pub async fn upload(
        &self,
        discount_id: i64,
        file: &Path,
        wait: bool,
    ) -> Result<BucketLoad, CodepoolError> {
        let content = tokio::fs::read(file).await.map_err(|e| {
            CodepoolError::Validation(format!("cannot read {}: {e}", file.display()))
        })?;
        let file_name = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let load = self
            .service
            .register_upload(discount_id, &file_name, Bytes::from(content))
            .await?;
        if !wait {
            return Ok(load);
        }

        self.worker.dispatch(discount_id).await?;
        self.worker.drain().await;
        loads::get_load(&self.db, load.id)
            .await?
            .ok_or_else(|| CodepoolError::not_found("bucket load", load.id))
    }

    /// Log the health of every adapter.
    pub async fn report_health(&self) {
        log_health(self.blob.name(), self.blob.health_check().await);
        log_health(self.notifier.name(), self.notifier.health_check().await);
    }

    /// Wait for in-flight loads, then close the adapters and the database.
    pub async fn close(self) -> Result<(), CodepoolError> {
        self.worker.shutdown().await;
        if let Err(e) = self.notifier.shutdown().await {
            warn!(error = %e, "notifier shutdown failed");
        }
        self.db.close().await
    }
}

fn log_health(adapter: &str, status: Result<HealthStatus, CodepoolError>) {
    match status {
        Ok(HealthStatus::Healthy) => info!(adapter, "adapter healthy"),
        Ok(status) => warn!(adapter, ?status, "adapter not healthy"),
        Err(e) => warn!(adapter, error = %e, "health check failed"),
    }
}
