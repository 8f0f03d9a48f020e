// SPDX-FileCopyrightText: 2026 Codepool Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end tests with the production adapters: a config file, the
//! filesystem blob store, the SQLite database and the log notifier.

use std::sync::Arc;

use bytes::Bytes;
use codepool_blob::FsBlobStore;
use codepool_config::model::CodepoolConfig;
use codepool_core::{BlobStoreAdapter, DiscountCodeType, LoadStatus, csv_blob_name};
use codepool_ingest::{BucketService, IngestionEngine, IngestionWorker, RetryPolicy, UploadPolicy};
use codepool_monitor::{ExpirationMonitor, build_notifier};
use codepool_storage::queries::{loads, notifications};
use codepool_storage::{Database, NewDiscount};
use codepool_test_utils::{TestHarness, codes, csv};

struct Stack {
    _dir: tempfile::TempDir,
    db: Database,
    blob: Arc<FsBlobStore>,
    monitor: Arc<ExpirationMonitor>,
    service: BucketService,
    worker: IngestionWorker,
}

fn write_config(dir: &std::path::Path) -> CodepoolConfig {
    let path = dir.join("codepool.toml");
    let toml = format!(
        r#"
[storage]
database_path = "{db}"

[blob]
root_dir = "{blobs}"

[ingest]
min_csv_rows = 3
insert_batch_size = 4
retry_initial_backoff_ms = 1
retry_max_backoff_ms = 2

[monitor]
thresholds = [50, 20]

[notification]
kind = "log"
"#,
        db = dir.join("codepool.db").display(),
        blobs = dir.join("blobs").display(),
    );
    std::fs::write(&path, toml).unwrap();
    codepool_config::load_and_validate_path(&path).expect("config should be valid")
}

async fn stack() -> Stack {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path());

    let db = Database::open_with_options(&config.storage.database_path, config.storage.wal_mode)
        .await
        .unwrap();
    let blob = Arc::new(FsBlobStore::open(&config.blob.root_dir).await.unwrap());
    let notifier = build_notifier(&config.notification).unwrap();
    let monitor = Arc::new(ExpirationMonitor::from_config(
        db.clone(),
        notifier,
        &config.monitor,
    ));
    let engine = Arc::new(IngestionEngine::new(
        db.clone(),
        blob.clone(),
        RetryPolicy::from_config(&config.ingest),
        config.ingest.insert_batch_size,
    ));
    let worker = IngestionWorker::new(db.clone(), engine, config.ingest.max_concurrent_loads)
        .with_monitor(Arc::clone(&monitor));
    let service = BucketService::new(
        db.clone(),
        blob.clone(),
        UploadPolicy::from_config(&config.ingest, &config.blob),
    )
    .with_monitor(Arc::clone(&monitor));

    Stack {
        _dir: dir,
        db,
        blob,
        monitor,
        service,
        worker,
    }
}

#[tokio::test]
async fn csv_on_disk_to_notifications() {
    let s = stack().await;
    let d = s
        .service
        .create_discount(NewDiscount {
            agreement_id: "agr-e2e".into(),
            name: "Disk".into(),
            code_type: DiscountCodeType::Bucket,
        })
        .await
        .unwrap();

    let load = s
        .service
        .register_upload(d.id, "codes.csv", csv(&codes("E", 10)))
        .await
        .unwrap();
    assert!(s.blob.exists(&csv_blob_name(&load.uid)).await.unwrap());

    s.worker.dispatch(d.id).await.unwrap();
    s.worker.drain().await;
    let done = loads::get_load(&s.db, load.id).await.unwrap().unwrap();
    assert_eq!(done.status, LoadStatus::Finished);
    assert_eq!(done.number_of_codes, Some(10));

    for _ in 0..8 {
        s.service.redeem_code(d.id).await.unwrap().unwrap();
    }
    let recorded = notifications::list_for_discount(&s.db, d.id).await.unwrap();
    assert_eq!(recorded.len(), 2);

    let eval = s.monitor.evaluate_discount(d.id).await.unwrap();
    assert_eq!(eval.remaining_percent, 20);
    assert!(eval.sent.is_empty());
    assert_eq!(eval.already_sent, vec![50, 20]);
}

#[tokio::test]
async fn short_csv_is_rejected_before_any_load() {
    let s = stack().await;
    let d = s
        .service
        .create_discount(NewDiscount {
            agreement_id: "agr-e2e".into(),
            name: "Short".into(),
            code_type: DiscountCodeType::Bucket,
        })
        .await
        .unwrap();

    let err = s
        .service
        .register_upload(d.id, "codes.csv", Bytes::from_static(b"A\nB\n"))
        .await
        .unwrap_err();
    assert!(matches!(err, codepool_core::CodepoolError::Validation(_)));
    assert!(s.service.current_load(d.id).await.unwrap().is_none());
}

#[tokio::test]
async fn harness_pipeline_matches_production_wiring() {
    let h = TestHarness::builder()
        .with_thresholds(vec![50, 20])
        .build()
        .await
        .unwrap();
    let d = h.bucket_discount("Harness").await.unwrap();
    h.load_codes(d.id, &codes("H", 10)).await.unwrap();
    for _ in 0..8 {
        h.service.redeem_code(d.id).await.unwrap();
    }
    assert_eq!(h.notifier.thresholds().await, vec![50, 20]);
}
