// SPDX-FileCopyrightText: 2026 Codepool Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Ingestion of a RUNNING bucket load: read the CSV, bulk insert the codes,
//! then finish the load and grow the summary.
//!
//! A load that cannot be ingested ends FAILED with no codes tagged with its
//! id and the summary untouched.

use std::sync::Arc;

use codepool_core::{BlobStoreAdapter, BucketLoad, CodepoolError, LoadStatus};
use codepool_storage::Database;
use codepool_storage::queries::{codes, loads, summaries};
use tracing::{debug, error, info, warn};

use crate::retry::RetryPolicy;

pub struct IngestionEngine {
    db: Database,
    blob: Arc<dyn BlobStoreAdapter>,
    retry: RetryPolicy,
    batch_size: usize,
}

impl IngestionEngine {
    pub fn new(
        db: Database,
        blob: Arc<dyn BlobStoreAdapter>,
        retry: RetryPolicy,
        batch_size: usize,
    ) -> Self {
        Self {
            db,
            blob,
            retry,
            batch_size: batch_size.max(1),
        }
    }

    /// Ingest the discount's current load, which must be RUNNING.
    ///
    /// Ingestion failures are not returned as errors: the load is marked
    /// FAILED and returned. `Err` means the load could not be resolved, was
    /// not RUNNING, or its final transition could not be persisted.
    pub async fn perform_load(&self, discount_id: i64) -> Result<BucketLoad, CodepoolError> {
        let load = loads::current_load(&self.db, discount_id)
            .await?
            .ok_or_else(|| CodepoolError::not_found("bucket load", discount_id))?;
        if load.status != LoadStatus::Running {
            return Err(CodepoolError::Conflict(format!(
                "load {} of discount {discount_id} is {}, expected RUNNING",
                load.id, load.status
            )));
        }

        match self.ingest(&load).await {
            Ok(count) => self.finish(&load, count).await,
            Err(e) => {
                error!(
                    discount_id,
                    load_id = load.id,
                    uid = %load.uid,
                    error = %e,
                    "bucket load failed"
                );
                self.fail(&load).await
            }
        }
    }

    /// Read and persist the codes, returning how many were inserted.
    async fn ingest(&self, load: &BucketLoad) -> Result<i64, CodepoolError> {
        let blob = &self.blob;
        let uid = load.uid.as_str();
        let values = self
            .retry
            .run("read csv", || async move {
                let (values, skipped) = blob.read_csv(uid).await?.first_column()?;
                if skipped > 0 {
                    debug!(uid, skipped, "skipped empty or malformed rows");
                }
                Ok(values)
            })
            .await?;

        let db = &self.db;
        let (discount_id, load_id, batch_size) = (load.discount_id, load.id, self.batch_size);
        self.retry
            .run("insert codes", || {
                let values = values.clone();
                async move {
                    codes::bulk_insert_codes(db, discount_id, load_id, values, batch_size).await
                }
            })
            .await?;

        Ok(values.len() as i64)
    }

    async fn finish(&self, load: &BucketLoad, count: i64) -> Result<BucketLoad, CodepoolError> {
        let finished = match loads::mark_finished(&self.db, load.id, count).await {
            Ok(finished) => finished,
            Err(e) => {
                error!(load_id = load.id, error = %e, "could not finish bucket load");
                return self.fail(load).await;
            }
        };

        if let Err(e) = summaries::increment_available(&self.db, load.discount_id, count).await {
            warn!(
                discount_id = load.discount_id,
                error = %e,
                "summary increment failed, reconciling from the code table"
            );
            summaries::reconcile_summary(&self.db, load.discount_id).await?;
        }

        info!(
            discount_id = load.discount_id,
            load_id = load.id,
            codes = count,
            "bucket load finished"
        );
        Ok(finished)
    }

    /// Purge anything tagged with the load, then mark it FAILED.
    async fn fail(&self, load: &BucketLoad) -> Result<BucketLoad, CodepoolError> {
        let purged = codes::delete_codes_for_load(&self.db, load.id).await?;
        if purged > 0 {
            warn!(load_id = load.id, purged, "purged codes of failed load");
        }
        loads::mark_failed(&self.db, load.id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codepool_core::{DiscountCodeType, csv_blob_name};
    use codepool_storage::NewDiscount;
    use codepool_storage::queries::discounts;
    use codepool_test_utils::MemoryBlobStore;
    use tempfile::tempdir;
    use tracing_test::traced_test;

    struct Fixture {
        db: Database,
        _dir: tempfile::TempDir,
        blob: Arc<MemoryBlobStore>,
        engine: IngestionEngine,
        discount_id: i64,
    }

    async fn setup(max_attempts: u32) -> Fixture {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path().join("test.db").to_str().unwrap())
            .await
            .unwrap();
        let discount = discounts::create_discount(
            &db,
            NewDiscount {
                agreement_id: "agr-1".into(),
                name: "Spring".into(),
                code_type: DiscountCodeType::Bucket,
            },
        )
        .await
        .unwrap();
        summaries::ensure_summary(&db, discount.id).await.unwrap();
        let blob = Arc::new(MemoryBlobStore::new());
        let engine = IngestionEngine::new(
            db.clone(),
            blob.clone(),
            RetryPolicy::immediate(max_attempts),
            2,
        );
        Fixture {
            db,
            _dir: dir,
            blob,
            engine,
            discount_id: discount.id,
        }
    }

    /// Create a RUNNING load backed by `content`.
    async fn running_load(f: &Fixture, uid: &str, content: &'static [u8]) -> BucketLoad {
        f.blob.insert(&csv_blob_name(uid), content).await;
        let load = loads::create_pending_load(&f.db, f.discount_id, uid, Some("codes.csv"))
            .await
            .unwrap();
        loads::mark_running(&f.db, load.id).await.unwrap()
    }

    async fn available(f: &Fixture) -> i64 {
        summaries::get_summary_for_discount(&f.db, f.discount_id)
            .await
            .unwrap()
            .unwrap()
            .available_codes
    }

    #[tokio::test]
    async fn ingests_first_column_with_duplicates() {
        let f = setup(1).await;
        let load = running_load(&f, "u1", b"A1,x\nA2\n\nA1\n\"A3\",y,z\n").await;

        let done = f.engine.perform_load(f.discount_id).await.unwrap();
        assert_eq!(done.status, LoadStatus::Finished);
        assert_eq!(done.number_of_codes, Some(4));
        assert_eq!(
            codes::count_by_discount_and_load(&f.db, f.discount_id, load.id)
                .await
                .unwrap(),
            4
        );
        assert_eq!(available(&f).await, 4);

        let mut stored: Vec<String> = codes::list_codes_for_load(&f.db, load.id)
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.code)
            .collect();
        stored.sort();
        assert_eq!(stored, vec!["A1", "A1", "A2", "A3"]);
    }

    #[tokio::test]
    #[traced_test]
    async fn missing_blob_fails_without_codes() {
        let f = setup(3).await;
        let load = loads::create_pending_load(&f.db, f.discount_id, "ghost", None)
            .await
            .unwrap();
        loads::mark_running(&f.db, load.id).await.unwrap();

        let done = f.engine.perform_load(f.discount_id).await.unwrap();
        assert_eq!(done.status, LoadStatus::Failed);
        assert_eq!(done.number_of_codes, None);
        assert_eq!(
            codes::count_by_discount_and_load(&f.db, f.discount_id, load.id)
                .await
                .unwrap(),
            0
        );
        assert_eq!(available(&f).await, 0);
        // Not transient: a single read attempt.
        assert_eq!(f.blob.read_count().await, 1);
        assert!(logs_contain("bucket load failed"));
    }

    #[tokio::test]
    async fn transient_read_failures_are_retried() {
        let f = setup(3).await;
        running_load(&f, "u1", b"A1\nA2\n").await;
        f.blob.fail_next_reads(2).await;

        let done = f.engine.perform_load(f.discount_id).await.unwrap();
        assert_eq!(done.status, LoadStatus::Finished);
        assert_eq!(f.blob.read_count().await, 3);
        assert_eq!(available(&f).await, 2);
    }

    #[tokio::test]
    async fn exhausted_retries_fail_the_load() {
        let f = setup(2).await;
        running_load(&f, "u1", b"A1\nA2\n").await;
        f.blob.fail_next_reads(5).await;

        let done = f.engine.perform_load(f.discount_id).await.unwrap();
        assert_eq!(done.status, LoadStatus::Failed);
        assert_eq!(f.blob.read_count().await, 2);
        assert_eq!(codes::count_by_discount(&f.db, f.discount_id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn terminal_loads_are_never_reingested() {
        let f = setup(1).await;
        running_load(&f, "u1", b"A1\nA2\n").await;
        f.engine.perform_load(f.discount_id).await.unwrap();

        let err = f.engine.perform_load(f.discount_id).await.unwrap_err();
        assert!(matches!(err, CodepoolError::Conflict(_)));
        assert_eq!(codes::count_by_discount(&f.db, f.discount_id).await.unwrap(), 2);
        assert_eq!(available(&f).await, 2);
    }

    #[tokio::test]
    async fn pending_load_is_not_ingested() {
        let f = setup(1).await;
        f.blob.insert(&csv_blob_name("u1"), &b"A1\n"[..]).await;
        loads::create_pending_load(&f.db, f.discount_id, "u1", None)
            .await
            .unwrap();
        assert!(matches!(
            f.engine.perform_load(f.discount_id).await,
            Err(CodepoolError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn discount_without_load_is_not_found() {
        let f = setup(1).await;
        assert!(matches!(
            f.engine.perform_load(f.discount_id).await,
            Err(CodepoolError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn second_load_adds_to_summary() {
        let f = setup(1).await;
        running_load(&f, "u1", b"A1\nA2\n").await;
        f.engine.perform_load(f.discount_id).await.unwrap();
        running_load(&f, "u2", b"B1\nB2\nB3\n").await;
        let done = f.engine.perform_load(f.discount_id).await.unwrap();

        assert_eq!(done.number_of_codes, Some(3));
        assert_eq!(available(&f).await, 5);
    }
}
