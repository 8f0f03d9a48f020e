// SPDX-FileCopyrightText: 2026 Codepool Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Synchronous use cases around bucket discounts: accepting uploads,
//! guarding discount edits, redeeming codes and resetting a bucket.

use std::sync::Arc;

use bytes::Bytes;
use codepool_core::{
    BlobStoreAdapter, BucketCode, BucketLoad, BucketSummary, CodepoolError, Discount,
    DiscountCodeType, DiscountState, LoadStatus, csv_blob_name,
};
use codepool_monitor::ExpirationMonitor;
use codepool_storage::queries::{codes, discounts, loads, summaries};
use codepool_storage::{BucketReset, Database, NewDiscount};
use tracing::{info, warn};

use crate::upload::UploadPolicy;

pub struct BucketService {
    db: Database,
    blob: Arc<dyn BlobStoreAdapter>,
    policy: UploadPolicy,
    monitor: Option<Arc<ExpirationMonitor>>,
}

impl BucketService {
    pub fn new(db: Database, blob: Arc<dyn BlobStoreAdapter>, policy: UploadPolicy) -> Self {
        Self {
            db,
            blob,
            policy,
            monitor: None,
        }
    }

    /// Evaluate thresholds after every redemption.
    pub fn with_monitor(mut self, monitor: Arc<ExpirationMonitor>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    /// Create a DRAFT discount; bucket discounts get an empty summary.
    pub async fn create_discount(&self, new: NewDiscount) -> Result<Discount, CodepoolError> {
        let discount = discounts::create_discount(&self.db, new).await?;
        if discount.code_type == DiscountCodeType::Bucket {
            summaries::ensure_summary(&self.db, discount.id).await?;
        }
        Ok(discount)
    }

    /// Accept a CSV upload and register a PENDING load for it.
    ///
    /// Validation and conflicts are reported before anything is written; the
    /// blob is removed again if the load cannot be created.
    pub async fn register_upload(
        &self,
        discount_id: i64,
        file_name: &str,
        bytes: Bytes,
    ) -> Result<BucketLoad, CodepoolError> {
        let rows = self.policy.validate(file_name, &bytes)?;

        let discount = discounts::require_discount(&self.db, discount_id).await?;
        if discount.code_type != DiscountCodeType::Bucket {
            return Err(CodepoolError::Conflict(format!(
                "discount {discount_id} uses {} codes, not BUCKET",
                discount.code_type
            )));
        }
        self.reject_outstanding(discount_id).await?;

        let uid = uuid::Uuid::new_v4().to_string();
        let blob_name = csv_blob_name(&uid);
        let size = bytes.len() as u64;
        self.blob.write(&blob_name, bytes, size).await?;

        summaries::ensure_summary(&self.db, discount_id).await?;
        match loads::create_pending_load(&self.db, discount_id, &uid, Some(file_name)).await {
            Ok(load) => {
                info!(discount_id, load_id = load.id, %uid, rows, "upload registered");
                Ok(load)
            }
            Err(e) => {
                if let Err(cleanup) = self.blob.delete(&blob_name).await {
                    warn!(%uid, error = %cleanup, "could not remove orphaned upload");
                }
                Err(e)
            }
        }
    }

    /// Whether `<uid>.csv` is present in the blob store.
    pub async fn check_upload_uid(&self, uid: &str) -> Result<bool, CodepoolError> {
        self.blob.exists(&csv_blob_name(uid)).await
    }

    pub async fn current_load(&self, discount_id: i64) -> Result<Option<BucketLoad>, CodepoolError> {
        loads::current_load(&self.db, discount_id).await
    }

    pub async fn summary(&self, discount_id: i64) -> Result<BucketSummary, CodepoolError> {
        summaries::get_summary_for_discount(&self.db, discount_id)
            .await?
            .ok_or_else(|| CodepoolError::not_found("bucket summary", discount_id))
    }

    /// Delete every code of the discount, zero its summary and re-arm its
    /// notifications.
    pub async fn delete_bucket_codes(&self, discount_id: i64) -> Result<BucketReset, CodepoolError> {
        self.ensure_discount_editable(discount_id).await?;
        let reset = codes::delete_bucket_codes(&self.db, discount_id).await?;
        info!(
            discount_id,
            codes_deleted = reset.codes_deleted,
            ledger_entries_cleared = reset.ledger_entries_cleared,
            "bucket reset"
        );
        Ok(reset)
    }

    /// Hand out the oldest unused code. `None` when the bucket is empty.
    pub async fn redeem_code(&self, discount_id: i64) -> Result<Option<BucketCode>, CodepoolError> {
        discounts::require_discount(&self.db, discount_id).await?;
        let Some((code, summary)) = codes::redeem_next_code(&self.db, discount_id).await? else {
            warn!(discount_id, "bucket is empty");
            return Ok(None);
        };
        self.evaluate(summary.discount_id).await;
        Ok(Some(code))
    }

    /// Flag a specific code as used. Returns `false` if it already was.
    pub async fn mark_code_used(&self, code_id: i64) -> Result<bool, CodepoolError> {
        match codes::mark_code_used(&self.db, code_id).await? {
            Some(summary) => {
                self.evaluate(summary.discount_id).await;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Recompute the summary counters from the code table.
    pub async fn reconcile_summary(&self, discount_id: i64) -> Result<BucketSummary, CodepoolError> {
        discounts::require_discount(&self.db, discount_id).await?;
        summaries::ensure_summary(&self.db, discount_id).await?;
        let summary = summaries::reconcile_summary(&self.db, discount_id).await?;
        info!(
            discount_id,
            available = summary.available_codes,
            used = summary.used_codes,
            "summary reconciled"
        );
        Ok(summary)
    }

    /// Reject edits while the discount has a PENDING or RUNNING load.
    pub async fn ensure_discount_editable(&self, discount_id: i64) -> Result<Discount, CodepoolError> {
        let discount = discounts::require_discount(&self.db, discount_id).await?;
        self.reject_outstanding(discount_id).await?;
        Ok(discount)
    }

    /// Publish a discount. A bucket discount needs a finished load with codes.
    pub async fn publish_discount(&self, discount_id: i64) -> Result<Discount, CodepoolError> {
        let discount = self.ensure_discount_editable(discount_id).await?;
        if discount.state == DiscountState::Published {
            return Ok(discount);
        }
        if discount.code_type == DiscountCodeType::Bucket {
            let ready = loads::current_load(&self.db, discount_id)
                .await?
                .is_some_and(|load| {
                    load.status == LoadStatus::Finished && load.number_of_codes.unwrap_or(0) > 0
                });
            if !ready {
                return Err(CodepoolError::Conflict(format!(
                    "discount {discount_id} has no finished bucket load with codes"
                )));
            }
        }
        discounts::update_state(&self.db, discount_id, DiscountState::Published).await?;
        info!(discount_id, "discount published");
        discounts::require_discount(&self.db, discount_id).await
    }

    /// Switch how a discount hands out codes. Leaving BUCKET resets the bucket.
    pub async fn change_code_type(
        &self,
        discount_id: i64,
        code_type: DiscountCodeType,
    ) -> Result<Discount, CodepoolError> {
        let discount = self.ensure_discount_editable(discount_id).await?;
        if discount.code_type == code_type {
            return Ok(discount);
        }
        if discount.code_type == DiscountCodeType::Bucket {
            codes::delete_bucket_codes(&self.db, discount_id).await?;
        }
        discounts::update_code_type(&self.db, discount_id, code_type).await?;
        if code_type == DiscountCodeType::Bucket {
            summaries::ensure_summary(&self.db, discount_id).await?;
        }
        discounts::require_discount(&self.db, discount_id).await
    }

    async fn reject_outstanding(&self, discount_id: i64) -> Result<(), CodepoolError> {
        if let Some(load) = loads::outstanding_load(&self.db, discount_id).await? {
            return Err(CodepoolError::Conflict(format!(
                "discount {discount_id} has a {} bucket load ({})",
                load.status, load.uid
            )));
        }
        Ok(())
    }

    async fn evaluate(&self, discount_id: i64) {
        if let Some(monitor) = &self.monitor {
            evaluate_quietly(monitor, discount_id).await;
        }
    }
}

/// Run the monitor for a discount, logging instead of propagating failures.
pub(crate) async fn evaluate_quietly(monitor: &ExpirationMonitor, discount_id: i64) {
    if let Err(e) = monitor.evaluate_discount(discount_id).await {
        warn!(discount_id, error = %e, "expiration evaluation failed");
    }
}
