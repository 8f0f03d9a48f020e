// SPDX-FileCopyrightText: 2026 Codepool Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Threshold-crossing evaluation over bucket summaries.
//!
//! Each crossed threshold is notified at most once per discount: the ledger
//! is consulted before sending and written only after the gateway confirmed
//! delivery, so a failed send is retried by the next evaluation.

use std::sync::Arc;

use codepool_config::model::MonitorConfig;
use codepool_core::{
    BucketSummary, CodepoolError, DiscountCodeType, NotificationPayload, NotificationRecord,
    NotifierAdapter,
};
use codepool_storage::Database;
use codepool_storage::queries::{discounts, notifications, summaries};
use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::thresholds::Thresholds;

/// What one evaluation of a discount did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Evaluation {
    pub discount_id: i64,
    pub remaining_percent: u8,
    /// Thresholds notified by this evaluation.
    pub sent: Vec<u8>,
    /// Crossed thresholds already present in the ledger.
    pub already_sent: Vec<u8>,
    /// Crossed thresholds whose send failed; retried next time.
    pub failed: Vec<u8>,
}

pub struct ExpirationMonitor {
    db: Database,
    notifier: Arc<dyn NotifierAdapter>,
    thresholds: Thresholds,
    /// Serializes evaluations per discount. A waiting caller re-reads the
    /// summary once it holds the lock, so no newer snapshot is dropped.
    locks: DashMap<i64, Arc<Mutex<()>>>,
}

impl ExpirationMonitor {
    pub fn new(db: Database, notifier: Arc<dyn NotifierAdapter>, thresholds: Thresholds) -> Self {
        Self {
            db,
            notifier,
            thresholds,
            locks: DashMap::new(),
        }
    }

    pub fn from_config(
        db: Database,
        notifier: Arc<dyn NotifierAdapter>,
        config: &MonitorConfig,
    ) -> Self {
        Self::new(db, notifier, Thresholds::new(config.thresholds.clone()))
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    /// Evaluate the summary with this id.
    pub async fn evaluate(&self, summary_id: i64) -> Result<Evaluation, CodepoolError> {
        let summary = summaries::get_summary(&self.db, summary_id)
            .await?
            .ok_or_else(|| CodepoolError::not_found("bucket summary", summary_id))?;
        self.evaluate_discount(summary.discount_id).await
    }

    /// Evaluate the summary of a discount.
    ///
    /// Waits for a concurrent evaluation of the same discount to finish, then
    /// evaluates the summary as it is now.
    pub async fn evaluate_discount(&self, discount_id: i64) -> Result<Evaluation, CodepoolError> {
        let lock = self.locks.entry(discount_id).or_default().clone();
        let _guard = lock.lock().await;

        let summary = summaries::get_summary_for_discount(&self.db, discount_id)
            .await?
            .ok_or_else(|| CodepoolError::not_found("bucket summary", discount_id))?;
        self.evaluate_summary(summary).await
    }

    /// Evaluate every bucket discount that has a summary.
    ///
    /// A failing discount is logged and skipped so one bad row does not
    /// block the sweep.
    pub async fn evaluate_all(&self) -> Result<Vec<Evaluation>, CodepoolError> {
        let mut results = Vec::new();
        for summary in summaries::list_summaries(&self.db).await? {
            let discount_id = summary.discount_id;
            match self.evaluate_discount(discount_id).await {
                Ok(evaluation) => results.push(evaluation),
                Err(e) => warn!(discount_id, error = %e, "expiration evaluation failed"),
            }
        }
        Ok(results)
    }

    /// Callers hold the discount's lock.
    async fn evaluate_summary(&self, summary: BucketSummary) -> Result<Evaluation, CodepoolError> {
        let discount_id = summary.discount_id;
        let remaining_percent = summary.remaining_percent();
        let mut evaluation = Evaluation {
            discount_id,
            remaining_percent,
            ..Evaluation::default()
        };

        if summary.total_codes() == 0 {
            debug!(discount_id, "empty pool, nothing to evaluate");
            return Ok(evaluation);
        }

        let crossed: Vec<u8> = self.thresholds.crossed(remaining_percent).collect();
        if crossed.is_empty() {
            return Ok(evaluation);
        }

        let discount = discounts::require_discount(&self.db, discount_id).await?;
        if discount.code_type != DiscountCodeType::Bucket {
            debug!(discount_id, code_type = %discount.code_type, "not a bucket discount");
            return Ok(evaluation);
        }

        for threshold in crossed {
            let key = NotificationRecord::key_for(discount_id, threshold);
            if notifications::is_recorded(&self.db, &key).await? {
                debug!(discount_id, threshold, "threshold already notified");
                evaluation.already_sent.push(threshold);
                continue;
            }

            let payload = NotificationPayload {
                discount_id,
                discount_name: discount.name.clone(),
                agreement_id: discount.agreement_id.clone(),
                threshold,
                remaining_percent,
                available_codes: summary.available_codes,
                used_codes: summary.used_codes,
            };
            match self.notifier.send(&key, &payload).await {
                Ok(()) => {
                    notifications::record_sent(&self.db, &key).await?;
                    info!(discount_id, threshold, remaining_percent, "threshold notified");
                    evaluation.sent.push(threshold);
                }
                Err(e) => {
                    warn!(
                        discount_id,
                        threshold,
                        error = %e,
                        "notification failed, will retry on next evaluation"
                    );
                    evaluation.failed.push(threshold);
                }
            }
        }

        Ok(evaluation)
    }
}
