// SPDX-FileCopyrightText: 2026 Codepool Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bounded background execution of bucket loads.
//!
//! `dispatch` moves a PENDING load to RUNNING on the caller's path and hands
//! the ingestion to a tracked task. At most `max_concurrent_loads` loads
//! ingest at once; the rest wait for a permit while already RUNNING.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use codepool_core::{BucketLoad, CodepoolError, LoadStatus};
use codepool_monitor::ExpirationMonitor;
use codepool_storage::Database;
use codepool_storage::queries::{codes, loads};
use dashmap::DashSet;
use tokio::sync::Semaphore;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::engine::IngestionEngine;
use crate::service::evaluate_quietly;

pub struct IngestionWorker {
    db: Database,
    engine: Arc<IngestionEngine>,
    monitor: Option<Arc<ExpirationMonitor>>,
    permits: Arc<Semaphore>,
    tracker: TaskTracker,
    /// Loads dispatched by this worker that have not reached a terminal state.
    in_flight: Arc<DashSet<i64>>,
    accepting: AtomicBool,
}

impl IngestionWorker {
    pub fn new(db: Database, engine: Arc<IngestionEngine>, max_concurrent_loads: usize) -> Self {
        Self {
            db,
            engine,
            monitor: None,
            permits: Arc::new(Semaphore::new(max_concurrent_loads.max(1))),
            tracker: TaskTracker::new(),
            in_flight: Arc::new(DashSet::new()),
            accepting: AtomicBool::new(true),
        }
    }

    /// Evaluate the discount's thresholds once each load finishes.
    pub fn with_monitor(mut self, monitor: Arc<ExpirationMonitor>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    /// Start ingesting the discount's PENDING load.
    ///
    /// Returns the RUNNING record immediately. A load that is not PENDING
    /// (already dispatched, or terminal) is `NotFound`.
    pub async fn dispatch(&self, discount_id: i64) -> Result<BucketLoad, CodepoolError> {
        if !self.accepting.load(Ordering::SeqCst) {
            return Err(CodepoolError::Internal(
                "ingestion worker is shutting down".into(),
            ));
        }
        let load = loads::current_load(&self.db, discount_id)
            .await?
            .ok_or_else(|| CodepoolError::not_found("bucket load", discount_id))?;
        let running = loads::mark_running(&self.db, load.id).await?;
        self.in_flight.insert(running.id);
        debug!(discount_id, load_id = running.id, "bucket load dispatched");

        let engine = Arc::clone(&self.engine);
        let monitor = self.monitor.clone();
        let permits = Arc::clone(&self.permits);
        let in_flight = Arc::clone(&self.in_flight);
        let load_id = running.id;
        self.tracker.spawn(async move {
            let _permit = match permits.acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    error!(load_id, error = %e, "worker pool closed");
                    in_flight.remove(&load_id);
                    return;
                }
            };
            let outcome = engine.perform_load(discount_id).await;
            in_flight.remove(&load_id);
            match outcome {
                Ok(load) if load.status == LoadStatus::Finished => {
                    if let Some(monitor) = monitor {
                        evaluate_quietly(&monitor, discount_id).await;
                    }
                }
                Ok(_) => {}
                Err(e) => error!(discount_id, load_id, error = %e, "bucket load aborted"),
            }
        });

        Ok(running)
    }

    /// Dispatch every PENDING load that is its discount's current load.
    pub async fn dispatch_pending(&self) -> Result<Vec<BucketLoad>, CodepoolError> {
        let mut dispatched = Vec::new();
        for load in loads::list_pending_loads(&self.db).await? {
            match self.dispatch(load.discount_id).await {
                Ok(running) => dispatched.push(running),
                Err(e) => warn!(
                    discount_id = load.discount_id,
                    load_id = load.id,
                    error = %e,
                    "could not dispatch pending load"
                ),
            }
        }
        if !dispatched.is_empty() {
            info!(count = dispatched.len(), "dispatched pending loads");
        }
        Ok(dispatched)
    }

    /// Fail RUNNING loads that have not moved for longer than `timeout`.
    ///
    /// Codes tagged with a stale load are purged first. Loads ingesting in
    /// this worker are left alone. Stale loads are never re-queued.
    pub async fn recover_stale_loads(
        &self,
        timeout: Duration,
    ) -> Result<Vec<BucketLoad>, CodepoolError> {
        let mut recovered = Vec::new();
        for load in loads::list_stale_running_loads(&self.db, timeout.as_secs()).await? {
            if self.in_flight.contains(&load.id) {
                continue;
            }
            let purged = codes::delete_codes_for_load(&self.db, load.id).await?;
            let failed = loads::mark_failed(&self.db, load.id).await?;
            warn!(
                discount_id = load.discount_id,
                load_id = load.id,
                uid = %load.uid,
                purged,
                "stale bucket load marked failed"
            );
            recovered.push(failed);
        }
        Ok(recovered)
    }

    /// Number of dispatched loads not yet terminal.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Wait until every dispatched load is terminal. Dispatching stays open.
    pub async fn drain(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }

    /// Stop accepting loads and wait for the in-flight ones to finish.
    pub async fn shutdown(&self) {
        self.accepting.store(false, Ordering::SeqCst);
        self.tracker.close();
        info!(in_flight = self.in_flight.len(), "waiting for bucket loads to finish");
        self.tracker.wait().await;
        info!("ingestion worker stopped");
    }
}
