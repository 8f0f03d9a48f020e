// SPDX-FileCopyrightText: 2026 Codepool Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `codepool serve` command implementation.
//!
//! Runs three periodic tasks until SIGINT/SIGTERM: the pending-load sweep,
//! stale RUNNING load recovery, and the expiration monitor sweep. In-flight
//! loads always finish before the process exits.

use std::sync::Arc;
use std::time::Duration;

use codepool_config::model::CodepoolConfig;
use codepool_core::CodepoolError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::app::App;
use crate::shutdown;

/// Runs the `codepool serve` command.
pub async fn run_serve(config: CodepoolConfig) -> Result<(), CodepoolError> {
    info!(name = %config.service.name, "codepool starting");
    let app = Arc::new(App::open(config).await?);
    app.report_health().await;

    let cancel = shutdown::install_signal_handler();
    let sweep_every = Duration::from_secs(app.config.ingest.sweep_interval_secs);
    let stale_after = Duration::from_secs(app.config.ingest.stale_load_timeout_secs);

    // Recover before sweeping so crashed loads are not left RUNNING.
    recover(&app, stale_after).await;
    sweep_pending(&app).await;

    let mut tasks = tokio::task::JoinSet::new();
    tasks.spawn(ingest_loop(
        Arc::clone(&app),
        cancel.clone(),
        sweep_every,
        stale_after,
    ));
    if app.config.monitor.enabled {
        let every = Duration::from_secs(app.config.monitor.interval_secs);
        tasks.spawn(monitor_loop(Arc::clone(&app), cancel.clone(), every));
    } else {
        info!("expiration monitor disabled");
    }

    info!("codepool serving");
    cancel.cancelled().await;
    while tasks.join_next().await.is_some() {}

    let app = Arc::try_unwrap(app).map_err(|_| {
        CodepoolError::Internal("background tasks still hold the service".into())
    })?;
    app.close().await?;
    info!("codepool stopped");
    Ok(())
}

async fn ingest_loop(
    app: Arc<App>,
    cancel: CancellationToken,
    every: Duration,
    stale_after: Duration,
) {
    let mut interval = tokio::time::interval(every);
    // Skip the first immediate tick.
    interval.tick().await;

    loop {
        tokio::select! {
            _ = interval.tick() => {
                recover(&app, stale_after).await;
                sweep_pending(&app).await;
            }
            _ = cancel.cancelled() => {
                debug!("ingest sweep shutting down");
                break;
            }
        }
    }
}

async fn monitor_loop(app: Arc<App>, cancel: CancellationToken, every: Duration) {
    let mut interval = tokio::time::interval(every);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                match app.monitor.evaluate_all().await {
                    Ok(evaluations) => {
                        let sent: usize = evaluations.iter().map(|e| e.sent.len()).sum();
                        debug!(discounts = evaluations.len(), sent, "monitor sweep completed");
                    }
                    Err(e) => warn!(error = %e, "monitor sweep failed (non-fatal)"),
                }
            }
            _ = cancel.cancelled() => {
                debug!("monitor sweep shutting down");
                break;
            }
        }
    }
}

async fn recover(app: &App, stale_after: Duration) {
    if let Err(e) = app.worker.recover_stale_loads(stale_after).await {
        warn!(error = %e, "stale load recovery failed (non-fatal)");
    }
}

async fn sweep_pending(app: &App) {
    if let Err(e) = app.worker.dispatch_pending().await {
        warn!(error = %e, "pending load sweep failed (non-fatal)");
    }
}
