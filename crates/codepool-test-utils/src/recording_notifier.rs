// SPDX-FileCopyrightText: 2026 Codepool Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Notification gateway that records every send for assertions.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};

use codepool_core::{
    AdapterType, CodepoolError, HealthStatus, NotificationPayload, NotifierAdapter, PluginAdapter,
};

/// Captures `(tracking_key, payload)` pairs of successful sends.
///
/// `fail_next(n)` makes the next `n` sends fail; failed sends are not
/// recorded. `hold_next()` parks the next send until `release()`.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(String, NotificationPayload)>>,
    failing: Mutex<usize>,
    hold: AtomicBool,
    held: Notify,
    released: Notify,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn fail_next(&self, n: usize) {
        *self.failing.lock().await = n;
    }

    /// Park the next send inside the gateway until [`Self::release`].
    pub fn hold_next(&self) {
        self.hold.store(true, Ordering::SeqCst);
    }

    /// Resolves once a held send has entered the gateway.
    pub async fn wait_held(&self) {
        self.held.notified().await;
    }

    pub fn release(&self) {
        self.released.notify_one();
    }

    pub async fn sent(&self) -> Vec<(String, NotificationPayload)> {
        self.sent.lock().await.clone()
    }

    pub async fn sent_count(&self) -> usize {
        self.sent.lock().await.len()
    }

    /// Thresholds of the recorded sends, in send order.
    pub async fn thresholds(&self) -> Vec<u8> {
        self.sent
            .lock()
            .await
            .iter()
            .map(|(_, payload)| payload.threshold)
            .collect()
    }

    pub async fn clear(&self) {
        self.sent.lock().await.clear();
    }
}

#[async_trait]
impl PluginAdapter for RecordingNotifier {
    fn name(&self) -> &str {
        "recording-notifier"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Notifier
    }

    async fn health_check(&self) -> Result<HealthStatus, CodepoolError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), CodepoolError> {
        Ok(())
    }
}

#[async_trait]
impl NotifierAdapter for RecordingNotifier {
    async fn send(
        &self,
        tracking_key: &str,
        payload: &NotificationPayload,
    ) -> Result<(), CodepoolError> {
        if self.hold.swap(false, Ordering::SeqCst) {
            self.held.notify_one();
            self.released.notified().await;
        }
        {
            let mut failing = self.failing.lock().await;
            if *failing > 0 {
                *failing -= 1;
                return Err(CodepoolError::Notification {
                    message: format!("injected failure for {tracking_key}"),
                    source: None,
                });
            }
        }
        self.sent
            .lock()
            .await
            .push((tracking_key.to_string(), payload.clone()));
        Ok(())
    }
}
