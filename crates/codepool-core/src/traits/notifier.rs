// SPDX-FileCopyrightText: 2026 Codepool Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Notification gateway adapter trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::CodepoolError;
use crate::traits::adapter::PluginAdapter;

/// Content of a "bucket running low" notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub discount_id: i64,
    pub discount_name: String,
    pub agreement_id: String,
    /// The crossed threshold, in percent.
    pub threshold: u8,
    pub remaining_percent: u8,
    pub available_codes: i64,
    pub used_codes: i64,
}

impl NotificationPayload {
    pub fn subject(&self) -> String {
        format!(
            "Discount \"{}\" has {}% of its codes left",
            self.discount_name, self.remaining_percent
        )
    }

    pub fn body(&self) -> String {
        format!(
            "Discount {id} (\"{name}\") of agreement {agreement} dropped to \
             {remaining}% of available codes, at or below the {threshold}% watch point.\n\
             Available codes: {available}\nUsed codes: {used}\n\
             Upload a new bucket of codes to avoid running out.\n",
            id = self.discount_id,
            name = self.discount_name,
            agreement = self.agreement_id,
            remaining = self.remaining_percent,
            threshold = self.threshold,
            available = self.available_codes,
            used = self.used_codes,
        )
    }
}

/// Delivers a message for an idempotency tracking key.
///
/// An `Err` means the message was not sent.
#[async_trait]
pub trait NotifierAdapter: PluginAdapter {
    async fn send(
        &self,
        tracking_key: &str,
        payload: &NotificationPayload,
    ) -> Result<(), CodepoolError>;
}
