// SPDX-FileCopyrightText: 2026 Codepool Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Expiration monitor for bucket discounts.
//!
//! Watches the share of codes still available per discount and notifies
//! operators once per crossed threshold, through a log or SMTP gateway.

pub mod monitor;
pub mod notifier;
pub mod thresholds;

pub use monitor::{Evaluation, ExpirationMonitor};
pub use notifier::{LogNotifier, SmtpNotifier, build_notifier};
pub use thresholds::Thresholds;
