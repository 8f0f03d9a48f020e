// SPDX-FileCopyrightText: 2026 Codepool Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Notification gateways: structured log events and SMTP email.

use std::sync::Arc;

use async_trait::async_trait;
use codepool_config::model::{NotificationConfig, NotificationKind};
use codepool_core::{
    AdapterType, CodepoolError, HealthStatus, NotificationPayload, NotifierAdapter, PluginAdapter,
};
use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{info, warn};

/// Build the gateway selected by `[notification] kind`.
pub fn build_notifier(
    config: &NotificationConfig,
) -> Result<Arc<dyn NotifierAdapter>, CodepoolError> {
    match config.kind {
        NotificationKind::Log => Ok(Arc::new(LogNotifier)),
        NotificationKind::Smtp => Ok(Arc::new(SmtpNotifier::new(config)?)),
    }
}

/// Emits every notification as a `warn` event. Never fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl PluginAdapter for LogNotifier {
    fn name(&self) -> &str {
        "log"
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
impl NotifierAdapter for LogNotifier {
    async fn send(
        &self,
        tracking_key: &str,
        payload: &NotificationPayload,
    ) -> Result<(), CodepoolError> {
        warn!(
            tracking_key,
            discount_id = payload.discount_id,
            discount_name = %payload.discount_name,
            agreement_id = %payload.agreement_id,
            threshold = payload.threshold,
            remaining_percent = payload.remaining_percent,
            available_codes = payload.available_codes,
            used_codes = payload.used_codes,
            "bucket codes running low"
        );
        Ok(())
    }
}

/// Sends a plain-text email per notification through an SMTP relay.
pub struct SmtpNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    host: String,
    from: Mailbox,
    to: Mailbox,
}

impl SmtpNotifier {
    pub fn new(config: &NotificationConfig) -> Result<Self, CodepoolError> {
        let host = required(&config.smtp_host, "notification.smtp_host")?;
        let from = parse_mailbox(required(&config.from_address, "notification.from_address")?)?;
        let to = parse_mailbox(required(&config.to_address, "notification.to_address")?)?;

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
            .map_err(|e| CodepoolError::Config(format!("invalid SMTP relay {host}: {e}")))?
            .port(config.smtp_port);
        if let (Some(user), Some(pass)) = (&config.smtp_username, &config.smtp_password) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }

        Ok(Self {
            transport: builder.build(),
            host: host.to_string(),
            from,
            to,
        })
    }

    fn build_message(
        &self,
        tracking_key: &str,
        payload: &NotificationPayload,
    ) -> Result<Message, CodepoolError> {
        Message::builder()
            .from(self.from.clone())
            .to(self.to.clone())
            .subject(payload.subject())
            .message_id(Some(format!("<{tracking_key}@codepool>")))
            .header(ContentType::TEXT_PLAIN)
            .body(payload.body())
            .map_err(|e| CodepoolError::Notification {
                message: format!("failed to build email for {tracking_key}"),
                source: Some(Box::new(e)),
            })
    }
}

fn required<'a>(value: &'a Option<String>, key: &str) -> Result<&'a str, CodepoolError> {
    value
        .as_deref()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| CodepoolError::Config(format!("{key} is required for SMTP notifications")))
}

fn parse_mailbox(address: &str) -> Result<Mailbox, CodepoolError> {
    address
        .parse()
        .map_err(|e| CodepoolError::Config(format!("invalid email address `{address}`: {e}")))
}

#[async_trait]
impl PluginAdapter for SmtpNotifier {
    fn name(&self) -> &str {
        "smtp"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Notifier
    }

    async fn health_check(&self) -> Result<HealthStatus, CodepoolError> {
        match self.transport.test_connection().await {
            Ok(true) => Ok(HealthStatus::Healthy),
            Ok(false) => Ok(HealthStatus::Degraded(format!(
                "SMTP relay {} did not accept NOOP",
                self.host
            ))),
            Err(e) => Ok(HealthStatus::Unhealthy(e.to_string())),
        }
    }

    async fn shutdown(&self) -> Result<(), CodepoolError> {
        Ok(())
    }
}

#[async_trait]
impl NotifierAdapter for SmtpNotifier {
    async fn send(
        &self,
        tracking_key: &str,
        payload: &NotificationPayload,
    ) -> Result<(), CodepoolError> {
        let email = self.build_message(tracking_key, payload)?;
        self.transport
            .send(email)
            .await
            .map_err(|e| CodepoolError::Notification {
                message: format!("SMTP delivery to {} failed", self.host),
                source: Some(Box::new(e)),
            })?;
        info!(tracking_key, to = %self.to, "notification email sent");
        Ok(())
    }
}
