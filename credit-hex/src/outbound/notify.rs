//! Notification dispatchers.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use tracing::{info, instrument};

use credit_types::{NotificationKind, Notifier, NotifyError, UserId};

/// Writes notifications to the log instead of delivering them.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(
        &self,
        kind: NotificationKind,
        recipient: UserId,
        payload: serde_json::Value,
    ) -> Result<(), NotifyError> {
        info!(kind = %kind, recipient = %recipient, payload = %payload, "Notification");
        Ok(())
    }
}

/// POSTs each notification as JSON to a webhook.
pub struct WebhookNotifier {
    client: reqwest::Client,
    target_url: String,
}

impl WebhookNotifier {
    pub fn new(target_url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        Ok(Self {
            client: reqwest::Client::builder().timeout(timeout).build()?,
            target_url: target_url.into(),
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    #[instrument(skip(self, payload), fields(kind = %kind, recipient = %recipient))]
    async fn send(
        &self,
        kind: NotificationKind,
        recipient: UserId,
        payload: serde_json::Value,
    ) -> Result<(), NotifyError> {
        info!("Sending {} notification to {}", kind, self.target_url);

        let envelope = json!({
            "kind": kind,
            "recipient": recipient,
            "payload": payload,
            "sent_at": Utc::now(),
        });

        let response = self
            .client
            .post(&self.target_url)
            .json(&envelope)
            .send()
            .await
            .map_err(|e| NotifyError::Delivery(e.to_string()))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(NotifyError::Rejected(response.status().as_u16()))
        }
    }
}
