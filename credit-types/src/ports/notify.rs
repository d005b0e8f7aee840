//! Notification dispatcher port.

use serde::{Deserialize, Serialize};

use crate::domain::UserId;

/// What a notification is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// A scheduled payment was collected
    PaymentSucceeded,
    /// A scheduled payment could not be collected and a penalty accrued
    PaymentOverdue,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::PaymentSucceeded => "payment_succeeded",
            NotificationKind::PaymentOverdue => "payment_overdue",
        }
    }
}

impl std::fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Delivery failed: {0}")]
    Delivery(String),

    #[error("Recipient rejected notification: status {0}")]
    Rejected(u16),
}

/// Outbound notifications. Callers treat delivery as best effort.
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    async fn send(
        &self,
        kind: NotificationKind,
        recipient: UserId,
        payload: serde_json::Value,
    ) -> Result<(), NotifyError>;
}
