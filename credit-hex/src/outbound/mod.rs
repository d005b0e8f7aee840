//! Outbound adapters for the collaborator ports.

mod notify;
mod rates;

pub use notify::{LogNotifier, WebhookNotifier};
pub use rates::{FixedRateProvider, HttpRateProvider, parse_key_rate};
