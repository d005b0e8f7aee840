//! Base interest rate provider port.
//!
//! Implementations can be HTTP clients, fixed values, test doubles, etc.

use rust_decimal::Decimal;

/// Error type for rate lookups.
#[derive(Debug, thiserror::Error)]
pub enum RateError {
    #[error("Rate provider timed out")]
    Timeout,

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Malformed rate response: {0}")]
    Malformed(String),
}

/// Port trait for the base (key) rate source.
#[async_trait::async_trait]
pub trait RateProvider: Send + Sync {
    /// Current base annual rate in percent (e.g. `16` for 16 %).
    async fn annual_rate(&self) -> Result<Decimal, RateError>;
}
