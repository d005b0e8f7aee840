//! Base rate providers.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{debug, instrument};

use credit_types::{RateError, RateProvider};

/// Always answers with the same rate.
#[derive(Debug, Clone, Copy)]
pub struct FixedRateProvider {
    rate: Decimal,
}

impl FixedRateProvider {
    pub fn new(rate: Decimal) -> Self {
        Self { rate }
    }
}

#[async_trait]
impl RateProvider for FixedRateProvider {
    async fn annual_rate(&self) -> Result<Decimal, RateError> {
        Ok(self.rate)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RateValue {
    Number(serde_json::Number),
    Text(String),
}

#[derive(Deserialize)]
struct KeyRateBody {
    key_rate: RateValue,
}

/// Parses `{"key_rate": 16.0}` or `{"key_rate": "16.00"}`.
///
/// A rate must lie in `[0, 100]` percent.
pub fn parse_key_rate(body: &str) -> Result<Decimal, RateError> {
    let parsed: KeyRateBody =
        serde_json::from_str(body).map_err(|e| RateError::Malformed(e.to_string()))?;

    let text = match parsed.key_rate {
        RateValue::Number(n) => n.to_string(),
        RateValue::Text(s) => s.trim().to_string(),
    };
    let rate = Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .map_err(|e| RateError::Malformed(format!("{}: {}", text, e)))?;

    if rate < Decimal::ZERO || rate > Decimal::ONE_HUNDRED {
        return Err(RateError::Malformed(format!("rate {} out of range", rate)));
    }
    Ok(rate)
}

/// Fetches the base rate from a JSON endpoint.
pub struct HttpRateProvider {
    client: reqwest::Client,
    url: String,
}

impl HttpRateProvider {
    pub fn new(url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

fn transport_error(e: reqwest::Error) -> RateError {
    if e.is_timeout() {
        RateError::Timeout
    } else {
        RateError::ServiceUnavailable(e.to_string())
    }
}

#[async_trait]
impl RateProvider for HttpRateProvider {
    #[instrument(skip(self), fields(url = %self.url))]
    async fn annual_rate(&self) -> Result<Decimal, RateError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(RateError::ServiceUnavailable(format!("HTTP {}", status)));
        }

        let body = response.text().await.map_err(transport_error)?;
        let rate = parse_key_rate(&body)?;
        debug!(rate = %rate, "Fetched base rate");
        Ok(rate)
    }
}
