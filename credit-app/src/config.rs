//! Configuration loading from environment.

use std::env;
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use rust_decimal::Decimal;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => anyhow::bail!("unknown log format {:?}, expected text or json", other),
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub sweep_interval: Duration,
    /// Fraction of a scheduled payment charged per sweep
    pub penalty_rate: Decimal,
    /// Percentage points over the base rate
    pub bank_margin: Decimal,
    pub fallback_key_rate: Decimal,
    pub rate_provider_url: Option<String>,
    pub rate_provider_timeout: Duration,
    pub notify_webhook_url: Option<String>,
    pub max_transaction_amount: Decimal,
    pub max_credit_amount: Decimal,
    pub shutdown_timeout: Duration,
    pub log_format: LogFormat,
}

/// Reads `key`, falling back to `default` when unset or blank.
fn parsed<T, F>(lookup: &F, key: &str, default: &str) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: Display,
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string());
    raw.trim()
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid {} {:?}: {}", key, raw, e))
}

fn optional<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Loads configuration from any key/value source.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = optional(&lookup, "DATABASE_URL")
            .ok_or_else(|| anyhow::anyhow!("DATABASE_URL environment variable is required"))?;

        let sweep_secs: u64 = parsed(&lookup, "SWEEP_INTERVAL_SECS", "43200")?;
        if sweep_secs == 0 {
            anyhow::bail!("SWEEP_INTERVAL_SECS must be positive");
        }

        let penalty_rate: Decimal = parsed(&lookup, "PENALTY_RATE", "0.10")?;
        if penalty_rate < Decimal::ZERO || penalty_rate > Decimal::ONE {
            anyhow::bail!("PENALTY_RATE must be a fraction between 0 and 1");
        }

        let bank_margin: Decimal = parsed(&lookup, "BANK_MARGIN", "5")?;
        let fallback_key_rate: Decimal = parsed(&lookup, "FALLBACK_KEY_RATE", "16")?;
        if bank_margin < Decimal::ZERO || fallback_key_rate < Decimal::ZERO {
            anyhow::bail!("BANK_MARGIN and FALLBACK_KEY_RATE cannot be negative");
        }

        let max_transaction_amount: Decimal =
            parsed(&lookup, "MAX_TRANSACTION_AMOUNT", "1000000000")?;
        let max_credit_amount: Decimal = parsed(&lookup, "MAX_CREDIT_AMOUNT", "100000000")?;
        if max_transaction_amount <= Decimal::ZERO || max_credit_amount <= Decimal::ZERO {
            anyhow::bail!("amount ceilings must be positive");
        }

        Ok(Self {
            database_url,
            sweep_interval: Duration::from_secs(sweep_secs),
            penalty_rate,
            bank_margin,
            fallback_key_rate,
            rate_provider_url: optional(&lookup, "RATE_PROVIDER_URL"),
            rate_provider_timeout: Duration::from_secs(parsed(
                &lookup,
                "RATE_PROVIDER_TIMEOUT_SECS",
                "5",
            )?),
            notify_webhook_url: optional(&lookup, "NOTIFY_WEBHOOK_URL"),
            max_transaction_amount,
            max_credit_amount,
            shutdown_timeout: Duration::from_secs(parsed(
                &lookup,
                "SHUTDOWN_TIMEOUT_SECS",
                "30",
            )?),
            log_format: parsed(&lookup, "LOG_FORMAT", "text")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use rust_decimal_macros::dec;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> anyhow::Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[("DATABASE_URL", "memory://")]).unwrap();

        assert_eq!(config.sweep_interval, Duration::from_secs(12 * 60 * 60));
        assert_eq!(config.penalty_rate, dec!(0.10));
        assert_eq!(config.bank_margin, dec!(5));
        assert_eq!(config.fallback_key_rate, dec!(16));
        assert_eq!(config.max_credit_amount, dec!(100000000));
        assert_eq!(config.shutdown_timeout, Duration::from_secs(30));
        assert_eq!(config.log_format, LogFormat::Text);
        assert!(config.rate_provider_url.is_none());
        assert!(config.notify_webhook_url.is_none());
    }

    #[test]
    fn test_database_url_required() {
        assert!(load(&[]).is_err());
        assert!(load(&[("DATABASE_URL", "  ")]).is_err());
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("DATABASE_URL", "sqlite://data/credit.db?mode=rwc"),
            ("SWEEP_INTERVAL_SECS", "60"),
            ("PENALTY_RATE", "0.05"),
            ("RATE_PROVIDER_URL", "http://rates.local/key-rate"),
            ("NOTIFY_WEBHOOK_URL", ""),
            ("LOG_FORMAT", "JSON"),
        ])
        .unwrap();

        assert_eq!(config.sweep_interval, Duration::from_secs(60));
        assert_eq!(config.penalty_rate, dec!(0.05));
        assert_eq!(
            config.rate_provider_url.as_deref(),
            Some("http://rates.local/key-rate")
        );
        assert!(config.notify_webhook_url.is_none());
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn test_invalid_values_rejected() {
        for (key, value) in [
            ("SWEEP_INTERVAL_SECS", "0"),
            ("SWEEP_INTERVAL_SECS", "soon"),
            ("PENALTY_RATE", "10"),
            ("PENALTY_RATE", "-0.1"),
            ("MAX_CREDIT_AMOUNT", "0"),
            ("LOG_FORMAT", "xml"),
        ] {
            assert!(
                load(&[("DATABASE_URL", "memory://"), (key, value)]).is_err(),
                "{key}={value} should be rejected"
            );
        }
    }
}
