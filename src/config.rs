//! Service configuration read from the environment (and `.env` via dotenvy).

use crate::domain::value_objects::{Money, Pricing};
use chrono::Duration;
use std::str::FromStr;

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub database_max_connections: u32,
    pub port: u16,
    pub nats_url: Option<String>,
    pub pricing: Pricing,
    pub delivery_lead_time: Duration,
    /// Seconds between rating summary reconciliation passes; `0` disables them.
    pub rating_reconcile_secs: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("invalid value {value:?} for {key}")]
    Invalid { key: &'static str, value: String },
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?;
        let delivery_fee: i64 = parse_or(&lookup, "DELIVERY_FEE", 50)?;
        let lead_minutes: i64 = parse_or(&lookup, "DELIVERY_LEAD_MINUTES", 30)?;
        Ok(Self {
            database_url,
            database_max_connections: parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", 10)?,
            port: parse_or(&lookup, "PORT", 8083)?,
            nats_url: lookup("NATS_URL").filter(|v| !v.is_empty()),
            pricing: Pricing {
                delivery_fee: Money::new(delivery_fee),
                service_charge_percent: parse_or(&lookup, "SERVICE_CHARGE_PERCENT", 10)?,
            },
            delivery_lead_time: Duration::minutes(lead_minutes),
            rating_reconcile_secs: parse_or(&lookup, "RATING_RECONCILE_SECS", 300)?,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|_| ConfigError::Invalid { key, value }),
    }
}
