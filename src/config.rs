//! Form configuration
//!
//! Defaults match the hosted form; every value can be overridden from the
//! environment (or a `.env` file).

use crate::error::ExpenseError;
use crate::intake::MAX_RECEIPT_BYTES;
use crate::Result;
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct FormConfig {
    /// Largest accepted receipt, in bytes
    pub max_receipt_bytes: u64,
    /// Simulated OCR processing time
    pub extraction_latency: Duration,
    /// Simulated backend round trip, used when no API is configured
    pub submit_delay: Duration,
    /// When set, submissions go to this expense API instead of the simulator
    pub api_base_url: Option<String>,
    /// Owner recorded on submitted expenses
    pub owner_id: Uuid,
    /// Clear the form after a successful submission
    pub reset_on_success: bool,
}

impl Default for FormConfig {
    fn default() -> Self {
        Self {
            max_receipt_bytes: MAX_RECEIPT_BYTES,
            extraction_latency: Duration::from_millis(1500),
            submit_delay: Duration::from_millis(2000),
            api_base_url: None,
            owner_id: Uuid::nil(),
            reset_on_success: false,
        }
    }
}

impl FormConfig {
    /// Load `.env` if present, then read `EXPENSE_*` variables
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unset keys keep their defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(bytes) = parse_var::<u64, _>(&lookup, "EXPENSE_MAX_RECEIPT_BYTES")? {
            config.max_receipt_bytes = bytes;
        }
        if let Some(ms) = parse_var::<u64, _>(&lookup, "EXPENSE_EXTRACTION_LATENCY_MS")? {
            config.extraction_latency = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_var::<u64, _>(&lookup, "EXPENSE_SUBMIT_DELAY_MS")? {
            config.submit_delay = Duration::from_millis(ms);
        }
        if let Some(owner) = parse_var::<Uuid, _>(&lookup, "EXPENSE_OWNER_ID")? {
            config.owner_id = owner;
        }
        if let Some(reset) = parse_var::<bool, _>(&lookup, "EXPENSE_RESET_ON_SUCCESS")? {
            config.reset_on_success = reset;
        }

        config.api_base_url = lookup("EXPENSE_API_BASE_URL")
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty());

        Ok(config)
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ExpenseError::Config(format!("{} = {:?}: {}", key, raw, e))),
    }
}
