//! Runtime configuration for the billing service.

use std::{path::PathBuf, time::Duration};

use time::{Time, macros::format_description, macros::time};

use crate::{
    Error,
    exchange_rate::{DEFAULT_BASE_URL, DEFAULT_CACHE_TTL},
};

/// The local time the daily billing run starts at by default.
pub const DEFAULT_RUN_AT: Time = time!(09:00);

/// How long to wait for the exchange rate provider before giving up.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Settings for the exchange rate provider.
#[derive(Debug, Clone, PartialEq)]
pub struct ExchangeRateConfig {
    /// The key for exchangerate-api.com, sent as part of the request path.
    pub api_key: String,
    /// The API root, without a trailing slash.
    pub base_url: String,
    /// How long a fetched rate is reused.
    pub cache_ttl: Duration,
    /// How long a single request may take.
    pub request_timeout: Duration,
}

impl Default for ExchangeRateConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: DEFAULT_BASE_URL.to_owned(),
            cache_ttl: DEFAULT_CACHE_TTL,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

/// Settings for the billing service.
#[derive(Debug, Clone, PartialEq)]
pub struct BillingConfig {
    /// File path to the application SQLite database.
    pub db_path: PathBuf,
    /// The canonical timezone, e.g. "Pacific/Auckland", that decides what
    /// "today" is.
    pub local_timezone: String,
    /// The local time of day the daily run starts.
    pub run_at: Time,
    /// Settings for the exchange rate provider.
    pub exchange_rate: ExchangeRateConfig,
}

/// Parse a time of day written as `HH:MM` in 24 hour time.
///
/// # Errors
/// Returns [Error::InvalidRunTime] if `text` is not a valid time.
pub fn parse_run_time(text: &str) -> Result<Time, Error> {
    Time::parse(text.trim(), format_description!("[hour]:[minute]"))
        .map_err(|_| Error::InvalidRunTime(text.to_owned()))
}
