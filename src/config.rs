use std::time::Duration;

use crate::client::{ClientOptions, Pagination};
use crate::error::{Error, Result};
use crate::retry::RetryPolicy;

pub const ENV_URL: &str = "EA_API_URL";
pub const ENV_KEY: &str = "EA_API_KEY";
pub const ENV_MAX_PAGES: &str = "EA_MAX_PAGES";
pub const ENV_PAGE_SIZE: &str = "EA_PAGE_SIZE";
pub const ENV_PAGINATION: &str = "EA_PAGINATION";
pub const ENV_MIN_INTERVAL_MS: &str = "EA_MIN_INTERVAL_MS";
pub const ENV_MAX_ATTEMPTS: &str = "EA_MAX_ATTEMPTS";

impl ClientOptions {
    /// Defaults overridden by `EA_*` environment variables.
    ///
    /// Meant for process entry points; the library itself never reads the
    /// environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut opts = ClientOptions::default();
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(url) = get(ENV_URL) {
            opts.source = url;
        }
        if let Some(key) = get(ENV_KEY) {
            opts.api_key = Some(key);
        }
        if let Some(v) = get(ENV_MAX_PAGES) {
            opts.max_pages = parse_number(ENV_MAX_PAGES, &v)?;
        }
        if let Some(v) = get(ENV_PAGE_SIZE) {
            opts.page_size = parse_number(ENV_PAGE_SIZE, &v)?;
        }
        if let Some(v) = get(ENV_PAGINATION) {
            opts.pagination = match v.to_ascii_lowercase().as_str() {
                "cursor" => Pagination::Cursor,
                "offset" => Pagination::Offset,
                other => {
                    return Err(Error::InvalidConfig(format!(
                        "{ENV_PAGINATION} must be cursor or offset, got {other}"
                    )));
                }
            };
        }
        if let Some(v) = get(ENV_MIN_INTERVAL_MS) {
            opts.min_request_interval = Duration::from_millis(parse_number(ENV_MIN_INTERVAL_MS, &v)?);
        }
        if let Some(v) = get(ENV_MAX_ATTEMPTS) {
            opts.retry = RetryPolicy::with_max_attempts(parse_number(ENV_MAX_ATTEMPTS, &v)?);
        }

        Ok(opts)
    }
}

fn parse_number<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| Error::InvalidConfig(format!("{name} must be a non-negative integer, got {value}")))
}
