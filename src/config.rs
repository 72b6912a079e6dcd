// Runtime configuration, read from the environment with defaults
use anyhow::{anyhow, Context, Result};
use std::env;
use std::time::Duration;

use crate::coordinator::DEFAULT_MAX_REQUEST_LEN;
use crate::fetcher::FixedBackoff;
use crate::models::{ChangeType, PopularityFilters};

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub api_base_url: String,
    pub page_size: usize,
    pub request_timeout_secs: u64,
    pub max_request_len: usize,
    pub retry_attempts: u32,
    pub retry_delay_ms: u64,
    pub prefetch_pages: usize,
    pub filters: PopularityFilters,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:4000/api".to_string(),
            page_size: 50,
            request_timeout_secs: 60,
            max_request_len: DEFAULT_MAX_REQUEST_LEN,
            retry_attempts: 0,
            retry_delay_ms: 250,
            prefetch_pages: 1,
            filters: PopularityFilters::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn load() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Same as [`load`](Self::load) with a custom variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let config = Self {
            api_base_url: lookup("POPULARITY_API_URL").unwrap_or(defaults.api_base_url),
            page_size: parse_or(&lookup, "POPULARITY_PAGE_SIZE", defaults.page_size)?,
            request_timeout_secs: parse_or(
                &lookup,
                "POPULARITY_REQUEST_TIMEOUT_SECS",
                defaults.request_timeout_secs,
            )?,
            max_request_len: parse_or(&lookup, "POPULARITY_MAX_REQUEST_LEN", defaults.max_request_len)?,
            retry_attempts: parse_or(&lookup, "POPULARITY_RETRY_ATTEMPTS", defaults.retry_attempts)?,
            retry_delay_ms: parse_or(&lookup, "POPULARITY_RETRY_DELAY_MS", defaults.retry_delay_ms)?,
            prefetch_pages: parse_or(&lookup, "POPULARITY_PREFETCH_PAGES", defaults.prefetch_pages)?,
            filters: PopularityFilters {
                relative: parse_or(&lookup, "POPULARITY_RELATIVE", defaults.filters.relative)?,
                hours_ago: parse_or(&lookup, "POPULARITY_HOURS_AGO", defaults.filters.hours_ago)?,
                min_popularity: parse_or(
                    &lookup,
                    "POPULARITY_MIN_POPULARITY",
                    defaults.filters.min_popularity,
                )?,
                change_type: match lookup("POPULARITY_CHANGE_TYPE") {
                    Some(raw) => raw
                        .parse::<ChangeType>()
                        .map_err(|e| anyhow!(e))
                        .context("Invalid POPULARITY_CHANGE_TYPE")?,
                    None => defaults.filters.change_type,
                },
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 {
            return Err(anyhow!("POPULARITY_PAGE_SIZE must be greater than zero"));
        }
        if self.request_timeout_secs == 0 {
            return Err(anyhow!("POPULARITY_REQUEST_TIMEOUT_SECS must be greater than zero"));
        }
        if !self.api_base_url.starts_with("http://") && !self.api_base_url.starts_with("https://") {
            return Err(anyhow!("POPULARITY_API_URL must be an http(s) URL: {}", self.api_base_url));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// `None` when retries are disabled.
    pub fn retry_policy(&self) -> Option<FixedBackoff> {
        (self.retry_attempts > 0).then(|| FixedBackoff {
            retries: self.retry_attempts,
            delay: Duration::from_millis(self.retry_delay_ms),
        })
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(name) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("Invalid {}: {:?}", name, raw)),
        None => Ok(default),
    }
}
