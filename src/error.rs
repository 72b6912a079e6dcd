use thiserror::Error;

use crate::window::Window;

/// Errors surfaced to callers of the window cache.
///
/// Cloneable so a single in-flight request can report the same outcome to
/// every caller waiting on it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    /// Rejected before any request is issued
    #[error("invalid range [{start}, {stop})")]
    InvalidRange { start: i64, stop: i64 },

    /// A range request failed after any retries
    #[error("fetch failed for {key} {window}: {message}")]
    FetchFailed {
        key: String,
        window: Window,
        message: String,
    },

    /// The count request failed
    #[error("total lookup failed for {key}: {message}")]
    TotalFailed { key: String, message: String },
}

impl CacheError {
    pub fn is_fetch_failure(&self) -> bool {
        matches!(self, CacheError::FetchFailed { .. } | CacheError::TotalFailed { .. })
    }
}

/// Errors produced by a [`RangeFetcher`](crate::fetcher::RangeFetcher).
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API returned status {status} for {url}")]
    Status { status: u16, url: String },

    #[error("failed to decode API response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("data source unavailable: {0}")]
    Unavailable(String),
}

impl FetchError {
    /// Whether repeating the same request could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            FetchError::Status { status, .. } => *status >= 500 || *status == 429,
            FetchError::Decode(_) => false,
            FetchError::Unavailable(_) => true,
        }
    }
}
