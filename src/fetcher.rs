use async_trait::async_trait;
use std::time::Duration;

use crate::error::FetchError;
use crate::models::{FetchedPage, PopularityFilters};

/// The remote data service the cache loads from.
#[async_trait]
pub trait RangeFetcher: Send + Sync + 'static {
    /// Up to `limit` records starting at absolute index `start`.
    async fn fetch_range(
        &self,
        filters: &PopularityFilters,
        start: usize,
        limit: usize,
    ) -> Result<FetchedPage, FetchError>;

    /// Total number of records for `filters`.
    async fn fetch_total(&self, filters: &PopularityFilters) -> Result<usize, FetchError>;
}

/// Decides whether a failed request is repeated.
pub trait RetryPolicy: Send + Sync + 'static {
    /// `attempt` counts failures so far, starting at 1. `None` gives up.
    fn backoff(&self, attempt: u32, error: &FetchError) -> Option<Duration>;
}

/// Fail on the first error.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRetry;

impl RetryPolicy for NoRetry {
    fn backoff(&self, _attempt: u32, _error: &FetchError) -> Option<Duration> {
        None
    }
}

/// Retry transient errors up to `retries` times with a constant delay.
#[derive(Debug, Clone, Copy)]
pub struct FixedBackoff {
    pub retries: u32,
    pub delay: Duration,
}

impl RetryPolicy for FixedBackoff {
    fn backoff(&self, attempt: u32, error: &FetchError) -> Option<Duration> {
        if attempt <= self.retries && error.is_transient() {
            Some(self.delay)
        } else {
            None
        }
    }
}
