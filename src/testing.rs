//! In-memory data source for tests.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::error::FetchError;
use crate::fetcher::RangeFetcher;
use crate::models::{FetchedPage, PopularityChange, PopularityFilters};
use crate::window::Window;

pub(crate) fn records(start: usize, len: usize) -> Vec<PopularityChange> {
    (start..start + len)
        .map(|i| PopularityChange {
            index: 0,
            symbol: format!("SYM{}", i),
            start_popularity: 1_000 + i as i64,
            end_popularity: 1_000 + 2 * i as i64,
            popularity_difference: i as f64,
        })
        .collect()
}

/// Serves `available` synthetic records and logs every request it sees.
pub(crate) struct ScriptedFetcher {
    available: usize,
    report_total: bool,
    failing_starts: Mutex<HashSet<usize>>,
    transient_failures: AtomicU32,
    delays: HashMap<usize, Duration>,
    count_reply: Option<(usize, Duration)>,
    range_calls: Mutex<Vec<(PopularityFilters, Window)>>,
    total_calls: AtomicU32,
}

impl ScriptedFetcher {
    pub(crate) fn new(available: usize) -> Self {
        Self {
            available,
            report_total: false,
            failing_starts: Mutex::new(HashSet::new()),
            transient_failures: AtomicU32::new(0),
            delays: HashMap::new(),
            count_reply: None,
            range_calls: Mutex::new(Vec::new()),
            total_calls: AtomicU32::new(0),
        }
    }

    /// Include `total` in range responses.
    pub(crate) fn reporting_total(mut self) -> Self {
        self.report_total = true;
        self
    }

    /// Requests starting at `start` fail until [`heal`](Self::heal) is called.
    pub(crate) fn fail_at(self, start: usize) -> Self {
        self.failing_starts.lock().unwrap().insert(start);
        self
    }

    /// The next `count` range requests fail with a transient error.
    pub(crate) fn flaky(self, count: u32) -> Self {
        self.transient_failures.store(count, Ordering::SeqCst);
        self
    }

    /// Requests starting at `start` answer only after `delay`.
    pub(crate) fn delay_at(mut self, start: usize, delay: Duration) -> Self {
        self.delays.insert(start, delay);
        self
    }

    /// The count API answers `total` after `delay`, whatever the data holds.
    pub(crate) fn counting(mut self, total: usize, delay: Duration) -> Self {
        self.count_reply = Some((total, delay));
        self
    }

    pub(crate) fn heal(&self) {
        self.failing_starts.lock().unwrap().clear();
    }

    /// Requested windows, sorted; spawned requests may run in any order.
    pub(crate) fn range_calls(&self) -> Vec<Window> {
        let mut calls: Vec<Window> = self.range_calls.lock().unwrap().iter().map(|(_, w)| *w).collect();
        calls.sort();
        calls
    }

    pub(crate) fn range_calls_for(&self, filters: &PopularityFilters) -> Vec<Window> {
        self.range_calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(f, _)| f == filters)
            .map(|(_, w)| *w)
            .collect()
    }

    pub(crate) fn total_calls(&self) -> u32 {
        self.total_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RangeFetcher for ScriptedFetcher {
    async fn fetch_range(
        &self,
        filters: &PopularityFilters,
        start: usize,
        limit: usize,
    ) -> Result<FetchedPage, FetchError> {
        self.range_calls
            .lock()
            .unwrap()
            .push((filters.clone(), Window::span(start, limit)));

        if let Some(delay) = self.delays.get(&start) {
            tokio::time::sleep(*delay).await;
        }
        if self.failing_starts.lock().unwrap().contains(&start) {
            return Err(FetchError::Status {
                status: 500,
                url: format!("scripted://range?start_index={}", start),
            });
        }
        let flaky = self
            .transient_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if flaky {
            return Err(FetchError::Unavailable("scripted outage".into()));
        }

        let stop = (start + limit).min(self.available);
        let len = stop.saturating_sub(start);
        let page = FetchedPage::new(records(start, len));
        Ok(if self.report_total {
            page.with_total(self.available)
        } else {
            page
        })
    }

    async fn fetch_total(&self, _filters: &PopularityFilters) -> Result<usize, FetchError> {
        self.total_calls.fetch_add(1, Ordering::SeqCst);
        match self.count_reply {
            Some((total, delay)) => {
                tokio::time::sleep(delay).await;
                Ok(total)
            }
            None => Ok(self.available),
        }
    }
}
