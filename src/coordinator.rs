//! Loads requested windows into the page store.
//!
//! A request is reduced to the gaps the store does not hold yet. Gaps that
//! are already being fetched are awaited rather than requested again; the
//! rest are fetched as spawned tasks that merge into the store when they
//! finish, whether or not the caller is still waiting.

use futures::future::{join_all, BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::config_key::{normalize, ConfigKey};
use crate::error::{CacheError, FetchError};
use crate::fetcher::{NoRetry, RangeFetcher, RetryPolicy};
use crate::models::{FetchedPage, PopularityChange, PopularityFilters};
use crate::page_store::{EntryStats, PageStore};
use crate::projection;
use crate::window::Window;

type SharedLoad = Shared<BoxFuture<'static, Result<(), CacheError>>>;
type SharedTotal = Shared<BoxFuture<'static, Result<usize, CacheError>>>;

pub const DEFAULT_MAX_REQUEST_LEN: usize = 500;

/// Upper bound on new requests started by one planning round.
pub const MAX_REQUESTS_PER_ROUND: usize = 32;

#[derive(Default)]
struct CacheState {
    store: PageStore,
    in_flight: HashMap<ConfigKey, Vec<(Window, SharedLoad)>>,
    totals_in_flight: HashMap<ConfigKey, SharedTotal>,
}

impl CacheState {
    fn finish_flight(&mut self, key: &ConfigKey, window: Window) {
        if let Some(flights) = self.in_flight.get_mut(key) {
            flights.retain(|(w, _)| *w != window);
            if flights.is_empty() {
                self.in_flight.remove(key);
            }
        }
    }

    fn apply_page(&mut self, key: &ConfigKey, window: Window, page: FetchedPage) {
        let FetchedPage { mut records, total } = page;
        let received = records.len();
        records.truncate(window.len());
        self.store.merge(key, window.start(), records);

        if let Some(total) = total {
            self.store.set_total(key, total);
        }
        if received < window.len() {
            let end = window.start() + received;
            debug!(key = %key.fingerprint(), end, "short page marks end of data");
            self.store.mark_end(key, end);
        }
    }
}

fn lock_state(state: &Mutex<CacheState>) -> MutexGuard<'_, CacheState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Config-keyed window cache in front of a [`RangeFetcher`].
///
/// Cheap to clone; clones share the same store and in-flight requests.
pub struct WindowFetchCoordinator<F: RangeFetcher> {
    fetcher: Arc<F>,
    retry: Arc<dyn RetryPolicy>,
    state: Arc<Mutex<CacheState>>,
    page_size: usize,
    max_request_len: usize,
    requests: Arc<AtomicU64>,
}

impl<F: RangeFetcher> Clone for WindowFetchCoordinator<F> {
    fn clone(&self) -> Self {
        Self {
            fetcher: Arc::clone(&self.fetcher),
            retry: Arc::clone(&self.retry),
            state: Arc::clone(&self.state),
            page_size: self.page_size,
            max_request_len: self.max_request_len,
            requests: Arc::clone(&self.requests),
        }
    }
}

impl<F: RangeFetcher> WindowFetchCoordinator<F> {
    pub fn new(fetcher: F, page_size: usize) -> Self {
        Self {
            fetcher: Arc::new(fetcher),
            retry: Arc::new(NoRetry),
            state: Arc::new(Mutex::new(CacheState::default())),
            page_size,
            max_request_len: DEFAULT_MAX_REQUEST_LEN,
            requests: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn with_retry_policy(mut self, policy: impl RetryPolicy) -> Self {
        self.retry = Arc::new(policy);
        self
    }

    /// Gaps longer than this are split into several requests. Zero disables splitting.
    pub fn with_max_request_len(mut self, max_request_len: usize) -> Self {
        self.max_request_len = max_request_len;
        self
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    pub fn key_for(&self, filters: &PopularityFilters) -> ConfigKey {
        normalize(filters, self.page_size)
    }

    /// Number of requests sent to the fetcher so far, retries included.
    pub fn requests_issued(&self) -> u64 {
        self.requests.load(Ordering::SeqCst)
    }

    pub fn in_flight_count(&self) -> usize {
        let state = lock_state(&self.state);
        state.in_flight.values().map(Vec::len).sum::<usize>() + state.totals_in_flight.len()
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        lock_state(&self.state)
    }

    /// Makes `[start, stop)` available for `filters`.
    ///
    /// Negative or inverted ranges are rejected before anything is fetched.
    /// A `stop` past the end of the data is fine: loading stops at the first
    /// short page. Fails with the first fetch error; records merged by other
    /// gaps of the same call stay in the store.
    pub async fn ensure_loaded(
        &self,
        filters: &PopularityFilters,
        start: i64,
        stop: i64,
    ) -> Result<(), CacheError> {
        let window = Window::from_signed(start, stop)?;
        self.ensure_window(filters, window).await
    }

    pub async fn ensure_window(
        &self,
        filters: &PopularityFilters,
        window: Window,
    ) -> Result<(), CacheError> {
        let key = self.key_for(filters);
        // Each round either merges records or moves the end of data below
        // the remaining gaps, so the loop ends once the window is covered.
        let mut rounds = 0;
        loop {
            let waits = self.plan(&key, filters, window);
            if waits.is_empty() {
                if rounds == 0 {
                    debug!(key = %key.fingerprint(), %window, "window already cached");
                }
                return Ok(());
            }
            for result in join_all(waits).await {
                result?;
            }
            rounds += 1;
        }
    }

    fn plan(&self, key: &ConfigKey, filters: &PopularityFilters, window: Window) -> Vec<SharedLoad> {
        let mut state = self.lock();
        let gaps = state.store.missing(key, window);
        if gaps.is_empty() {
            return Vec::new();
        }

        let flights = state.in_flight.entry(key.clone()).or_default();
        let pending: Vec<Window> = flights.iter().map(|(w, _)| *w).collect();
        let mut waits: Vec<SharedLoad> = flights
            .iter()
            .filter(|(w, _)| gaps.iter().any(|g| g.overlaps(w)))
            .map(|(_, load)| load.clone())
            .collect();

        let fresh: Vec<Window> = gaps
            .iter()
            .flat_map(|gap| gap.subtract(&pending))
            .flat_map(|gap| gap.chunks(self.max_request_len))
            .take(MAX_REQUESTS_PER_ROUND)
            .collect();

        debug!(
            key = %key.fingerprint(),
            %window,
            gaps = gaps.len(),
            joined = waits.len(),
            fresh = fresh.len(),
            "planned window load"
        );

        for chunk in fresh {
            let load = self.spawn_fetch(key.clone(), filters.clone(), chunk);
            flights.push((chunk, load.clone()));
            waits.push(load);
        }
        waits
    }

    fn spawn_fetch(&self, key: ConfigKey, filters: PopularityFilters, window: Window) -> SharedLoad {
        let fetcher = Arc::clone(&self.fetcher);
        let retry = Arc::clone(&self.retry);
        let state = Arc::clone(&self.state);
        let requests = Arc::clone(&self.requests);
        let task_key = key.clone();

        let handle = tokio::spawn(async move {
            let key = task_key;
            let mut attempt = 0;
            let result = loop {
                requests.fetch_add(1, Ordering::SeqCst);
                match fetcher.fetch_range(&filters, window.start(), window.len()).await {
                    Ok(page) => break Ok(page),
                    Err(e) => {
                        attempt += 1;
                        match retry.backoff(attempt, &e) {
                            Some(delay) => {
                                warn!(key = %key.fingerprint(), %window, attempt, error = %e, "retrying range fetch");
                                tokio::time::sleep(delay).await;
                            }
                            None => break Err(e),
                        }
                    }
                }
            };

            let mut state = lock_state(&state);
            state.finish_flight(&key, window);
            match result {
                Ok(page) => {
                    state.apply_page(&key, window, page);
                    Ok(())
                }
                Err(e) => {
                    warn!(key = %key.fingerprint(), %window, error = %e, "range fetch failed");
                    Err(fetch_failed(&key, window, &e))
                }
            }
        });

        let state = Arc::clone(&self.state);
        async move {
            match handle.await {
                Ok(result) => result,
                Err(join_error) => {
                    lock_state(&state).finish_flight(&key, window);
                    Err(CacheError::FetchFailed {
                        key: key.to_string(),
                        window,
                        message: join_error.to_string(),
                    })
                }
            }
        }
        .boxed()
        .shared()
    }

    /// Known total for `filters`, asking the count API once if it is unknown.
    pub async fn ensure_total(&self, filters: &PopularityFilters) -> Result<usize, CacheError> {
        let key = self.key_for(filters);
        let load = {
            let mut state = self.lock();
            if let Some(total) = state.store.total(&key) {
                return Ok(total);
            }
            if let Some(load) = state.totals_in_flight.get(&key).cloned() {
                load
            } else {
                let load = self.spawn_total(key.clone(), filters.clone());
                state.totals_in_flight.insert(key, load.clone());
                load
            }
        };
        load.await
    }

    fn spawn_total(&self, key: ConfigKey, filters: PopularityFilters) -> SharedTotal {
        let fetcher = Arc::clone(&self.fetcher);
        let retry = Arc::clone(&self.retry);
        let state = Arc::clone(&self.state);
        let requests = Arc::clone(&self.requests);
        let task_key = key.clone();

        let handle = tokio::spawn(async move {
            let key = task_key;
            let mut attempt = 0;
            let result = loop {
                requests.fetch_add(1, Ordering::SeqCst);
                match fetcher.fetch_total(&filters).await {
                    Ok(total) => break Ok(total),
                    Err(e) => {
                        attempt += 1;
                        match retry.backoff(attempt, &e) {
                            Some(delay) => {
                                warn!(key = %key.fingerprint(), attempt, error = %e, "retrying total lookup");
                                tokio::time::sleep(delay).await;
                            }
                            None => break Err(e),
                        }
                    }
                }
            };

            let mut state = lock_state(&state);
            state.totals_in_flight.remove(&key);
            match result {
                Ok(reported) => {
                    state.store.set_total(&key, reported);
                    let total = state.store.total(&key).unwrap_or(reported);
                    info!(key = %key.fingerprint(), reported, total, "total discovered");
                    Ok(total)
                }
                Err(e) => {
                    warn!(key = %key.fingerprint(), error = %e, "total lookup failed");
                    Err(CacheError::TotalFailed {
                        key: key.to_string(),
                        message: e.to_string(),
                    })
                }
            }
        });

        let state = Arc::clone(&self.state);
        async move {
            match handle.await {
                Ok(result) => result,
                Err(join_error) => {
                    lock_state(&state).totals_in_flight.remove(&key);
                    Err(CacheError::TotalFailed {
                        key: key.to_string(),
                        message: join_error.to_string(),
                    })
                }
            }
        }
        .boxed()
        .shared()
    }

    /// Contiguous prefix from index 0 for `filters`, at most `requested` long.
    pub fn project(&self, filters: &PopularityFilters, requested: usize) -> Option<Vec<PopularityChange>> {
        let key = self.key_for(filters);
        projection::project(&self.lock().store, &key, requested)
    }

    /// Runs `f` against the current store contents.
    pub fn with_store<R>(&self, f: impl FnOnce(&PageStore) -> R) -> R {
        f(&self.lock().store)
    }

    pub fn snapshot(&self) -> PageStore {
        self.lock().store.clone()
    }

    pub fn stats(&self, filters: &PopularityFilters) -> Option<EntryStats> {
        let key = self.key_for(filters);
        self.lock().store.stats(&key)
    }
}

fn fetch_failed(key: &ConfigKey, window: Window, error: &FetchError) -> CacheError {
    CacheError::FetchFailed {
        key: key.to_string(),
        window,
        message: error.to_string(),
    }
}
