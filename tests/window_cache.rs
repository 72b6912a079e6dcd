//! End-to-end scroll session against an in-memory data source.

use async_trait::async_trait;
use std::sync::Mutex;

use popularity_changes::screen::{Action, PopularityChangesState, WindowEffect};
use popularity_changes::{
    ChangeType, FetchError, FetchedPage, PopularityChange, PopularityFilters, RangeFetcher, Window,
    WindowFetchCoordinator,
};

struct Catalog {
    size: usize,
    requests: Mutex<Vec<(ChangeType, usize, usize)>>,
}

impl Catalog {
    fn new(size: usize) -> Self {
        Self {
            size,
            requests: Mutex::new(Vec::new()),
        }
    }

    fn requests(&self) -> Vec<(ChangeType, usize, usize)> {
        let mut requests = self.requests.lock().unwrap().clone();
        requests.sort_by_key(|(c, start, _)| (c.suffix(), *start));
        requests
    }
}

#[async_trait]
impl RangeFetcher for Catalog {
    async fn fetch_range(
        &self,
        filters: &PopularityFilters,
        start: usize,
        limit: usize,
    ) -> Result<FetchedPage, FetchError> {
        self.requests
            .lock()
            .unwrap()
            .push((filters.change_type, start, limit));
        let stop = (start + limit).min(self.size);
        let records = (start..stop)
            .map(|i| PopularityChange {
                index: 0,
                symbol: format!("{}{}", filters.change_type.suffix(), i),
                start_popularity: 500,
                end_popularity: 500 + i as i64,
                popularity_difference: i as f64,
            })
            .collect();
        Ok(FetchedPage::new(records))
    }

    async fn fetch_total(&self, _filters: &PopularityFilters) -> Result<usize, FetchError> {
        Ok(self.size)
    }
}

async fn run_effect(
    cache: &WindowFetchCoordinator<Catalog>,
    effect: &mut WindowEffect,
    state: &PopularityChangesState,
) {
    if let Some(request) = effect.poll(state) {
        cache
            .ensure_window(&request.filters, request.window)
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn scrolling_and_filtering_fetch_each_row_once() {
    let cache = WindowFetchCoordinator::new(Catalog::new(120), 50);
    let mut state = PopularityChangesState::new(PopularityFilters::default(), 50);
    let mut effect = WindowEffect::new();

    assert!(cache.project(&state.filters, state.requested_len()).is_none());

    run_effect(&cache, &mut effect, &state).await;
    run_effect(&cache, &mut effect, &state).await;
    assert_eq!(
        cache.project(&state.filters, state.requested_len()).map(|r| r.len()),
        Some(50)
    );

    state.update(Action::Scroll(Window::new(25, 75).unwrap()));
    run_effect(&cache, &mut effect, &state).await;
    state.update(Action::Scroll(Window::new(75, 150).unwrap()));
    run_effect(&cache, &mut effect, &state).await;

    let rows = cache.project(&state.filters, state.requested_len()).unwrap();
    assert_eq!(rows.len(), 120);
    assert_eq!(rows[119].symbol, "changes119");

    state.update(Action::SetChangeType(ChangeType::Increases));
    assert!(cache.project(&state.filters, state.requested_len()).is_none());
    run_effect(&cache, &mut effect, &state).await;
    assert_eq!(
        cache
            .project(&state.filters, state.requested_len())
            .map(|r| r[0].symbol.clone()),
        Some("increases0".to_string())
    );

    assert_eq!(
        cache.fetcher().requests(),
        vec![
            (ChangeType::Changes, 0, 50),
            (ChangeType::Changes, 50, 25),
            (ChangeType::Changes, 75, 75),
            (ChangeType::Increases, 0, 50),
        ]
    );
}

#[tokio::test]
async fn negative_windows_never_reach_the_data_source() {
    let cache = WindowFetchCoordinator::new(Catalog::new(10), 50);
    assert!(cache
        .ensure_loaded(&PopularityFilters::default(), -10, 10)
        .await
        .is_err());
    assert!(cache.fetcher().requests().is_empty());
}
