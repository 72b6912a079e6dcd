use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use popularity_changes::api_client::PopularityApiClient;
use popularity_changes::config::AppConfig;
use popularity_changes::coordinator::WindowFetchCoordinator;
use popularity_changes::models::lookback_label;
use popularity_changes::projection::{ranked, RankedRow};
use popularity_changes::screen::{
    change_column_label, format_change, format_count, Action, PopularityChangesState, WindowEffect,
};
use popularity_changes::window::Window;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "popularity_changes=info".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = AppConfig::load()?;
    info!(api = %config.api_base_url, page_size = config.page_size, "configuration loaded");

    let client = PopularityApiClient::new(&config.api_base_url, config.request_timeout())?;
    let mut cache = WindowFetchCoordinator::new(client, config.page_size)
        .with_max_request_len(config.max_request_len);
    if let Some(policy) = config.retry_policy() {
        cache = cache.with_retry_policy(policy);
    }

    let mut state = PopularityChangesState::new(config.filters.clone(), config.page_size);
    let mut effect = WindowEffect::new();

    // The count only bounds the listing, so the table still loads without it
    match cache.ensure_total(&state.filters).await {
        Ok(total) => info!(total, "total known"),
        Err(e) => warn!(error = %e, "could not load total"),
    }

    // Load the first page, then scroll through the rest like the table would
    for page in 0..config.prefetch_pages.max(1) {
        if page > 0 {
            state.update(Action::Scroll(Window::span(page * config.page_size, config.page_size)));
        }
        if let Some(request) = effect.poll(&state) {
            cache
                .ensure_window(&request.filters, request.window)
                .await
                .with_context(|| format!("Failed to load rows {}", request.window))?;
        }
    }

    match cache.project(&state.filters, state.requested_len()) {
        Some(rows) => print_table(&state, &ranked(rows)),
        None => println!("No popularity changes loaded."),
    }

    info!(requests = cache.requests_issued(), "done");
    Ok(())
}

fn print_table(state: &PopularityChangesState, rows: &[RankedRow]) {
    let filters = &state.filters;
    let lookback = lookback_label(filters.hours_ago)
        .map(str::to_string)
        .unwrap_or_else(|| format!("{} Hours", filters.hours_ago));

    println!(
        "Popularity Changes | {} | {} | min popularity {}",
        lookback,
        filters.change_type.label(),
        filters.min_popularity
    );
    println!(
        "{:>6}  {:<8} {:>14} {:>12} {:>12}",
        "#",
        "Symbol",
        change_column_label(filters.relative),
        "Start",
        "End"
    );

    for row in rows {
        println!(
            "{:>6}  {:<8} {:>14} {:>12} {:>12}",
            format_count(row.rank as i64),
            row.change.symbol,
            format_change(row.change.popularity_difference, filters.relative),
            format_count(row.change.start_popularity),
            format_count(row.change.end_popularity)
        );
    }
}
