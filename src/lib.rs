//! Windowed, config-keyed cache for the popularity changes table.
//!
//! The table asks for row windows as the user scrolls; the cache fetches only
//! the rows it does not already hold for the current filters and exposes the
//! gap-free prefix ready to render.

pub mod api_client;
pub mod config;
pub mod config_key;
pub mod coordinator;
pub mod error;
pub mod fetcher;
pub mod models;
pub mod page_store;
pub mod projection;
pub mod screen;
pub mod window;

#[cfg(test)]
pub(crate) mod testing;

pub use config_key::{normalize, ConfigKey};
pub use coordinator::WindowFetchCoordinator;
pub use error::{CacheError, FetchError};
pub use fetcher::{FixedBackoff, NoRetry, RangeFetcher, RetryPolicy};
pub use models::{ChangeType, FetchedPage, PopularityChange, PopularityFilters};
pub use page_store::{PageStore, Slice};
pub use projection::project;
pub use window::Window;
