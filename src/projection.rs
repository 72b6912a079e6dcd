use crate::config_key::ConfigKey;
use crate::models::PopularityChange;
use crate::page_store::PageStore;

/// Rows ready to render: the longest gap-free run from index 0, capped at
/// `requested`. `None` until index 0 has been stored, which the screen shows
/// as a loading indicator.
pub fn project(store: &PageStore, key: &ConfigKey, requested: usize) -> Option<Vec<PopularityChange>> {
    if !store.contains_index(key, 0) {
        return None;
    }
    let len = store.prefix_len(key).min(requested);
    Some(store.prefix(key, len))
}

/// A projected row with its 1-based position in the table.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedRow {
    pub rank: usize,
    pub change: PopularityChange,
}

pub fn ranked(rows: Vec<PopularityChange>) -> Vec<RankedRow> {
    rows.into_iter()
        .map(|change| RankedRow {
            rank: change.index + 1,
            change,
        })
        .collect()
}
