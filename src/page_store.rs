use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

use crate::config_key::ConfigKey;
use crate::models::PopularityChange;
use crate::window::Window;

/// Sparse records for one config key.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    records: BTreeMap<usize, PopularityChange>,
    total: Option<usize>,
    // Set once a short page has shown where the data ends
    end_seen: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CacheEntry {
    fn new() -> Self {
        let now = Utc::now();
        Self {
            records: BTreeMap::new(),
            total: None,
            end_seen: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn total(&self) -> Option<usize> {
        self.total
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Runs of consecutive stored indices, ascending.
    pub fn present_ranges(&self) -> Vec<Window> {
        let mut ranges: Vec<Window> = Vec::new();
        for &index in self.records.keys() {
            match ranges.last_mut() {
                Some(last) if last.stop() == index => *last = Window::raw(last.start(), index + 1),
                _ => ranges.push(Window::raw(index, index + 1)),
            }
        }
        ranges
    }

    fn missing(&self, window: Window) -> Vec<Window> {
        let window = window.clamp_to_total(self.total);
        let mut gaps = Vec::new();
        let mut cursor = window.start();
        for &index in self.records.range(window.start()..window.stop()).map(|(i, _)| i) {
            if index > cursor {
                gaps.push(Window::raw(cursor, index));
            }
            cursor = index + 1;
        }
        if cursor < window.stop() {
            gaps.push(Window::raw(cursor, window.stop()));
        }
        gaps
    }

    fn update_total(&mut self, total: usize) {
        if self.total != Some(total) {
            self.total = Some(total);
            self.updated_at = Utc::now();
        }
    }

    fn prefix_len(&self) -> usize {
        let mut len = 0;
        for &index in self.records.keys() {
            if index != len {
                break;
            }
            len += 1;
        }
        len
    }
}

/// Result of reading a window from the store.
#[derive(Debug, Clone, PartialEq)]
pub enum Slice {
    /// Every index of the window (clamped to a known total) is present.
    Complete(Vec<PopularityChange>),
    /// Some indices are still missing. `prefix` is the contiguous run stored
    /// from the window start.
    Partial {
        prefix: Vec<PopularityChange>,
        missing: Vec<Window>,
    },
}

impl Slice {
    pub fn is_complete(&self) -> bool {
        matches!(self, Slice::Complete(_))
    }
}

/// Per-key summary for logs and diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryStats {
    pub records: usize,
    pub total: Option<usize>,
    pub ranges: Vec<Window>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fetched records for every config key seen this session.
///
/// Entries are created on first write and never evicted; entries for keys the
/// screen no longer uses are simply never read again.
#[derive(Debug, Default, Clone)]
pub struct PageStore {
    entries: HashMap<ConfigKey, CacheEntry>,
}

impl PageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entry(&self, key: &ConfigKey) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    pub fn key_count(&self) -> usize {
        self.entries.len()
    }

    pub fn total(&self, key: &ConfigKey) -> Option<usize> {
        self.entries.get(key).and_then(|e| e.total)
    }

    pub fn contains_index(&self, key: &ConfigKey, index: usize) -> bool {
        self.entries
            .get(key)
            .map(|e| e.records.contains_key(&index))
            .unwrap_or(false)
    }

    /// True iff every index of `window` is present. Indices past a known
    /// total count as present.
    pub fn has(&self, key: &ConfigKey, window: Window) -> bool {
        self.missing(key, window).is_empty()
    }

    /// Sub-ranges of `window` (clamped to a known total) not yet stored.
    pub fn missing(&self, key: &ConfigKey, window: Window) -> Vec<Window> {
        match self.entries.get(key) {
            Some(entry) => entry.missing(window),
            None if window.is_empty() => Vec::new(),
            None => vec![window],
        }
    }

    pub fn get(&self, key: &ConfigKey, window: Window) -> Slice {
        let Some(entry) = self.entries.get(key) else {
            return if window.is_empty() {
                Slice::Complete(Vec::new())
            } else {
                Slice::Partial {
                    prefix: Vec::new(),
                    missing: vec![window],
                }
            };
        };

        let clamped = window.clamp_to_total(entry.total);
        let missing = entry.missing(clamped);
        let mut prefix = Vec::with_capacity(clamped.len());
        for index in clamped.start()..clamped.stop() {
            match entry.records.get(&index) {
                Some(record) => prefix.push(record.clone()),
                None => break,
            }
        }

        if missing.is_empty() {
            Slice::Complete(prefix)
        } else {
            Slice::Partial { prefix, missing }
        }
    }

    /// Stores `records` at consecutive indices from `start`.
    ///
    /// Indices already present are left untouched, so repeating a merge is a
    /// no-op and disjoint merges commute. Returns how many records were new.
    pub fn merge(&mut self, key: &ConfigKey, start: usize, records: Vec<PopularityChange>) -> usize {
        let entry = self.entries.entry(key.clone()).or_insert_with(CacheEntry::new);
        let mut inserted = 0;
        for (offset, mut record) in records.into_iter().enumerate() {
            let index = start + offset;
            if entry.records.contains_key(&index) {
                continue;
            }
            record.index = index;
            entry.records.insert(index, record);
            inserted += 1;
        }
        if inserted > 0 {
            entry.updated_at = Utc::now();
        }
        debug!(
            key = %key.fingerprint(),
            start,
            inserted,
            stored = entry.records.len(),
            "merged records"
        );
        inserted
    }

    /// Records a total reported by the API for `key`.
    ///
    /// A reported total replaces an earlier reported one, but never raises an
    /// end already seen in the data (see [`mark_end`](Self::mark_end)).
    pub fn set_total(&mut self, key: &ConfigKey, total: usize) {
        let entry = self.entries.entry(key.clone()).or_insert_with(CacheEntry::new);
        let total = match entry.total {
            Some(end) if entry.end_seen => end.min(total),
            _ => total,
        };
        entry.update_total(total);
    }

    /// Records that the data for `key` ends at or before `end`.
    ///
    /// Every short page bounds the data, so the smallest bound wins whichever
    /// page lands first.
    pub fn mark_end(&mut self, key: &ConfigKey, end: usize) {
        let entry = self.entries.entry(key.clone()).or_insert_with(CacheEntry::new);
        let end = match entry.total {
            Some(bound) if entry.end_seen => bound.min(end),
            _ => end,
        };
        entry.end_seen = true;
        entry.update_total(end);
    }

    /// Length of the contiguous run starting at index 0.
    pub fn prefix_len(&self, key: &ConfigKey) -> usize {
        self.entries.get(key).map(CacheEntry::prefix_len).unwrap_or(0)
    }

    /// Records `[0, len)` in order. The caller checks they are present.
    pub(crate) fn prefix(&self, key: &ConfigKey, len: usize) -> Vec<PopularityChange> {
        self.entries
            .get(key)
            .map(|e| e.records.range(..len).map(|(_, r)| r.clone()).collect())
            .unwrap_or_default()
    }

    pub fn stats(&self, key: &ConfigKey) -> Option<EntryStats> {
        self.entries.get(key).map(|e| EntryStats {
            records: e.records.len(),
            total: e.total,
            ranges: e.present_ranges(),
            created_at: e.created_at,
            updated_at: e.updated_at,
        })
    }
}
