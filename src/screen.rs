//! Owned state for the popularity changes screen.
//!
//! Actions go through [`PopularityChangesState::update`]; a [`WindowEffect`]
//! turns state changes into load requests only when the (key, window)
//! dependency actually moved.

use tracing::debug;

use crate::config_key::{normalize, ConfigKey};
use crate::models::{ChangeType, PopularityFilters};
use crate::window::Window;

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    ToggleRelative,
    SetHoursAgo(u32),
    SetMinPopularity(i64),
    SetChangeType(ChangeType),
    SelectSymbol(String),
    /// The table asked for rows `[start, stop)` while scrolling
    Scroll(Window),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PopularityChangesState {
    pub filters: PopularityFilters,
    pub page_size: usize,
    pub selected_symbol: Option<String>,
    visible: Window,
    requested_len: usize,
}

impl PopularityChangesState {
    pub fn new(filters: PopularityFilters, page_size: usize) -> Self {
        Self {
            filters,
            page_size,
            selected_symbol: None,
            visible: Window::span(0, page_size),
            requested_len: page_size,
        }
    }

    pub fn config_key(&self) -> ConfigKey {
        normalize(&self.filters, self.page_size)
    }

    pub fn visible(&self) -> Window {
        self.visible
    }

    /// How many rows the table may show: the furthest row requested so far.
    pub fn requested_len(&self) -> usize {
        self.requested_len
    }

    /// Applies `action`. Returns whether anything changed.
    ///
    /// Filter changes restart the table at row 0.
    pub fn update(&mut self, action: Action) -> bool {
        let before = self.clone();
        match action {
            Action::ToggleRelative => self.filters.relative = !self.filters.relative,
            Action::SetHoursAgo(hours) => self.filters.hours_ago = hours,
            Action::SetMinPopularity(min) => self.filters.min_popularity = min.clamp(0, u32::MAX as i64) as u32,
            Action::SetChangeType(change_type) => self.filters.change_type = change_type,
            Action::SelectSymbol(symbol) => self.selected_symbol = Some(symbol),
            Action::Scroll(window) => {
                self.visible = window;
                self.requested_len = self.requested_len.max(window.stop());
            }
        }

        if self.filters != before.filters {
            debug!(filters = ?self.filters, "filters changed, resetting window");
            self.visible = Window::span(0, self.page_size);
            self.requested_len = self.page_size;
        }
        *self != before
    }
}

/// A window the screen needs loaded.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadRequest {
    pub key: ConfigKey,
    pub filters: PopularityFilters,
    pub window: Window,
}

/// Remembers the last dependency tuple it acted on.
#[derive(Debug, Default)]
pub struct WindowEffect {
    last: Option<(ConfigKey, Window)>,
}

impl WindowEffect {
    pub fn new() -> Self {
        Self::default()
    }

    /// A load request if the key or visible window differs from the last call.
    pub fn poll(&mut self, state: &PopularityChangesState) -> Option<LoadRequest> {
        let deps = (state.config_key(), state.visible());
        if self.last.as_ref() == Some(&deps) {
            return None;
        }
        self.last = Some(deps.clone());
        Some(LoadRequest {
            key: deps.0,
            filters: state.filters.clone(),
            window: deps.1,
        })
    }

    /// Forget the last tuple so the next poll fires, e.g. after a failed load.
    pub fn reset(&mut self) {
        self.last = None;
    }
}

/// `1234567` -> `1,234,567`
pub fn format_count(value: i64) -> String {
    let digits = value.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    if value < 0 {
        format!("-{}", out)
    } else {
        out
    }
}

/// Signed change cell. Relative values arrive as percentages.
pub fn format_change(value: f64, relative: bool) -> String {
    let sign = if value < 0.0 { "-" } else { "+" };
    if relative {
        format!("{}{:.2}%", sign, value.abs())
    } else {
        format!("{}{}", sign, format_count(value.abs().round() as i64))
    }
}

pub fn change_column_label(relative: bool) -> &'static str {
    if relative {
        "Change %"
    } else {
        "Change"
    }
}
