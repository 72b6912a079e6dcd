use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One row of the popularity changes table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PopularityChange {
    // Absolute position in the ordering implied by the filters, assigned on merge
    #[serde(default)]
    pub index: usize,
    pub symbol: String,
    pub start_popularity: i64,
    pub end_popularity: i64,
    // Absolute difference, or percent change when the relative flag is set
    pub popularity_difference: f64,
}

/// Ordering requested from the API; the wire name doubles as the sort suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    #[default]
    Changes,
    Increases,
    Decreases,
}

impl ChangeType {
    pub const ALL: [ChangeType; 3] = [ChangeType::Changes, ChangeType::Increases, ChangeType::Decreases];

    pub fn suffix(&self) -> &'static str {
        match self {
            ChangeType::Changes => "changes",
            ChangeType::Increases => "increases",
            ChangeType::Decreases => "decreases",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ChangeType::Changes => "Changes",
            ChangeType::Increases => "Increases",
            ChangeType::Decreases => "Decreases",
        }
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix())
    }
}

impl FromStr for ChangeType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "changes" => Ok(ChangeType::Changes),
            "increases" => Ok(ChangeType::Increases),
            "decreases" => Ok(ChangeType::Decreases),
            other => Err(format!("unknown change type: {}", other)),
        }
    }
}

/// Lookback presets offered by the screen, in hours.
///
/// "1 Month" is sent as `30 * 7` = 210 hours, not 720: the value the
/// popularity API has always received for this preset.
pub const LOOKBACK_OPTIONS: [(u32, &str); 6] = [
    (1, "1 Hour"),
    (4, "4 Hours"),
    (24, "1 Day"),
    (24 * 3, "3 Days"),
    (24 * 7, "1 Week"),
    (30 * 7, "1 Month"),
];

pub fn lookback_label(hours_ago: u32) -> Option<&'static str> {
    LOOKBACK_OPTIONS
        .iter()
        .find(|(hours, _)| *hours == hours_ago)
        .map(|(_, label)| *label)
}

/// Filter and sort parameters. Everything here feeds the config key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PopularityFilters {
    pub relative: bool,
    pub hours_ago: u32,
    pub min_popularity: u32,
    pub change_type: ChangeType,
}

impl Default for PopularityFilters {
    fn default() -> Self {
        Self {
            relative: false,
            hours_ago: 24,
            min_popularity: 0,
            change_type: ChangeType::Changes,
        }
    }
}

impl PopularityFilters {
    /// Field/value pairs in the form sent to the API.
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        vec![
            ("relative", self.relative.to_string()),
            ("hours_ago", self.hours_ago.to_string()),
            ("min_popularity", self.min_popularity.to_string()),
            ("change_type", self.change_type.suffix().to_string()),
        ]
    }
}

/// Response of a range request.
#[derive(Debug, Clone, Default)]
pub struct FetchedPage {
    pub records: Vec<PopularityChange>,
    pub total: Option<usize>,
}

impl FetchedPage {
    pub fn new(records: Vec<PopularityChange>) -> Self {
        Self { records, total: None }
    }

    pub fn with_total(mut self, total: usize) -> Self {
        self.total = Some(total);
        self
    }
}
