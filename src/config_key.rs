//! Canonical identity for a filter/sort combination.
//!
//! Two requests that differ only in their visible range share a key; any
//! filter change (or page size change) produces a new one.

use std::collections::BTreeMap;
use std::fmt;

use crate::models::PopularityFilters;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConfigKey(String);

impl ConfigKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short digest for log lines. Identity always uses the full string.
    pub fn fingerprint(&self) -> String {
        let digest = format!("{:x}", md5::compute(self.0.as_bytes()));
        digest[..8].to_string()
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Builds a key from arbitrary field/value pairs.
///
/// Fields are sorted by name so insertion order does not matter; a repeated
/// field keeps its last value. Names and values are percent-encoded so that
/// separators inside a value cannot make two different field sets collide.
pub fn normalize_fields<I, K, V>(fields: I) -> ConfigKey
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: ToString,
{
    let canonical: BTreeMap<String, String> = fields
        .into_iter()
        .map(|(k, v)| (k.into(), v.to_string()))
        .collect();

    let joined = canonical
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&");

    ConfigKey(joined)
}

/// Key for the popularity changes listing at a given page size.
pub fn normalize(filters: &PopularityFilters, page_size: usize) -> ConfigKey {
    let mut fields: Vec<(&str, String)> = filters.query_pairs();
    fields.push(("suffix", filters.change_type.suffix().to_string()));
    fields.push(("limit", page_size.to_string()));
    normalize_fields(fields)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChangeType;

    #[test]
    fn field_order_does_not_matter() {
        let a = normalize_fields([("b", "2"), ("a", "1")]);
        let b = normalize_fields([("a", "1"), ("b", "2")]);
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "a=1&b=2");
    }

    #[test]
    fn separators_in_values_do_not_collide() {
        let a = normalize_fields([("a", "1&b=2")]);
        let b = normalize_fields([("a", "1"), ("b", "2")]);
        assert_ne!(a, b);
    }

    #[test]
    fn every_filter_field_changes_the_key() {
        let base = PopularityFilters::default();
        let key = normalize(&base, 50);

        let variants = [
            PopularityFilters { relative: true, ..base.clone() },
            PopularityFilters { hours_ago: 4, ..base.clone() },
            PopularityFilters { min_popularity: 25, ..base.clone() },
            PopularityFilters { change_type: ChangeType::Decreases, ..base.clone() },
        ];
        for variant in variants.iter() {
            assert_ne!(normalize(variant, 50), key, "{:?}", variant);
        }
        assert_ne!(normalize(&base, 100), key);
        assert_eq!(normalize(&base.clone(), 50), key);
    }

    #[test]
    fn fingerprint_is_stable_and_short() {
        let key = normalize(&PopularityFilters::default(), 50);
        assert_eq!(key.fingerprint().len(), 8);
        assert_eq!(key.fingerprint(), key.clone().fingerprint());
    }
}
