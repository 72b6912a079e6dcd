use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::error::FetchError;
use crate::fetcher::RangeFetcher;
use crate::models::{FetchedPage, PopularityChange, PopularityFilters};

const USER_AGENT: &str = concat!("popularity-changes/", env!("CARGO_PKG_VERSION"));

/// HTTP client for the popularity data service.
pub struct PopularityApiClient {
    client: Client,
    base_url: String,
}

// The listing endpoint answers either with a bare array or with a page object
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RangeResponse {
    Records(Vec<PopularityChange>),
    Page {
        records: Vec<PopularityChange>,
        #[serde(default)]
        total: Option<usize>,
    },
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TotalResponse {
    Bare(usize),
    Wrapped { total: usize },
}

impl PopularityApiClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str, pairs: &[(&str, String)]) -> String {
        let query = pairs
            .iter()
            .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");
        format!("{}/{}?{}", self.base_url, path, query)
    }

    pub fn range_url(&self, filters: &PopularityFilters, start: usize, limit: usize) -> String {
        let mut pairs = filters.query_pairs();
        pairs.push(("start_index", start.to_string()));
        pairs.push(("limit", limit.to_string()));
        self.url("popularity_changes/largest", &pairs)
    }

    pub fn total_url(&self, filters: &PopularityFilters) -> String {
        self.url("symbols/total", &filters.query_pairs())
    }

    async fn get_text(&self, url: &str) -> Result<String, FetchError> {
        debug!(url, "GET");
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        Ok(response.text().await?)
    }
}

pub fn parse_range_response(body: &str) -> Result<FetchedPage, FetchError> {
    let page = match serde_json::from_str::<RangeResponse>(body)? {
        RangeResponse::Records(records) => FetchedPage::new(records),
        RangeResponse::Page { records, total } => FetchedPage { records, total },
    };
    Ok(page)
}

pub fn parse_total_response(body: &str) -> Result<usize, FetchError> {
    let total = match serde_json::from_str::<TotalResponse>(body)? {
        TotalResponse::Bare(total) => total,
        TotalResponse::Wrapped { total } => total,
    };
    Ok(total)
}

#[async_trait]
impl RangeFetcher for PopularityApiClient {
    async fn fetch_range(
        &self,
        filters: &PopularityFilters,
        start: usize,
        limit: usize,
    ) -> Result<FetchedPage, FetchError> {
        let url = self.range_url(filters, start, limit);
        let body = self.get_text(&url).await?;
        parse_range_response(&body)
    }

    async fn fetch_total(&self, filters: &PopularityFilters) -> Result<usize, FetchError> {
        let url = self.total_url(filters);
        let body = self.get_text(&url).await?;
        parse_total_response(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChangeType;

    fn client() -> PopularityApiClient {
        PopularityApiClient::new("http://localhost:4000/api/", Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn range_url_carries_filters_and_window() {
        let filters = PopularityFilters {
            relative: true,
            hours_ago: 168,
            min_popularity: 25,
            change_type: ChangeType::Decreases,
        };
        assert_eq!(
            client().range_url(&filters, 50, 25),
            "http://localhost:4000/api/popularity_changes/largest?relative=true&hours_ago=168&min_popularity=25&change_type=decreases&start_index=50&limit=25"
        );
    }

    #[test]
    fn total_url_omits_window() {
        let url = client().total_url(&PopularityFilters::default());
        assert_eq!(
            url,
            "http://localhost:4000/api/symbols/total?relative=false&hours_ago=24&min_popularity=0&change_type=changes"
        );
    }

    #[test]
    fn parses_bare_array_and_page_object() {
        let bare = r#"[{"symbol":"TSLA","start_popularity":10,"end_popularity":40,"popularity_difference":30}]"#;
        let page = parse_range_response(bare).unwrap();
        assert_eq!(page.records.len(), 1);
        assert_eq!(page.total, None);

        let wrapped = r#"{"records":[],"total":1200}"#;
        let page = parse_range_response(wrapped).unwrap();
        assert!(page.records.is_empty());
        assert_eq!(page.total, Some(1200));
    }

    #[test]
    fn parses_totals() {
        assert_eq!(parse_total_response("4211").unwrap(), 4211);
        assert_eq!(parse_total_response(r#"{"total": 17}"#).unwrap(), 17);
        assert!(matches!(
            parse_total_response("\"many\""),
            Err(FetchError::Decode(_))
        ));
    }
}
