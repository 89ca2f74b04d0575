use crate::config::Settings;
use queryroute_core::{
    Error, Result, SearchProvider, SearchQuery, SearchResponse, SearchResult, NO_SEARCH_RESULTS,
    SEARCH_ERROR,
};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::{debug, warn};

/// How many organic results make it into the answer context.
pub const SEARCH_CONTEXT_RESULTS: usize = 3;

/// SerpAPI (`/search.json`) web search.
#[derive(Debug, Clone)]
pub struct SerpApiSearchProvider {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
}

impl SerpApiSearchProvider {
    pub fn new(client: reqwest::Client, api_key: String, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            api_key,
            endpoint: endpoint.into(),
        }
    }

    pub fn from_settings(client: reqwest::Client, settings: &Settings) -> Result<Self> {
        let api_key = settings.serpapi_key.clone().ok_or_else(|| {
            Error::NotConfigured("missing QUERYROUTE_SERPAPI_KEY (or SERP_API_KEY)".to_string())
        })?;
        Ok(Self::new(client, api_key, settings.serpapi_endpoint.clone()))
    }
}

#[derive(Debug, Deserialize)]
struct SerpApiResponse {
    #[serde(default)]
    organic_results: Vec<SerpApiOrganicResult>,
}

#[derive(Debug, Deserialize)]
struct SerpApiOrganicResult {
    link: Option<String>,
    title: Option<String>,
    snippet: Option<String>,
}

#[async_trait::async_trait]
impl SearchProvider for SerpApiSearchProvider {
    fn name(&self) -> &'static str {
        "serpapi"
    }

    async fn search(&self, q: &SearchQuery) -> Result<SearchResponse> {
        let t0 = Instant::now();
        let resp = self
            .client
            .get(&self.endpoint)
            .query(&[("q", q.query.as_str()), ("api_key", self.api_key.as_str())])
            .send()
            .await
            .map_err(|e| Error::Search(e.to_string()))?;
        let status = resp.status().as_u16();
        if status != 200 {
            return Err(Error::SearchStatus(status));
        }

        let parsed: SerpApiResponse = resp
            .json()
            .await
            .map_err(|e| Error::Search(e.to_string()))?;
        let max_results = q.max_results.unwrap_or(usize::MAX);
        let results: Vec<SearchResult> = parsed
            .organic_results
            .into_iter()
            .take(max_results)
            .map(|r| SearchResult {
                url: r.link.unwrap_or_default(),
                title: r.title,
                snippet: r.snippet,
                source: "serpapi".to_string(),
            })
            .collect();

        let mut timings_ms = BTreeMap::new();
        timings_ms.insert("search".to_string(), t0.elapsed().as_millis());
        debug!(results = results.len(), "serpapi search");

        Ok(SearchResponse {
            results,
            provider: "serpapi".to_string(),
            timings_ms,
        })
    }
}

/// `"{snippet} (Source: {link})"` for the first [`SEARCH_CONTEXT_RESULTS`] results, one per line.
pub fn format_search_context(results: &[SearchResult]) -> String {
    let lines: Vec<String> = results
        .iter()
        .take(SEARCH_CONTEXT_RESULTS)
        .map(|r| {
            format!(
                "{} (Source: {})",
                r.snippet.as_deref().unwrap_or(""),
                r.url
            )
        })
        .collect();
    if lines.is_empty() {
        NO_SEARCH_RESULTS.to_string()
    } else {
        lines.join("\n")
    }
}

/// Run a search and render it as answer context. Never fails: errors become [`SEARCH_ERROR`].
pub async fn search_context(provider: &dyn SearchProvider, query: &str) -> String {
    let q = SearchQuery {
        query: query.to_string(),
        max_results: Some(SEARCH_CONTEXT_RESULTS),
    };
    match provider.search(&q).await {
        Ok(resp) => format_search_context(&resp.results),
        Err(e) => {
            warn!(provider = provider.name(), error = %e, "search failed");
            SEARCH_ERROR.to_string()
        }
    }
}
