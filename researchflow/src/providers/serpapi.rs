//! SerpAPI search and HTML page fetching.

use async_trait::async_trait;
use scraper::Html;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::SearchProvider;
use crate::config::SearchConfig;
use crate::core::SearchHit;
use crate::errors::SearchError;
use crate::utils::{normalize_whitespace, truncate_with_marker};

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// Elements whose text never counts as page content.
const SKIPPED_ELEMENTS: &[&str] = &["script", "style", "nav", "header", "footer", "aside"];

#[derive(Debug, Deserialize)]
struct SerpResponse {
    #[serde(default)]
    organic_results: Vec<OrganicResult>,
}

#[derive(Debug, Deserialize)]
struct OrganicResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    link: String,
    #[serde(default)]
    snippet: String,
}

impl From<OrganicResult> for SearchHit {
    fn from(r: OrganicResult) -> Self {
        Self::new(r.title, r.link, r.snippet)
    }
}

/// Extracts readable text from an HTML document.
///
/// Drops the text of script, style and page-chrome elements and collapses
/// whitespace.
#[must_use]
pub fn html_to_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut pieces: Vec<&str> = Vec::new();

    for node in document.root_element().descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let skipped = node.ancestors().any(|a| {
            a.value()
                .as_element()
                .is_some_and(|e| SKIPPED_ELEMENTS.contains(&e.name()))
        });
        if !skipped {
            pieces.push(text);
        }
    }

    normalize_whitespace(&pieces.join(" "))
}

/// Google search through SerpAPI, plus best-effort page fetching.
#[derive(Debug, Clone)]
pub struct SerpApiSearch {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    search_timeout: Duration,
    fetch_timeout: Duration,
    page_char_limit: usize,
}

impl SerpApiSearch {
    /// Creates a search client from configuration.
    pub fn new(config: &SearchConfig) -> Result<Self, SearchError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or(SearchError::MissingCredentials)?;

        let client = reqwest::Client::builder()
            .user_agent(BROWSER_USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .map_err(|e| SearchError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key,
            search_timeout: config.search_timeout(),
            fetch_timeout: config.fetch_timeout(),
            page_char_limit: config.page_char_limit,
        })
    }

    async fn fetch_page(&self, url: &str) -> Result<String, String> {
        let response = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8")
            .header(reqwest::header::ACCEPT_LANGUAGE, "en-US,en;q=0.5")
            .timeout(self.fetch_timeout)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(format!("HTTP {status}"));
        }

        let body = response.text().await.map_err(|e| e.to_string())?;
        Ok(truncate_with_marker(&html_to_text(&body), self.page_char_limit))
    }
}

#[async_trait]
impl SearchProvider for SerpApiSearch {
    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<SearchHit>, SearchError> {
        let num = top_k.to_string();
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("engine", "google"),
                ("q", query),
                ("num", num.as_str()),
                ("api_key", self.api_key.as_str()),
            ])
            .timeout(self.search_timeout)
            .send()
            .await
            .map_err(|e| SearchError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SearchError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: SerpResponse = response
            .json()
            .await
            .map_err(|e| SearchError::Decode(e.to_string()))?;

        Ok(parsed
            .organic_results
            .into_iter()
            .take(top_k)
            .map(SearchHit::from)
            .collect())
    }

    async fn fetch(&self, url: &str) -> String {
        match self.fetch_page(url).await {
            Ok(text) => text,
            Err(error) => {
                debug!(url, error = %error, "Page fetch failed");
                String::new()
            }
        }
    }
}
