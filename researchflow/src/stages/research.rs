//! Retrieval: search plus per-URL page fetches.

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{Stage, StageContext, StageOutcome};
use crate::config::SearchConfig;
use crate::core::{Document, RunState, Violation};
use crate::events::steps;
use crate::providers::SearchProvider;

/// Retrieves the top results for the query and fetches each page.
///
/// Pages are fetched concurrently (bounded) with order preserved. A single
/// fetch that fails or times out leaves that document without page text and
/// is not a violation. Only a failed search is.
#[derive(Clone)]
pub struct ResearchStage {
    search: Arc<dyn SearchProvider>,
    top_k: usize,
    concurrency: usize,
    fetch_timeout: Duration,
    overall_timeout: Duration,
}

impl std::fmt::Debug for ResearchStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResearchStage")
            .field("top_k", &self.top_k)
            .field("concurrency", &self.concurrency)
            .finish_non_exhaustive()
    }
}

impl ResearchStage {
    /// Creates the stage with default limits.
    #[must_use]
    pub fn new(search: Arc<dyn SearchProvider>) -> Self {
        Self::from_config(search, &SearchConfig::default())
    }

    /// Creates the stage from search configuration.
    #[must_use]
    pub fn from_config(search: Arc<dyn SearchProvider>, config: &SearchConfig) -> Self {
        Self {
            search,
            top_k: config.top_k,
            concurrency: config.fetch_concurrency.max(1),
            fetch_timeout: config.fetch_timeout(),
            overall_timeout: config.overall_fetch_timeout(),
        }
    }

    /// Sets the number of results to retrieve.
    #[must_use]
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    async fn fetch_all(&self, urls: Vec<String>) -> Vec<String> {
        let total = urls.len();
        let per_fetch = self.fetch_timeout;
        let search = Arc::clone(&self.search);
        let mut fetches = futures::stream::iter(urls.into_iter().map(move |url| {
            let search = Arc::clone(&search);
            async move {
                tokio::time::timeout(per_fetch, search.fetch(&url))
                    .await
                    .unwrap_or_else(|_| {
                        debug!(url = %url, "Page fetch timed out");
                        String::new()
                    })
            }
        }))
        .buffered(self.concurrency)
        .boxed();

        let mut texts = Vec::with_capacity(total);
        let collect = async {
            while let Some(text) = fetches.next().await {
                texts.push(text);
            }
        };
        if tokio::time::timeout(self.overall_timeout, collect).await.is_err() {
            warn!(
                fetched = texts.len(),
                total,
                "Page fetches exceeded overall timeout"
            );
        }

        texts.resize(total, String::new());
        texts
    }
}

#[async_trait]
impl Stage for ResearchStage {
    fn name(&self) -> &str {
        "researcher"
    }

    async fn execute(&self, mut state: RunState, ctx: &StageContext) -> StageOutcome {
        let hits = match self.search.search(&state.query, self.top_k).await {
            Ok(hits) => hits,
            Err(error) => {
                warn!(error = %error, "Search failed");
                return StageOutcome::degraded(state, Violation::research_failed(error));
            }
        };

        let urls: Vec<String> = hits.iter().map(|h| h.url.clone()).collect();
        let texts = self.fetch_all(urls).await;

        let docs: Vec<Document> = hits
            .into_iter()
            .zip(texts)
            .map(|(hit, text)| Document::from_hit(hit, text))
            .collect();
        let with_full_text = docs.iter().filter(|d| d.full_text.is_some()).count();

        info!(count = docs.len(), with_full_text, "Research complete");

        state.context.extend(docs.iter().map(Document::combined_content));
        let count = docs.len();
        state.docs.extend(docs);
        state.record_tool("web_search");
        state.record_tool("full_page_fetch");

        ctx.emit(
            steps::RESEARCHER_WEB_SEARCH,
            json!({"count": count, "with_full_text": with_full_text}),
        )
        .await;

        StageOutcome::Success(state)
    }
}
