//! Hand-written collaborator stubs with call counters.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use crate::core::{ExportHandle, Report, RunState, SearchHit};
use crate::errors::{ExportError, GenerationError, SearchError};
use crate::providers::{export_file_name, DocumentExporter, GenerationRequest, GenerationTransport, SearchProvider};
use crate::resilience::{InMemoryResponseCache, ResilientGenerator, RetryConfig};
use crate::stages::{Stage, StageContext, StageOutcome};

/// Search stub returning fixed hits and per-URL page text.
///
/// URLs without a registered page fetch as `""`, the same as a failed fetch.
#[derive(Debug, Default)]
pub struct StubSearch {
    hits: Vec<SearchHit>,
    pages: HashMap<String, String>,
    failure: Option<String>,
    search_calls: Mutex<usize>,
    fetched: Mutex<Vec<String>>,
}

impl StubSearch {
    /// Creates a stub returning `hits`.
    #[must_use]
    pub fn new(hits: Vec<SearchHit>) -> Self {
        Self {
            hits,
            ..Self::default()
        }
    }

    /// Creates a stub with no results.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Creates a stub whose search always fails.
    #[must_use]
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            failure: Some(message.into()),
            ..Self::default()
        }
    }

    /// Registers page text for a URL.
    #[must_use]
    pub fn with_page(mut self, url: impl Into<String>, text: impl Into<String>) -> Self {
        self.pages.insert(url.into(), text.into());
        self
    }

    /// Number of search calls.
    #[must_use]
    pub fn search_calls(&self) -> usize {
        *self.search_calls.lock()
    }

    /// URLs fetched, in completion order.
    #[must_use]
    pub fn fetched(&self) -> Vec<String> {
        self.fetched.lock().clone()
    }
}

#[async_trait]
impl SearchProvider for StubSearch {
    async fn search(&self, _query: &str, top_k: usize) -> Result<Vec<SearchHit>, SearchError> {
        *self.search_calls.lock() += 1;
        match &self.failure {
            Some(message) => Err(SearchError::Transport(message.clone())),
            None => Ok(self.hits.iter().take(top_k).cloned().collect()),
        }
    }

    async fn fetch(&self, url: &str) -> String {
        self.fetched.lock().push(url.to_string());
        self.pages.get(url).cloned().unwrap_or_default()
    }
}

/// Generation stub replaying scripted responses, then a fallback.
#[derive(Debug)]
pub struct StubTransport {
    script: Mutex<VecDeque<Result<String, GenerationError>>>,
    fallback: String,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl StubTransport {
    /// Creates a stub that always answers `text`.
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: text.into(),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Creates a stub that answers from `script` in order, then `fallback`.
    #[must_use]
    pub fn scripted(script: Vec<Result<String, GenerationError>>, fallback: impl Into<String>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            ..Self::new(fallback)
        }
    }

    /// Number of transport calls.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.requests.lock().len()
    }

    /// Requests received, in order.
    #[must_use]
    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl GenerationTransport for StubTransport {
    async fn complete(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        self.requests.lock().push(request.clone());
        self.script
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(self.fallback.clone()))
    }
}

/// Wraps a [`StubTransport`] answering `text` in a generator with an
/// in-memory cache and immediate retries.
#[must_use]
pub fn stub_generator(text: impl Into<String>) -> (Arc<ResilientGenerator>, Arc<StubTransport>) {
    generator_over(StubTransport::new(text))
}

/// Wraps a transport in a generator with an in-memory cache and immediate
/// retries.
#[must_use]
pub fn generator_over(transport: StubTransport) -> (Arc<ResilientGenerator>, Arc<StubTransport>) {
    let transport = Arc::new(transport);
    let generator = ResilientGenerator::new(
        Arc::clone(&transport) as Arc<dyn GenerationTransport>,
        Arc::new(InMemoryResponseCache::new()),
    )
    .with_retry(RetryConfig::immediate(3));
    (Arc::new(generator), transport)
}

/// Exporter that keeps reports in memory.
#[derive(Debug, Default)]
pub struct RecordingExporter {
    exported: Mutex<Vec<Report>>,
}

impl RecordingExporter {
    /// Creates an empty exporter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reports exported so far.
    #[must_use]
    pub fn exported(&self) -> Vec<Report> {
        self.exported.lock().clone()
    }
}

#[async_trait]
impl DocumentExporter for RecordingExporter {
    async fn export(&self, report: &Report, query: &str) -> Result<ExportHandle, ExportError> {
        self.exported.lock().push(report.clone());
        Ok(ExportHandle::new(format!("memory://{}", export_file_name(query))))
    }
}

/// Exporter that always fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct FailingExporter;

#[async_trait]
impl DocumentExporter for FailingExporter {
    async fn export(&self, _report: &Report, _query: &str) -> Result<ExportHandle, ExportError> {
        Err(ExportError::Render("renderer unavailable".to_string()))
    }
}

/// Stage that panics when executed.
#[derive(Debug)]
pub struct PanickingStage {
    name: String,
}

impl PanickingStage {
    /// Creates a panicking stage reporting `name`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl Stage for PanickingStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, _state: RunState, _ctx: &StageContext) -> StageOutcome {
        panic!("{} exploded", self.name)
    }
}

/// `n` search hits with distinct URLs under `https://source{i}.example`.
#[must_use]
pub fn sample_hits(n: usize) -> Vec<SearchHit> {
    (0..n)
        .map(|i| {
            SearchHit::new(
                format!("Source {i}"),
                format!("https://source{i}.example/article"),
                format!("Snippet {i} about the topic."),
            )
        })
        .collect()
}

/// A report candidate that passes validation.
#[must_use]
pub fn valid_report_json(title: &str) -> String {
    serde_json::json!({
        "title": title,
        "summary": "Adoption of electric vehicles accelerated through 2024 as prices fell.",
        "key_findings": [
            "Global EV sales grew year over year",
            "Battery prices continued to decline",
            "Charging networks expanded"
        ],
        "facts": [{
            "source": "Source 0",
            "url": "https://source0.example/article",
            "excerpt": "Snippet 0 about the topic.",
            "content": "EV sales rose sharply."
        }],
        "generated_at": "2024-06-01T10:00:00Z"
    })
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_stub_search_counts_and_limits() {
        let search = StubSearch::new(sample_hits(5)).with_page("https://source0.example/article", "body");
        let hits = tokio_test::block_on(search.search("q", 2)).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(search.search_calls(), 1);

        assert_eq!(tokio_test::block_on(search.fetch("https://source0.example/article")), "body");
        assert_eq!(tokio_test::block_on(search.fetch("https://unknown.example")), "");
        assert_eq!(search.fetched().len(), 2);
    }

    #[test]
    fn test_stub_transport_replays_script() {
        let transport = StubTransport::scripted(vec![Err(GenerationError::RateLimited)], "fallback");
        let request = GenerationRequest::new("m", vec![]);

        assert_eq!(
            tokio_test::block_on(transport.complete(&request)),
            Err(GenerationError::RateLimited)
        );
        assert_eq!(tokio_test::block_on(transport.complete(&request)).unwrap(), "fallback");
        assert_eq!(transport.calls(), 2);
    }

    #[test]
    fn test_sample_report_validates() {
        let value: serde_json::Value = serde_json::from_str(&valid_report_json("EV")).unwrap();
        assert!(crate::guardrails::validate_report(&value).is_ok());
    }
}
