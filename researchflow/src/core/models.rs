//! Domain records produced and consumed by the pipeline stages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One ranked hit returned by the search collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    /// Result title.
    pub title: String,
    /// Result URL.
    pub url: String,
    /// Short snippet shown by the search engine.
    pub snippet: String,
}

impl SearchHit {
    /// Creates a new search hit.
    #[must_use]
    pub fn new(title: impl Into<String>, url: impl Into<String>, snippet: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            snippet: snippet.into(),
        }
    }
}

/// A retrieved document: a search hit enriched with the fetched page text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// Source URL.
    pub url: String,
    /// Document title.
    pub title: String,
    /// Search snippet.
    pub snippet: String,
    /// Full page text, if the fetch produced any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_text: Option<String>,
}

impl Document {
    /// Builds a document from a hit and the (possibly empty) page text.
    #[must_use]
    pub fn from_hit(hit: SearchHit, page_text: String) -> Self {
        Self {
            url: hit.url,
            title: hit.title,
            snippet: hit.snippet,
            full_text: Some(page_text).filter(|t| !t.is_empty()),
        }
    }

    /// Snippet followed by the full page text, when present.
    #[must_use]
    pub fn combined_content(&self) -> String {
        match self.full_text.as_deref() {
            Some(text) if !text.is_empty() => format!("{} {}", self.snippet, text),
            _ => self.snippet.clone(),
        }
    }
}

/// A single extracted fact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fact {
    /// Human-readable source name.
    pub source: String,
    /// Source URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Short excerpt from the source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub excerpt: Option<String>,
    /// Fact body, length-capped.
    pub content: String,
}

/// A validated research report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    /// Report title.
    pub title: String,
    /// Summary paragraph.
    pub summary: String,
    /// Ordered key findings.
    pub key_findings: Vec<String>,
    /// Supporting facts.
    pub facts: Vec<Fact>,
    /// Generation time.
    pub generated_at: DateTime<Utc>,
}

/// Reduced-confidence artifact produced when the failure budget is exceeded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialReport {
    /// Title, always `Partial results for: <query>`.
    pub title: String,
    /// Fixed apology summary.
    pub summary: String,
    /// Whatever facts were extracted before the run degraded.
    pub facts: Vec<Fact>,
}

impl PartialReport {
    /// Summary text used for every partial report.
    pub const SUMMARY: &'static str = "We hit reliability issues; here are partial findings.";

    /// Creates a partial report for a query.
    #[must_use]
    pub fn for_query(query: &str, facts: Vec<Fact>) -> Self {
        Self {
            title: format!("Partial results for: {query}"),
            summary: Self::SUMMARY.to_string(),
            facts,
        }
    }
}

/// Handle to an exported document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExportHandle {
    /// Location of the exported document (a file path for file exporters).
    pub location: String,
}

impl ExportHandle {
    /// Creates a new export handle.
    #[must_use]
    pub fn new(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
        }
    }
}
