//! Fact extraction from retrieved documents.

use async_trait::async_trait;
use serde_json::json;
use tracing::info;

use super::{Stage, StageContext, StageOutcome};
use crate::core::{keys, Artifact, Document, Fact, RunState};
use crate::events::steps;
use crate::utils::{normalize_whitespace, truncate_with_marker};

/// Derives one fact per document.
///
/// Fact content is the document's combined content with whitespace
/// normalized, capped at `fact_char_limit` characters. Facts are ordered by
/// content length, longest first, as a relevance proxy.
#[derive(Debug, Clone)]
pub struct AnalyzeStage {
    fact_char_limit: usize,
}

impl Default for AnalyzeStage {
    fn default() -> Self {
        Self::new(500)
    }
}

impl AnalyzeStage {
    /// Creates the stage with a per-fact character limit.
    #[must_use]
    pub fn new(fact_char_limit: usize) -> Self {
        Self { fact_char_limit }
    }

    fn fact_from(&self, doc: &Document) -> Fact {
        let mut raw = doc.combined_content();
        if raw.trim().is_empty() {
            raw.clone_from(&doc.snippet);
        }
        let content = truncate_with_marker(&normalize_whitespace(&raw), self.fact_char_limit);

        let source = if doc.title.is_empty() {
            doc.url.clone()
        } else {
            doc.title.clone()
        };

        Fact {
            source,
            url: Some(doc.url.clone()).filter(|u| !u.is_empty()),
            excerpt: Some(doc.snippet.clone()).filter(|s| !s.is_empty()),
            content,
        }
    }
}

#[async_trait]
impl Stage for AnalyzeStage {
    fn name(&self) -> &str {
        "analyst"
    }

    async fn execute(&self, mut state: RunState, ctx: &StageContext) -> StageOutcome {
        let mut facts: Vec<Fact> = state.docs.iter().map(|d| self.fact_from(d)).collect();
        // stable, so equal lengths keep retrieval order
        facts.sort_by_key(|f| std::cmp::Reverse(f.content.chars().count()));

        #[allow(clippy::cast_precision_loss)]
        let avg_content_length = if facts.is_empty() {
            0.0
        } else {
            facts.iter().map(|f| f.content.chars().count()).sum::<usize>() as f64 / facts.len() as f64
        };

        info!(n_facts = facts.len(), avg_content_length, "Facts extracted");
        ctx.emit(
            steps::ANALYST_FACTS_EXTRACTED,
            json!({"n_facts": facts.len(), "avg_content_length": avg_content_length}),
        )
        .await;

        state.set_output(keys::FACTS, Artifact::Facts(facts));
        state.record_tool("analyst_web_parser");
        StageOutcome::Success(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::SearchHit;
    use pretty_assertions::assert_eq;

    fn doc(title: &str, snippet: &str, page: &str) -> Document {
        Document::from_hit(
            SearchHit::new(title, format!("https://{}.example", title.to_lowercase()), snippet),
            page.to_string(),
        )
    }

    #[tokio::test]
    async fn test_facts_are_sorted_by_length() {
        let mut state = RunState::new("q");
        state.docs = vec![
            doc("Short", "tiny", ""),
            doc("Long", "snippet", "a much longer page body with   extra\n whitespace"),
            doc("Mid", "medium snippet", "page"),
        ];

        let state = AnalyzeStage::default()
            .execute(state, &StageContext::default())
            .await
            .into_state();
        let facts = state.facts().unwrap();

        let sources: Vec<&str> = facts.iter().map(|f| f.source.as_str()).collect();
        assert_eq!(sources, vec!["Long", "Mid", "Short"]);
        assert_eq!(facts[0].content, "snippet a much longer page body with extra whitespace");
        assert_eq!(facts[2].excerpt.as_deref(), Some("tiny"));
        assert_eq!(state.tools_used(), ["analyst_web_parser"]);
    }

    #[tokio::test]
    async fn test_content_is_capped_with_marker() {
        let mut state = RunState::new("q");
        state.docs = vec![doc("Big", "s", &"x".repeat(1000))];

        let state = AnalyzeStage::new(20)
            .execute(state, &StageContext::default())
            .await
            .into_state();
        let content = &state.facts().unwrap()[0].content;
        assert_eq!(content.chars().count(), 23);
        assert!(content.ends_with("..."));
    }

    #[tokio::test]
    async fn test_no_docs_yields_empty_facts() {
        let state = AnalyzeStage::default()
            .execute(RunState::new("q"), &StageContext::default())
            .await
            .into_state();
        assert_eq!(state.facts(), Some(&[][..]));
        assert!(state.violations().is_empty());
    }

    #[tokio::test]
    async fn test_untitled_document_uses_url_as_source() {
        let mut state = RunState::new("q");
        state.docs = vec![Document::from_hit(SearchHit::new("", "https://u.example", "s"), String::new())];
        let state = AnalyzeStage::default()
            .execute(state, &StageContext::default())
            .await
            .into_state();
        assert_eq!(state.facts().unwrap()[0].source, "https://u.example");
    }
}
