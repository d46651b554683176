//! Terminal fallback once the failure budget is spent.

use async_trait::async_trait;
use serde_json::json;
use tracing::info;

use super::{Stage, StageContext, StageOutcome};
use crate::core::{keys, Artifact, PartialReport, RunState};
use crate::events::steps;

/// Builds a reduced-confidence report from whatever facts exist.
#[derive(Debug, Clone, Copy, Default)]
pub struct PartialSummaryStage;

#[async_trait]
impl Stage for PartialSummaryStage {
    fn name(&self) -> &str {
        "partial_summary"
    }

    async fn execute(&self, mut state: RunState, ctx: &StageContext) -> StageOutcome {
        let facts = state.facts().map(<[_]>::to_vec).unwrap_or_default();
        let partial = PartialReport::for_query(&state.query, facts);

        info!(failure_count = state.failure_count(), "Producing partial summary");
        ctx.emit(
            steps::GRAPH_PARTIAL_SUMMARY,
            json!({"failure_count": state.failure_count()}),
        )
        .await;

        state.set_output(keys::REPORT_PARTIAL, Artifact::Partial(partial));
        StageOutcome::Success(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Fact;
    use crate::events::CollectingAuditSink;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_partial_report_carries_facts() {
        let mut state = RunState::new("ev adoption").with_failure_count(3);
        let fact = Fact {
            source: "IEA".into(),
            url: None,
            excerpt: None,
            content: "Sales rose".into(),
        };
        state.set_output(keys::FACTS, Artifact::Facts(vec![fact.clone()]));

        let audit = Arc::new(CollectingAuditSink::new());
        let ctx = StageContext::new(audit.clone());
        let state = PartialSummaryStage.execute(state, &ctx).await.into_state();

        let partial = state.partial_report().unwrap();
        assert_eq!(partial.title, "Partial results for: ev adoption");
        assert_eq!(partial.summary, PartialReport::SUMMARY);
        assert_eq!(partial.facts, vec![fact]);
        assert_eq!(
            audit.events_for(steps::GRAPH_PARTIAL_SUMMARY),
            vec![json!({"failure_count": 3})]
        );
    }

    #[tokio::test]
    async fn test_missing_facts_yield_empty_list() {
        let state = PartialSummaryStage
            .execute(RunState::new("q"), &StageContext::default())
            .await
            .into_state();
        assert!(state.partial_report().unwrap().facts.is_empty());
        assert!(state.report().is_none());
    }
}
