//! The run's finite-state routing.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core::RunState;

/// A position in the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStep {
    /// Search and page fetches.
    Research,
    /// Fact extraction.
    Analyze,
    /// Report synthesis.
    Synthesize,
    /// Validation, export and moderation.
    Review,
    /// Article generation.
    Narrate,
    /// Degraded terminal output.
    PartialSummary,
    /// The run is finished.
    Done,
}

impl PipelineStep {
    /// Returns true for [`PipelineStep::Done`].
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done)
    }
}

impl fmt::Display for PipelineStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Research => "research",
            Self::Analyze => "analyze",
            Self::Synthesize => "synthesize",
            Self::Review => "review",
            Self::Narrate => "narrate",
            Self::PartialSummary => "partial_summary",
            Self::Done => "done",
        };
        f.write_str(name)
    }
}

/// Pure transition function over (step, state).
///
/// The only branch sits after Synthesize: once `failure_count` reaches the
/// threshold the run degrades to PartialSummary instead of Review.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Router {
    failure_threshold: u32,
}

impl Default for Router {
    fn default() -> Self {
        Self::new(3)
    }
}

impl Router {
    /// Creates a router with the given failure threshold.
    #[must_use]
    pub fn new(failure_threshold: u32) -> Self {
        Self { failure_threshold }
    }

    /// The failure threshold.
    #[must_use]
    pub fn failure_threshold(&self) -> u32 {
        self.failure_threshold
    }

    /// Returns the step that follows `step`.
    #[must_use]
    pub fn next(&self, step: PipelineStep, state: &RunState) -> PipelineStep {
        match step {
            PipelineStep::Research => PipelineStep::Analyze,
            PipelineStep::Analyze => PipelineStep::Synthesize,
            PipelineStep::Synthesize if state.failure_count() >= self.failure_threshold => {
                PipelineStep::PartialSummary
            }
            PipelineStep::Synthesize => PipelineStep::Review,
            PipelineStep::Review => PipelineStep::Narrate,
            PipelineStep::Narrate | PipelineStep::PartialSummary | PipelineStep::Done => {
                PipelineStep::Done
            }
        }
    }

    /// Walks the route from Research for a state that does not change.
    #[must_use]
    pub fn route(&self, state: &RunState) -> Vec<PipelineStep> {
        let mut steps = vec![PipelineStep::Research];
        let mut step = PipelineStep::Research;
        while !step.is_terminal() {
            step = self.next(step, state);
            steps.push(step);
        }
        steps
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use super::PipelineStep::*;

    #[test]
    fn test_happy_route() {
        let route = Router::default().route(&RunState::new("q"));
        assert_eq!(route, vec![Research, Analyze, Synthesize, Review, Narrate, Done]);
    }

    #[test]
    fn test_threshold_routes_to_partial_summary() {
        let state = RunState::new("q").with_failure_count(3);
        let route = Router::default().route(&state);
        assert_eq!(route, vec![Research, Analyze, Synthesize, PartialSummary, Done]);
    }

    #[test]
    fn test_below_threshold_goes_to_review() {
        let state = RunState::new("q").with_failure_count(2);
        assert_eq!(Router::default().next(Synthesize, &state), Review);
        assert_eq!(Router::new(2).next(Synthesize, &state), PartialSummary);
    }

    #[test]
    fn test_branch_only_after_synthesize() {
        let state = RunState::new("q").with_failure_count(10);
        let router = Router::default();
        assert_eq!(router.next(Research, &state), Analyze);
        assert_eq!(router.next(Analyze, &state), Synthesize);
        assert_eq!(router.next(Review, &state), Narrate);
        assert_eq!(router.next(Done, &state), Done);
    }

    #[test]
    fn test_step_display() {
        assert_eq!(PartialSummary.to_string(), "partial_summary");
        assert_eq!(serde_json::to_string(&Synthesize).unwrap(), r#""synthesize""#);
    }
}
