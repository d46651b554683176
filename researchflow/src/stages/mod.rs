//! Stage trait and implementations.
//!
//! A stage takes ownership of the [`RunState`], transforms it additively and
//! hands it back. Stages never return errors: anything that goes wrong is
//! reported as a [`StageOutcome::Degraded`] carrying the violations to record.

mod analyze;
mod narrate;
mod partial;
mod research;
mod review;
mod synthesize;

pub use analyze::AnalyzeStage;
pub use narrate::NarrateStage;
pub use partial::PartialSummaryStage;
pub use research::ResearchStage;
pub use review::ReviewStage;
pub use synthesize::SynthesizeStage;

use async_trait::async_trait;
use std::fmt::Debug;
use std::sync::Arc;
use uuid::Uuid;

use crate::core::{RunState, Violation, ViolationKind};
use crate::events::{AuditSink, NoOpAuditSink};

/// Per-run context handed to every stage.
#[derive(Clone)]
pub struct StageContext {
    /// Identifier of the run.
    pub run_id: Uuid,
    audit: Arc<dyn AuditSink>,
}

impl Debug for StageContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageContext")
            .field("run_id", &self.run_id)
            .finish_non_exhaustive()
    }
}

impl Default for StageContext {
    fn default() -> Self {
        Self::new(Arc::new(NoOpAuditSink))
    }
}

impl StageContext {
    /// Creates a context for a new run.
    #[must_use]
    pub fn new(audit: Arc<dyn AuditSink>) -> Self {
        Self {
            run_id: Uuid::now_v7(),
            audit,
        }
    }

    /// Emits a trace event.
    pub async fn emit(&self, step: &str, data: serde_json::Value) {
        self.audit.append_event(step, data).await;
    }

    /// The audit sink.
    #[must_use]
    pub fn audit(&self) -> &Arc<dyn AuditSink> {
        &self.audit
    }
}

/// Result of executing a stage.
#[derive(Debug, Clone, PartialEq)]
pub enum StageOutcome {
    /// The stage did everything it set out to do.
    Success(RunState),
    /// The stage finished with recoverable problems.
    Degraded(RunState, Vec<Violation>),
}

impl StageOutcome {
    /// A degraded outcome with a single violation.
    #[must_use]
    pub fn degraded(state: RunState, violation: Violation) -> Self {
        Self::Degraded(state, vec![violation])
    }

    /// Success if `violations` is empty, degraded otherwise.
    #[must_use]
    pub fn from_parts(state: RunState, violations: Vec<Violation>) -> Self {
        if violations.is_empty() {
            Self::Success(state)
        } else {
            Self::Degraded(state, violations)
        }
    }

    /// Returns true for [`StageOutcome::Success`].
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Violations carried by the outcome.
    #[must_use]
    pub fn violations(&self) -> &[Violation] {
        match self {
            Self::Success(_) => &[],
            Self::Degraded(_, violations) => violations,
        }
    }

    /// Returns true if any carried violation is of `kind`.
    #[must_use]
    pub fn has_kind(&self, kind: ViolationKind) -> bool {
        self.violations().iter().any(|v| v.kind == kind)
    }

    /// Records the carried violations and returns the state.
    #[must_use]
    pub fn into_state(self) -> RunState {
        match self {
            Self::Success(state) => state,
            Self::Degraded(mut state, violations) => {
                for violation in violations {
                    state.record_violation(violation);
                }
                state
            }
        }
    }
}

/// A pipeline stage.
#[async_trait]
pub trait Stage: Send + Sync + Debug {
    /// Returns the name of the stage.
    fn name(&self) -> &str;

    /// Marker recorded when the stage fails unexpectedly.
    fn failure_marker(&self) -> String {
        format!("{}_failed", self.name())
    }

    /// Executes the stage.
    async fn execute(&self, state: RunState, ctx: &StageContext) -> StageOutcome;
}
