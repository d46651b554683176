//! Schema validation, document export and moderation of the report candidate.

use async_trait::async_trait;
use futures::FutureExt;
use serde_json::json;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{info, warn};

use super::{Stage, StageContext, StageOutcome};
use crate::core::{keys, Artifact, ExportHandle, Report, RunState, Violation};
use crate::errors::ExportError;
use crate::events::steps;
use crate::guardrails::{validate_report, ContentModerator};
use crate::providers::DocumentExporter;

/// Validates the raw candidate and promotes it to the canonical report.
///
/// A valid report is exported as a side effect; export failures are recorded
/// but never affect `schema_ok`. The candidate summary is moderated whether
/// or not validation passed. Moderation flags are advisory.
#[derive(Clone)]
pub struct ReviewStage {
    exporter: Arc<dyn DocumentExporter>,
    moderator: ContentModerator,
}

impl std::fmt::Debug for ReviewStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReviewStage")
            .field("moderator", &self.moderator)
            .finish_non_exhaustive()
    }
}

impl ReviewStage {
    /// Creates the stage with the default moderator.
    #[must_use]
    pub fn new(exporter: Arc<dyn DocumentExporter>) -> Self {
        Self {
            exporter,
            moderator: ContentModerator::default(),
        }
    }

    async fn export(&self, report: &Report, query: &str) -> Result<String, ExportError> {
        let export = AssertUnwindSafe(self.exporter.export(report, query)).catch_unwind();
        match export.await {
            Ok(result) => result.map(|handle| handle.location),
            Err(_) => Err(ExportError::Render("exporter panicked".to_string())),
        }
    }
}

#[async_trait]
impl Stage for ReviewStage {
    fn name(&self) -> &str {
        "reviewer"
    }

    async fn execute(&self, mut state: RunState, ctx: &StageContext) -> StageOutcome {
        let Some(raw) = state.raw_report().cloned() else {
            return StageOutcome::degraded(state, Violation::no_report());
        };

        let mut violations = Vec::new();

        match validate_report(&raw) {
            Ok(report) => {
                info!(title = %report.title, "Report passed validation");
                ctx.emit(steps::REVIEWER_SCHEMA_OK, json!({"title": report.title})).await;
                state.record_tool("schema_validation");

                let exported = self.export(&report, &state.query).await;
                state.promote_report(report);

                match exported {
                    Ok(location) => {
                        ctx.emit(steps::REVIEWER_PDF_GENERATED, json!({"filename": location})).await;
                        state.set_output(keys::PDF_REPORT, Artifact::Export(ExportHandle::new(location)));
                        state.record_tool("document_export");
                    }
                    Err(error) => {
                        warn!(error = %error, "Report export failed");
                        ctx.emit(steps::REVIEWER_EXPORT_ERROR, json!({"error": error.to_string()})).await;
                        violations.push(Violation::export_failed(error));
                    }
                }
            }
            Err(error) => {
                warn!(issues = error.issues.len(), error = %error, "Report failed validation");
                ctx.emit(steps::REVIEWER_SCHEMA_ERROR, json!({"error": error.to_string()})).await;
                violations.push(Violation::schema_error(error));
            }
        }

        let summary = raw.get("summary").and_then(|s| s.as_str()).unwrap_or_default();
        let moderation = self.moderator.check(summary);
        if let Some(reason) = moderation.reason.filter(|_| moderation.flagged) {
            warn!(reason = %reason, "Summary flagged by moderation");
            ctx.emit(steps::REVIEWER_MODERATION_FLAG, json!({"reason": reason})).await;
            violations.push(Violation::policy(reason));
        }

        StageOutcome::from_parts(state, violations)
    }
}
