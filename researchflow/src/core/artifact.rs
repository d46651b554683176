//! Artifacts stored in a run's output mapping.

use super::models::{ExportHandle, Fact, PartialReport, Report};
use serde::Serialize;

/// Well-known output keys, namespaced by the stage that writes them.
pub mod keys {
    /// Facts extracted by the Analyze stage.
    pub const FACTS: &str = "facts";
    /// Unvalidated report candidate written by Synthesize.
    pub const REPORT_RAW: &str = "report_raw";
    /// Canonical report promoted by Review.
    pub const REPORT: &str = "report";
    /// Narrative article written by Narrate.
    pub const ARTICLE: &str = "article";
    /// Degraded output written by PartialSummary.
    pub const REPORT_PARTIAL: &str = "report_partial";
    /// Location of the exported report document.
    pub const PDF_REPORT: &str = "pdf_report";
}

/// A single output artifact.
///
/// Serializes untagged so the output mapping renders as plain JSON.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Artifact {
    /// Ranked facts.
    Facts(Vec<Fact>),
    /// Raw candidate awaiting validation.
    RawReport(serde_json::Value),
    /// Canonical report.
    Report(Report),
    /// Narrative text.
    Article(String),
    /// Partial summary.
    Partial(PartialReport),
    /// Exported document handle.
    Export(ExportHandle),
}
