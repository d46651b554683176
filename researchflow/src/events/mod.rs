//! Audit trail for pipeline runs.
//!
//! Stages emit structured trace events through an [`AuditSink`]; the
//! orchestrator writes a [`RunSummary`] when a run finishes.

mod sink;

pub use sink::{
    AuditSink, CollectingAuditSink, FanoutAuditSink, JsonlAuditSink, LoggingAuditSink,
    NoOpAuditSink, RunSummary,
};

/// Step names used in trace events.
pub mod steps {
    /// Search and page fetches finished.
    pub const RESEARCHER_WEB_SEARCH: &str = "researcher.web_search";
    /// Facts were extracted.
    pub const ANALYST_FACTS_EXTRACTED: &str = "analyst.facts_extracted";
    /// A report candidate was produced.
    pub const WRITER_SUCCESS: &str = "writer.success";
    /// No report candidate could be produced.
    pub const WRITER_ERROR: &str = "writer.error";
    /// The candidate passed validation.
    pub const REVIEWER_SCHEMA_OK: &str = "reviewer.schema_ok";
    /// The candidate failed validation.
    pub const REVIEWER_SCHEMA_ERROR: &str = "reviewer.schema_error";
    /// The report document was exported.
    pub const REVIEWER_PDF_GENERATED: &str = "reviewer.pdf_generated";
    /// The report document export failed.
    pub const REVIEWER_EXPORT_ERROR: &str = "reviewer.export_error";
    /// Moderation flagged the summary.
    pub const REVIEWER_MODERATION_FLAG: &str = "reviewer.moderation_flag";
    /// The narrative article was produced.
    pub const NARRATIVE_WRITER_SUCCESS: &str = "narrative_writer.success";
    /// Narrative generation failed.
    pub const NARRATIVE_WRITER_ERROR: &str = "narrative_writer.error";
    /// The run degraded to a partial summary.
    pub const GRAPH_PARTIAL_SUMMARY: &str = "graph.partial_summary";
    /// The circuit breaker short-circuited the run.
    pub const GRAPH_CIRCUIT_OPEN: &str = "graph.circuit_open";
    /// The run finished.
    pub const GRAPH_RUN_COMPLETE: &str = "graph.run_complete";
}
