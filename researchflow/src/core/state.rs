//! The run state threaded through every pipeline stage.

use super::artifact::{keys, Artifact};
use super::models::{Document, ExportHandle, Fact, PartialReport, Report};
use super::violation::{Violation, ViolationKind};
use serde::Serialize;
use std::collections::BTreeMap;

/// State owned by a single run.
///
/// Stages receive the state by value and hand it back, so one run owns it at
/// any time. The audit trails (`tools_used`, `violations`) are append-only
/// and `failure_count` never decreases; those fields are private and only
/// reachable through methods that keep those guarantees.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunState {
    /// The free-text research query.
    pub query: String,
    /// Retrieved text, in retrieval order.
    pub context: Vec<String>,
    /// Retrieved documents, in retrieval order.
    pub docs: Vec<Document>,
    /// Whether the query needs clarification from the caller.
    pub needs_disambiguation: bool,
    tools_used: Vec<String>,
    violations: Vec<String>,
    outputs: BTreeMap<String, Artifact>,
    tool_error: bool,
    failure_count: u32,
    policy_violation: bool,
    schema_ok: bool,
}

impl RunState {
    /// Creates a fresh state for a query.
    #[must_use]
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            context: Vec::new(),
            docs: Vec::new(),
            needs_disambiguation: false,
            tools_used: Vec::new(),
            violations: Vec::new(),
            outputs: BTreeMap::new(),
            tool_error: false,
            failure_count: 0,
            policy_violation: false,
            schema_ok: false,
        }
    }

    /// Starts the state with a pre-spent failure budget.
    ///
    /// Used to resume a run or to exercise the degraded route.
    #[must_use]
    pub fn with_failure_count(mut self, failures: u32) -> Self {
        self.failure_count = self.failure_count.max(failures);
        self
    }

    /// Tools used so far, in order.
    #[must_use]
    pub fn tools_used(&self) -> &[String] {
        &self.tools_used
    }

    /// The violation trail, in order.
    #[must_use]
    pub fn violations(&self) -> &[String] {
        &self.violations
    }

    /// The output mapping.
    #[must_use]
    pub fn outputs(&self) -> &BTreeMap<String, Artifact> {
        &self.outputs
    }

    /// Whether any external tool failed during the run.
    #[must_use]
    pub fn tool_error(&self) -> bool {
        self.tool_error
    }

    /// Number of failures recorded so far.
    #[must_use]
    pub fn failure_count(&self) -> u32 {
        self.failure_count
    }

    /// Whether moderation flagged the run's content.
    #[must_use]
    pub fn policy_violation(&self) -> bool {
        self.policy_violation
    }

    /// Whether the report candidate passed schema validation.
    #[must_use]
    pub fn schema_ok(&self) -> bool {
        self.schema_ok
    }

    /// Records that a tool was used.
    pub fn record_tool(&mut self, tool: impl Into<String>) {
        self.tools_used.push(tool.into());
    }

    /// Appends a violation and applies the flags and counters for its kind.
    pub fn record_violation(&mut self, violation: Violation) {
        if violation.kind.counts_as_failure() {
            self.failure_count = self.failure_count.saturating_add(1);
        }
        if violation.kind.is_tool_error() {
            self.tool_error = true;
        }
        match violation.kind {
            ViolationKind::SchemaViolation => self.schema_ok = false,
            ViolationKind::PolicyViolation => self.policy_violation = true,
            _ => {}
        }
        self.violations.push(violation.marker);
    }

    /// Returns true if the violation trail contains a marker starting with `prefix`.
    #[must_use]
    pub fn has_violation(&self, prefix: &str) -> bool {
        self.violations.iter().any(|v| v.starts_with(prefix))
    }

    /// Stores an artifact under a key, replacing any previous value.
    pub fn set_output(&mut self, key: impl Into<String>, artifact: Artifact) {
        self.outputs.insert(key.into(), artifact);
    }

    /// Returns the artifact stored under `key`.
    #[must_use]
    pub fn output(&self, key: &str) -> Option<&Artifact> {
        self.outputs.get(key)
    }

    /// Returns true if an artifact is stored under `key`.
    #[must_use]
    pub fn has_output(&self, key: &str) -> bool {
        self.outputs.contains_key(key)
    }

    /// Output keys in sorted order.
    #[must_use]
    pub fn output_keys(&self) -> Vec<String> {
        self.outputs.keys().cloned().collect()
    }

    /// Extracted facts, if Analyze ran.
    #[must_use]
    pub fn facts(&self) -> Option<&[Fact]> {
        match self.outputs.get(keys::FACTS) {
            Some(Artifact::Facts(facts)) => Some(facts),
            _ => None,
        }
    }

    /// The raw report candidate, if Synthesize produced one.
    #[must_use]
    pub fn raw_report(&self) -> Option<&serde_json::Value> {
        match self.outputs.get(keys::REPORT_RAW) {
            Some(Artifact::RawReport(raw)) => Some(raw),
            _ => None,
        }
    }

    /// The canonical report, if Review promoted one.
    #[must_use]
    pub fn report(&self) -> Option<&Report> {
        match self.outputs.get(keys::REPORT) {
            Some(Artifact::Report(report)) => Some(report),
            _ => None,
        }
    }

    /// Promotes a validated report and marks the schema gate as passed.
    pub fn promote_report(&mut self, report: Report) {
        self.outputs.insert(keys::REPORT.to_string(), Artifact::Report(report));
        self.schema_ok = true;
    }

    /// The narrative article, if Narrate produced one.
    #[must_use]
    pub fn article(&self) -> Option<&str> {
        match self.outputs.get(keys::ARTICLE) {
            Some(Artifact::Article(text)) => Some(text),
            _ => None,
        }
    }

    /// The partial report, if the run degraded.
    #[must_use]
    pub fn partial_report(&self) -> Option<&PartialReport> {
        match self.outputs.get(keys::REPORT_PARTIAL) {
            Some(Artifact::Partial(partial)) => Some(partial),
            _ => None,
        }
    }

    /// The exported document handle, if export succeeded.
    #[must_use]
    pub fn export_handle(&self) -> Option<&ExportHandle> {
        match self.outputs.get(keys::PDF_REPORT) {
            Some(Artifact::Export(handle)) => Some(handle),
            _ => None,
        }
    }
}
