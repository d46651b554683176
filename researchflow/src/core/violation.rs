//! Violations: append-only audit entries for recoverable failures and flags.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Classification of a violation. The kind decides which state flags and
/// counters recording it touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    /// An external tool (search, generation) was unavailable.
    ToolFailure,
    /// Generation output was not extractable JSON.
    ParseFailure,
    /// A stage failed unexpectedly and was isolated.
    StageFailure,
    /// The report candidate did not match the report contract.
    SchemaViolation,
    /// Moderation flagged the content.
    PolicyViolation,
    /// A stage found none of the input it needs.
    MissingInput,
    /// The document export side effect failed.
    ExportFailure,
    /// The circuit breaker short-circuited the run.
    CircuitOpen,
}

impl ViolationKind {
    /// Returns true if recording this kind counts against the failure budget.
    #[must_use]
    pub fn counts_as_failure(&self) -> bool {
        matches!(self, Self::ToolFailure | Self::ParseFailure | Self::StageFailure)
    }

    /// Returns true if recording this kind marks the run as having a tool error.
    #[must_use]
    pub fn is_tool_error(&self) -> bool {
        matches!(self, Self::ToolFailure | Self::ParseFailure)
    }
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ToolFailure => write!(f, "tool_failure"),
            Self::ParseFailure => write!(f, "parse_failure"),
            Self::StageFailure => write!(f, "stage_failure"),
            Self::SchemaViolation => write!(f, "schema_violation"),
            Self::PolicyViolation => write!(f, "policy_violation"),
            Self::MissingInput => write!(f, "missing_input"),
            Self::ExportFailure => write!(f, "export_failure"),
            Self::CircuitOpen => write!(f, "circuit_open"),
        }
    }
}

/// A recoverable failure or policy flag raised by a stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    /// What kind of violation this is.
    pub kind: ViolationKind,
    /// The marker appended to the run's violation trail.
    pub marker: String,
}

impl Violation {
    /// Creates a new violation.
    #[must_use]
    pub fn new(kind: ViolationKind, marker: impl Into<String>) -> Self {
        Self {
            kind,
            marker: marker.into(),
        }
    }

    /// The circuit breaker was open when the run started.
    #[must_use]
    pub fn circuit_open() -> Self {
        Self::new(ViolationKind::CircuitOpen, "circuit_breaker_open")
    }

    /// Retrieval failed as a whole.
    #[must_use]
    pub fn research_failed(reason: impl fmt::Display) -> Self {
        Self::new(ViolationKind::ToolFailure, format!("researcher_failed: {reason}"))
    }

    /// The synthesized output could not be turned into a JSON object.
    #[must_use]
    pub fn writer_parse_failure() -> Self {
        Self::new(ViolationKind::ParseFailure, "writer_json_parse_failure")
    }

    /// Review found no raw candidate.
    #[must_use]
    pub fn no_report() -> Self {
        Self::new(ViolationKind::MissingInput, "no_report")
    }

    /// The candidate failed schema validation.
    #[must_use]
    pub fn schema_error(reason: impl fmt::Display) -> Self {
        Self::new(ViolationKind::SchemaViolation, format!("schema_error: {reason}"))
    }

    /// The export side effect failed.
    #[must_use]
    pub fn export_failed(reason: impl fmt::Display) -> Self {
        Self::new(ViolationKind::ExportFailure, format!("export_failed: {reason}"))
    }

    /// Moderation flagged the summary.
    #[must_use]
    pub fn policy(reason: impl fmt::Display) -> Self {
        Self::new(ViolationKind::PolicyViolation, format!("policy_violation:{reason}"))
    }

    /// Narrate found no canonical report.
    #[must_use]
    pub fn no_structured_report() -> Self {
        Self::new(ViolationKind::MissingInput, "no_structured_report")
    }

    /// Narrative generation failed.
    #[must_use]
    pub fn narrative_failed() -> Self {
        Self::new(ViolationKind::ToolFailure, "narrative_writer_failed")
    }

    /// A stage failed unexpectedly; `marker` names it (e.g. `analyst_failed`).
    #[must_use]
    pub fn stage_failed(marker: impl Into<String>) -> Self {
        Self::new(ViolationKind::StageFailure, marker)
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.marker)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_accounting_by_kind() {
        assert!(ViolationKind::ToolFailure.counts_as_failure());
        assert!(ViolationKind::ParseFailure.counts_as_failure());
        assert!(ViolationKind::StageFailure.counts_as_failure());
        assert!(!ViolationKind::SchemaViolation.counts_as_failure());
        assert!(!ViolationKind::PolicyViolation.counts_as_failure());
        assert!(!ViolationKind::MissingInput.counts_as_failure());
        assert!(!ViolationKind::CircuitOpen.counts_as_failure());
    }

    #[test]
    fn test_markers() {
        assert_eq!(Violation::circuit_open().marker, "circuit_breaker_open");
        assert_eq!(
            Violation::research_failed("timeout").marker,
            "researcher_failed: timeout"
        );
        assert_eq!(
            Violation::policy("contains profanity").marker,
            "policy_violation:contains profanity"
        );
        assert_eq!(Violation::stage_failed("analyst_failed").kind, ViolationKind::StageFailure);
    }

    #[test]
    fn test_kind_serialize() {
        let json = serde_json::to_string(&ViolationKind::SchemaViolation).unwrap();
        assert_eq!(json, r#""schema_violation""#);
        assert_eq!(ViolationKind::PolicyViolation.to_string(), "policy_violation");
    }
}
