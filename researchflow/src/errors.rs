//! Error types for the researchflow pipeline.
//!
//! Errors in this module describe failures of individual collaborators
//! (search, generation, export, configuration). None of them escape a run:
//! stages convert them into [`Violation`](crate::core::Violation) entries on
//! the run state. They surface directly only while building an orchestrator
//! or at the process boundary.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The umbrella error type for researchflow operations.
#[derive(Debug, Error)]
pub enum ResearchflowError {
    /// Configuration could not be loaded or is incomplete.
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// A generation request failed.
    #[error("{0}")]
    Generation(#[from] GenerationError),

    /// A search request failed.
    #[error("{0}")]
    Search(#[from] SearchError),

    /// A document export failed.
    #[error("{0}")]
    Export(#[from] ExportError),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by the generation transport.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GenerationError {
    /// The provider rejected the request because of rate limits (HTTP 429).
    #[error("Generation rate limited")]
    RateLimited,

    /// The provider is transiently unavailable (HTTP 502/503/504).
    #[error("Generation service unavailable (status {status})")]
    Unavailable {
        /// The HTTP status code.
        status: u16,
    },

    /// The request exceeded its timeout.
    #[error("Generation request timed out")]
    Timeout,

    /// The provider returned a non-retryable error.
    #[error("Generation API error {status}: {body}")]
    Api {
        /// The HTTP status code.
        status: u16,
        /// The response body.
        body: String,
    },

    /// The request could not be sent.
    #[error("Generation transport error: {0}")]
    Transport(String),

    /// The response could not be decoded.
    #[error("Generation decode error: {0}")]
    Decode(String),
}

impl GenerationError {
    /// Returns true if the failure class is worth retrying.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited | Self::Unavailable { .. } | Self::Timeout)
    }

    /// Classifies an HTTP status code returned by the provider.
    #[must_use]
    pub fn from_status(status: u16, body: impl Into<String>) -> Self {
        match status {
            429 => Self::RateLimited,
            502..=504 => Self::Unavailable { status },
            _ => Self::Api {
                status,
                body: body.into(),
            },
        }
    }
}

/// Errors raised by the search collaborator.
#[derive(Debug, Clone, Error)]
pub enum SearchError {
    /// The search API answered with a non-success status.
    #[error("Search API error {status}: {body}")]
    Http {
        /// The HTTP status code.
        status: u16,
        /// The response body.
        body: String,
    },

    /// The request could not be sent.
    #[error("Search transport error: {0}")]
    Transport(String),

    /// The response could not be decoded.
    #[error("Search decode error: {0}")]
    Decode(String),

    /// No API key was configured.
    #[error("Search API key not configured")]
    MissingCredentials,

    /// A local document directory could not be read.
    #[error("Local documents error: {0}")]
    LocalDocs(String),
}

/// Errors raised while exporting a report document.
#[derive(Debug, Error)]
pub enum ExportError {
    /// The document could not be written.
    #[error("Export IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The document could not be rendered.
    #[error("Export render error: {0}")]
    Render(String),
}

/// Errors raised while loading configuration or wiring collaborators.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required setting is missing.
    #[error("Missing required setting: {0}")]
    Missing(String),

    /// A setting has an invalid value.
    #[error("Invalid setting '{key}': {reason}")]
    Invalid {
        /// The setting name.
        key: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// The configuration file could not be read.
    #[error("Config IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration file could not be parsed.
    #[error("Config parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

impl ConfigError {
    /// Creates a missing-setting error.
    #[must_use]
    pub fn missing(name: impl Into<String>) -> Self {
        Self::Missing(name.into())
    }

    /// Creates an invalid-setting error.
    #[must_use]
    pub fn invalid(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

/// A single structural problem found while validating a report candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaIssue {
    /// Dotted path of the offending field (e.g. `facts.0.url`).
    pub path: String,
    /// What is wrong with it.
    pub message: String,
}

impl SchemaIssue {
    /// Creates a new schema issue.
    #[must_use]
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for SchemaIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Error raised when a report candidate does not match the report contract.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{} validation error(s) for Report: {}", issues.len(), render_issues(issues))]
pub struct SchemaError {
    /// Every issue found, in document order.
    pub issues: Vec<SchemaIssue>,
}

impl SchemaError {
    /// Creates a schema error from collected issues.
    #[must_use]
    pub fn new(issues: Vec<SchemaIssue>) -> Self {
        Self { issues }
    }

    /// Returns true if any issue concerns the given path.
    #[must_use]
    pub fn mentions(&self, path: &str) -> bool {
        self.issues.iter().any(|i| i.path == path)
    }
}

fn render_issues(issues: &[SchemaIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
