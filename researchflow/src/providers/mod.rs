//! External collaborators: search, generation transport and document export.
//!
//! Search comes from SerpAPI over HTTP or from a local document directory.
//!
//! Each collaborator is an async trait held as `Arc<dyn ..>` by the
//! pipeline, so concrete HTTP clients can be swapped for stubs in tests.

mod exporter;
mod local;
mod messages;

#[cfg(feature = "http")]
mod chat_completions;
#[cfg(feature = "http")]
mod serpapi;

pub use exporter::{export_file_name, MarkdownExporter};
pub use local::LocalDocsSearch;
pub use messages::{ChatMessage, GenerationRequest, Role};

#[cfg(feature = "http")]
pub use chat_completions::ChatCompletionsTransport;
#[cfg(feature = "http")]
pub use serpapi::{html_to_text, SerpApiSearch};

use async_trait::async_trait;

use crate::core::{ExportHandle, Report, SearchHit};
use crate::errors::{ExportError, GenerationError, SearchError};

/// Sends a single generation request to a model.
///
/// Implementations perform exactly one attempt; retries and caching are
/// layered on top by [`crate::resilience::ResilientGenerator`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GenerationTransport: Send + Sync {
    /// Returns the generated text.
    async fn complete(&self, request: &GenerationRequest) -> Result<String, GenerationError>;
}

/// Web search and page retrieval.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Returns up to `top_k` ranked hits for the query.
    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<SearchHit>, SearchError>;

    /// Returns the readable text of a page.
    ///
    /// Best effort: any failure yields an empty string.
    async fn fetch(&self, url: &str) -> String;
}

/// Renders a validated report into a document.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DocumentExporter: Send + Sync {
    /// Exports the report and returns a handle to the document.
    async fn export(&self, report: &Report, query: &str) -> Result<ExportHandle, ExportError>;
}
