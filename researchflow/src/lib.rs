//! # Researchflow
//!
//! A resilient multi-stage research pipeline.
//!
//! A free-text query goes through web retrieval, fact extraction, LLM
//! synthesis, schema validation with moderation, and narrative generation.
//! Runs degrade instead of failing:
//!
//! - **Stage isolation**: every stage returns a success or degraded outcome,
//!   and a panicking stage is contained and recorded as a violation
//! - **Routing**: once the failure budget is spent after synthesis, the run
//!   produces a partial report instead of a reviewed one
//! - **Resilient generation**: retries with backoff and a content-addressed
//!   response cache around the model transport
//! - **Circuit breaker**: a process-wide gate that skips runs after repeated
//!   retrieval failures
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use researchflow::prelude::*;
//!
//! let pipeline = ResearchPipeline::from_config(ResearchConfig::from_env()?)?;
//! let state = pipeline.run("electric vehicle adoption 2024").await;
//!
//! if state.schema_ok() {
//!     println!("{}", state.report().unwrap().title);
//! }
//! println!("violations: {:?}", state.violations());
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod config;
pub mod core;
pub mod errors;
pub mod events;
pub mod guardrails;
pub mod pipeline;
pub mod providers;
pub mod resilience;
pub mod stages;
pub mod testing;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::ResearchConfig;
    pub use crate::core::{
        keys, Artifact, Document, ExportHandle, Fact, PartialReport, Report, RunState,
        SearchHit, Violation, ViolationKind,
    };
    pub use crate::errors::{
        ConfigError, ExportError, GenerationError, ResearchflowError, SchemaError, SearchError,
    };
    pub use crate::events::{AuditSink, CollectingAuditSink, JsonlAuditSink, RunSummary};
    pub use crate::pipeline::{PipelineStep, ResearchPipeline, ResearchPipelineBuilder, Router};
    pub use crate::providers::{DocumentExporter, GenerationTransport, SearchProvider};
    pub use crate::resilience::{CircuitBreaker, ResilientGenerator, ResponseCache, RetryConfig};
    pub use crate::stages::{Stage, StageContext, StageOutcome};
}
