//! Run orchestration.
//!
//! This module provides:
//! - The finite-state routing between stages
//! - The orchestrator that drives a run and isolates stage failures
//! - The builder that wires collaborators into stages

mod integration_tests;
mod orchestrator;
mod routing;

pub use orchestrator::{ResearchPipeline, ResearchPipelineBuilder};
pub use routing::{PipelineStep, Router};
