//! Core domain model types for researchflow.
//!
//! This module contains the fundamental types used throughout the pipeline:
//! - The run state threaded through every stage
//! - Documents, facts and reports
//! - Output artifacts and their well-known keys
//! - Violations and their classification

mod artifact;
mod models;
mod state;
mod violation;

pub use artifact::{keys, Artifact};
pub use models::{Document, ExportHandle, Fact, PartialReport, Report, SearchHit};
pub use state::RunState;
pub use violation::{Violation, ViolationKind};
