//! Testing utilities for researchflow pipelines.
//!
//! This module provides:
//! - Stub search, generation and export collaborators with call counters
//! - A panicking stage for isolation tests
//! - Sample hits and a report candidate that passes validation

mod mocks;

pub use mocks::{
    generator_over, sample_hits, stub_generator, valid_report_json, FailingExporter,
    PanickingStage, RecordingExporter, StubSearch, StubTransport,
};
