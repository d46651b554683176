//! Audit sink trait and implementations.

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn, Level};

use crate::core::RunState;
use crate::utils::iso_timestamp;

/// Summary persisted at the end of every run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    /// The query the run answered.
    pub query: String,
    /// Final outputs mapping.
    pub outputs: serde_json::Value,
    /// Violation trail.
    pub violations: Vec<String>,
    /// Tools used, in order.
    pub tools_used: Vec<String>,
}

impl RunSummary {
    /// Builds a summary from a finished run state.
    #[must_use]
    pub fn from_state(state: &RunState) -> Self {
        Self {
            query: state.query.clone(),
            outputs: serde_json::to_value(state.outputs()).unwrap_or_default(),
            violations: state.violations().to_vec(),
            tools_used: state.tools_used().to_vec(),
        }
    }
}

/// Receives structured trace events and run summaries.
///
/// Both operations are best effort: implementations log failures and never
/// surface them to the pipeline.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Appends a trace event for a pipeline step.
    async fn append_event(&self, step: &str, data: serde_json::Value);

    /// Persists the summary of a finished run.
    async fn write_summary(&self, summary: &RunSummary);
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpAuditSink;

#[async_trait]
impl AuditSink for NoOpAuditSink {
    async fn append_event(&self, _step: &str, _data: serde_json::Value) {}

    async fn write_summary(&self, _summary: &RunSummary) {}
}

/// Logs events through `tracing`.
#[derive(Debug, Clone)]
pub struct LoggingAuditSink {
    level: Level,
}

impl Default for LoggingAuditSink {
    fn default() -> Self {
        Self { level: Level::INFO }
    }
}

impl LoggingAuditSink {
    /// Creates a logging sink with the specified level.
    #[must_use]
    pub fn new(level: Level) -> Self {
        Self { level }
    }

    /// Creates a debug-level logging sink.
    #[must_use]
    pub fn debug() -> Self {
        Self::new(Level::DEBUG)
    }
}

#[async_trait]
impl AuditSink for LoggingAuditSink {
    async fn append_event(&self, step: &str, data: serde_json::Value) {
        if self.level == Level::DEBUG {
            debug!(step, data = %data, "Trace event");
        } else {
            info!(step, data = %data, "Trace event");
        }
    }

    async fn write_summary(&self, summary: &RunSummary) {
        info!(
            query = %summary.query,
            violations = ?summary.violations,
            tools_used = ?summary.tools_used,
            "Run summary"
        );
    }
}

/// Collects events and summaries in memory, for tests.
#[derive(Debug, Default)]
pub struct CollectingAuditSink {
    events: RwLock<Vec<(String, serde_json::Value)>>,
    summaries: RwLock<Vec<RunSummary>>,
}

impl CollectingAuditSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All collected events.
    #[must_use]
    pub fn events(&self) -> Vec<(String, serde_json::Value)> {
        self.events.read().clone()
    }

    /// Step names of the collected events, in order.
    #[must_use]
    pub fn steps(&self) -> Vec<String> {
        self.events.read().iter().map(|(s, _)| s.clone()).collect()
    }

    /// Data of every event with the given step name.
    #[must_use]
    pub fn events_for(&self, step: &str) -> Vec<serde_json::Value> {
        self.events
            .read()
            .iter()
            .filter(|(s, _)| s == step)
            .map(|(_, d)| d.clone())
            .collect()
    }

    /// All collected summaries.
    #[must_use]
    pub fn summaries(&self) -> Vec<RunSummary> {
        self.summaries.read().clone()
    }

    /// Returns true if nothing has been collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty() && self.summaries.read().is_empty()
    }
}

#[async_trait]
impl AuditSink for CollectingAuditSink {
    async fn append_event(&self, step: &str, data: serde_json::Value) {
        self.events.write().push((step.to_string(), data));
    }

    async fn write_summary(&self, summary: &RunSummary) {
        self.summaries.write().push(summary.clone());
    }
}

/// Appends `{time, step, data}` JSON lines to a trace file and writes run
/// summaries as pretty JSON.
///
/// Writes run on the blocking thread pool, serialized by one lock.
#[derive(Debug, Clone)]
pub struct JsonlAuditSink {
    files: Arc<JsonlFiles>,
}

#[derive(Debug)]
struct JsonlFiles {
    trace_path: PathBuf,
    summary_path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlAuditSink {
    /// Creates a sink writing to the given files.
    #[must_use]
    pub fn new(trace_path: impl Into<PathBuf>, summary_path: impl Into<PathBuf>) -> Self {
        Self {
            files: Arc::new(JsonlFiles {
                trace_path: trace_path.into(),
                summary_path: summary_path.into(),
                write_lock: Mutex::new(()),
            }),
        }
    }

    /// The trace file.
    #[must_use]
    pub fn trace_path(&self) -> &Path {
        &self.files.trace_path
    }

    /// The summary file.
    #[must_use]
    pub fn summary_path(&self) -> &Path {
        &self.files.summary_path
    }
}

impl JsonlFiles {
    fn ensure_parent(path: &Path) -> std::io::Result<()> {
        match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => std::fs::create_dir_all(parent),
            _ => Ok(()),
        }
    }

    fn append_line(&self, line: &str) -> std::io::Result<()> {
        let _guard = self.write_lock.lock();
        Self::ensure_parent(&self.trace_path)?;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.trace_path)?;
        writeln!(file, "{line}")
    }

    fn write_summary(&self, json: &str) -> std::io::Result<()> {
        let _guard = self.write_lock.lock();
        Self::ensure_parent(&self.summary_path)?;
        std::fs::write(&self.summary_path, json)
    }
}

#[async_trait]
impl AuditSink for JsonlAuditSink {
    async fn append_event(&self, step: &str, data: serde_json::Value) {
        let line = serde_json::json!({
            "time": iso_timestamp(),
            "step": step,
            "data": data,
        })
        .to_string();
        let files = Arc::clone(&self.files);
        let result = tokio::task::spawn_blocking(move || files.append_line(&line))
            .await
            .map_err(std::io::Error::other)
            .and_then(|r| r);
        if let Err(e) = result {
            warn!(path = %self.files.trace_path.display(), step, error = %e, "Failed to append trace event");
        }
    }

    async fn write_summary(&self, summary: &RunSummary) {
        let files = Arc::clone(&self.files);
        let result = match serde_json::to_string_pretty(summary) {
            Ok(json) => tokio::task::spawn_blocking(move || files.write_summary(&json))
                .await
                .map_err(std::io::Error::other)
                .and_then(|r| r),
            Err(e) => Err(std::io::Error::other(e)),
        };
        if let Err(e) = result {
            warn!(path = %self.files.summary_path.display(), error = %e, "Failed to write run summary");
        }
    }
}

/// Forwards every call to each inner sink in order.
#[derive(Default, Clone)]
pub struct FanoutAuditSink {
    sinks: Vec<Arc<dyn AuditSink>>,
}

impl std::fmt::Debug for FanoutAuditSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FanoutAuditSink")
            .field("sinks", &self.sinks.len())
            .finish()
    }
}

impl FanoutAuditSink {
    /// Creates an empty fan-out.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a sink.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

#[async_trait]
impl AuditSink for FanoutAuditSink {
    async fn append_event(&self, step: &str, data: serde_json::Value) {
        for sink in &self.sinks {
            sink.append_event(step, data.clone()).await;
        }
    }

    async fn write_summary(&self, summary: &RunSummary) {
        for sink in &self.sinks {
            sink.write_summary(summary).await;
        }
    }
}
