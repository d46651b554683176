//! The research run orchestrator.

use futures::FutureExt;
use serde_json::json;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error, info, info_span, warn, Instrument};

use super::routing::{PipelineStep, Router};
use crate::config::ResearchConfig;
use crate::core::{RunState, Violation, ViolationKind};
use crate::errors::ConfigError;
use crate::events::{steps, AuditSink, NoOpAuditSink, RunSummary};
use crate::providers::{DocumentExporter, SearchProvider};
use crate::resilience::{CircuitBreaker, ResilientGenerator};
use crate::stages::{
    AnalyzeStage, NarrateStage, PartialSummaryStage, ResearchStage, ReviewStage, Stage,
    StageContext, StageOutcome, SynthesizeStage,
};

/// Runs a query through the stages and always returns a state.
///
/// Nothing escapes a run: stage problems arrive as degraded outcomes and
/// panics are isolated per stage. The circuit breaker is shared across runs
/// and is consulted once, before the first stage.
pub struct ResearchPipeline {
    stages: HashMap<PipelineStep, Arc<dyn Stage>>,
    router: Router,
    breaker: Arc<CircuitBreaker>,
    audit: Arc<dyn AuditSink>,
}

impl std::fmt::Debug for ResearchPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResearchPipeline")
            .field("router", &self.router)
            .field("breaker", &self.breaker)
            .finish_non_exhaustive()
    }
}

impl ResearchPipeline {
    /// Returns a builder.
    #[must_use]
    pub fn builder() -> ResearchPipelineBuilder {
        ResearchPipelineBuilder::new()
    }

    /// Wires the HTTP collaborators, the file-backed cache and the JSONL
    /// audit trail from configuration.
    #[cfg(feature = "http")]
    pub fn from_config(config: ResearchConfig) -> Result<Self, crate::errors::ResearchflowError> {
        config.validate()?;
        let search = Arc::new(crate::providers::SerpApiSearch::new(&config.search)?);
        Self::from_config_with_search(config, search)
    }

    /// Like [`ResearchPipeline::from_config`], with a caller-supplied search
    /// collaborator such as [`crate::providers::LocalDocsSearch`].
    #[cfg(feature = "http")]
    pub fn from_config_with_search(
        config: ResearchConfig,
        search: Arc<dyn SearchProvider>,
    ) -> Result<Self, crate::errors::ResearchflowError> {
        use crate::events::{FanoutAuditSink, JsonlAuditSink, LoggingAuditSink};
        use crate::providers::{ChatCompletionsTransport, MarkdownExporter};
        use crate::resilience::JsonFileResponseCache;

        config.validate()?;
        let transport = Arc::new(ChatCompletionsTransport::new(&config.generation)?);
        let cache = Arc::new(JsonFileResponseCache::new(config.artifacts.cache_path()));
        let generator = ResilientGenerator::new(transport, cache).with_retry(config.retry.clone());
        let exporter = Arc::new(MarkdownExporter::new(config.artifacts.directory.clone()));
        let audit = FanoutAuditSink::new()
            .with_sink(Arc::new(JsonlAuditSink::new(
                config.artifacts.trace_path(),
                config.artifacts.summary_path(),
            )))
            .with_sink(Arc::new(LoggingAuditSink::debug()));

        Ok(Self::builder()
            .config(config)
            .search(search)
            .generator(Arc::new(generator))
            .exporter(exporter)
            .audit(Arc::new(audit))
            .build()?)
    }

    /// The shared circuit breaker.
    #[must_use]
    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    /// The router.
    #[must_use]
    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Runs a fresh state for `query`.
    pub async fn run(&self, query: impl Into<String>) -> RunState {
        self.run_state(RunState::new(query)).await
    }

    /// Runs an existing state to completion.
    pub async fn run_state(&self, state: RunState) -> RunState {
        let span = info_span!("research_run", query = %state.query);
        self.drive(state).instrument(span).await
    }

    async fn drive(&self, mut state: RunState) -> RunState {
        let ctx = StageContext::new(Arc::clone(&self.audit));

        if self.breaker.is_open() {
            warn!(failures = self.breaker.failures(), "Circuit breaker open, skipping run");
            state.record_violation(Violation::circuit_open());
            ctx.emit(
                steps::GRAPH_CIRCUIT_OPEN,
                json!({"failures": self.breaker.failures()}),
            )
            .await;
            self.finish(&state, &ctx).await;
            return state;
        }

        info!(run_id = %ctx.run_id, "Run started");
        let mut step = PipelineStep::Research;
        while !step.is_terminal() {
            let Some(stage) = self.stages.get(&step) else {
                break;
            };

            let outcome = Self::execute_isolated(stage.as_ref(), state, &ctx).await;
            if step == PipelineStep::Research
                && (outcome.has_kind(ViolationKind::ToolFailure)
                    || outcome.has_kind(ViolationKind::StageFailure))
            {
                let failures = self.breaker.record_failure();
                debug!(failures, "Research failure recorded on circuit breaker");
            }
            state = outcome.into_state();

            let next = self.router.next(step, &state);
            debug!(
                from = %step,
                to = %next,
                failure_count = state.failure_count(),
                "Routing"
            );
            step = next;
        }

        self.finish(&state, &ctx).await;
        state
    }

    /// Executes a stage on a copy of the state. A panic discards the copy
    /// and degrades with the stage's failure marker.
    async fn execute_isolated(stage: &dyn Stage, state: RunState, ctx: &StageContext) -> StageOutcome {
        debug!(stage = stage.name(), "Stage started");
        let attempt = AssertUnwindSafe(stage.execute(state.clone(), ctx)).catch_unwind();
        match attempt.await {
            Ok(outcome) => {
                if !outcome.is_success() {
                    let markers: Vec<&str> =
                        outcome.violations().iter().map(|v| v.marker.as_str()).collect();
                    warn!(stage = stage.name(), violations = ?markers, "Stage degraded");
                }
                outcome
            }
            Err(_) => {
                error!(stage = stage.name(), "Stage panicked");
                StageOutcome::degraded(state, Violation::stage_failed(stage.failure_marker()))
            }
        }
    }

    async fn finish(&self, state: &RunState, ctx: &StageContext) {
        info!(
            result_keys = ?state.output_keys(),
            violations = state.violations().len(),
            schema_ok = state.schema_ok(),
            "Run complete"
        );
        ctx.emit(
            steps::GRAPH_RUN_COMPLETE,
            json!({
                "query": state.query,
                "result_keys": state.output_keys(),
                "violations": state.violations(),
            }),
        )
        .await;
        self.audit.write_summary(&RunSummary::from_state(state)).await;
    }
}

/// Builder for [`ResearchPipeline`].
#[derive(Default)]
pub struct ResearchPipelineBuilder {
    config: ResearchConfig,
    search: Option<Arc<dyn SearchProvider>>,
    generator: Option<Arc<ResilientGenerator>>,
    exporter: Option<Arc<dyn DocumentExporter>>,
    audit: Option<Arc<dyn AuditSink>>,
    breaker: Option<Arc<CircuitBreaker>>,
    overrides: HashMap<PipelineStep, Arc<dyn Stage>>,
}

impl ResearchPipelineBuilder {
    /// Creates an empty builder with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the configuration.
    #[must_use]
    pub fn config(mut self, config: ResearchConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the search collaborator.
    #[must_use]
    pub fn search(mut self, search: Arc<dyn SearchProvider>) -> Self {
        self.search = Some(search);
        self
    }

    /// Sets the generation client shared by Synthesize and Narrate.
    #[must_use]
    pub fn generator(mut self, generator: Arc<ResilientGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    /// Sets the document exporter.
    #[must_use]
    pub fn exporter(mut self, exporter: Arc<dyn DocumentExporter>) -> Self {
        self.exporter = Some(exporter);
        self
    }

    /// Sets the audit sink. Defaults to discarding events.
    #[must_use]
    pub fn audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Shares a circuit breaker with other pipelines. Defaults to a fresh
    /// breaker with the configured threshold.
    #[must_use]
    pub fn breaker(mut self, breaker: Arc<CircuitBreaker>) -> Self {
        self.breaker = Some(breaker);
        self
    }

    /// Replaces the stage run at `step`.
    #[must_use]
    pub fn stage(mut self, step: PipelineStep, stage: Arc<dyn Stage>) -> Self {
        self.overrides.insert(step, stage);
        self
    }

    /// Builds the pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Missing`] if the search, generation or export
    /// collaborator was not provided, or the configuration is invalid.
    pub fn build(self) -> Result<ResearchPipeline, ConfigError> {
        self.config.validate()?;
        let search = self.search.ok_or_else(|| ConfigError::missing("search provider"))?;
        let generator = self.generator.ok_or_else(|| ConfigError::missing("generator"))?;
        let exporter = self.exporter.ok_or_else(|| ConfigError::missing("document exporter"))?;

        let config = &self.config;
        let mut stages: HashMap<PipelineStep, Arc<dyn Stage>> = HashMap::from([
            (
                PipelineStep::Research,
                Arc::new(ResearchStage::from_config(search, &config.search)) as Arc<dyn Stage>,
            ),
            (
                PipelineStep::Analyze,
                Arc::new(AnalyzeStage::new(config.pipeline.fact_char_limit)),
            ),
            (
                PipelineStep::Synthesize,
                Arc::new(SynthesizeStage::from_config(
                    Arc::clone(&generator),
                    &config.generation,
                    &config.pipeline,
                )),
            ),
            (PipelineStep::Review, Arc::new(ReviewStage::new(exporter))),
            (
                PipelineStep::Narrate,
                Arc::new(NarrateStage::from_config(
                    generator,
                    &config.generation,
                    &config.pipeline,
                )),
            ),
            (PipelineStep::PartialSummary, Arc::new(PartialSummaryStage)),
        ]);
        stages.extend(self.overrides);

        Ok(ResearchPipeline {
            stages,
            router: Router::new(config.pipeline.failure_threshold),
            breaker: self
                .breaker
                .unwrap_or_else(|| Arc::new(CircuitBreaker::new(config.pipeline.breaker_threshold))),
            audit: self.audit.unwrap_or_else(|| Arc::new(NoOpAuditSink)),
        })
    }
}
