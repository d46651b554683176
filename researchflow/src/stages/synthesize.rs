//! Report synthesis through the generation client.

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::{info, warn};

use super::{Stage, StageContext, StageOutcome};
use crate::config::{GenerationConfig, PipelineConfig};
use crate::core::{keys, Artifact, Fact, RunState, Violation};
use crate::events::steps;
use crate::guardrails::redact_pii;
use crate::providers::{ChatMessage, GenerationRequest};
use crate::resilience::ResilientGenerator;
use crate::utils::{extract_json_object, iso_timestamp};

const SYSTEM_PROMPT: &str = "You are an expert market research writer. \
Respond with exactly one JSON object and nothing else: no markdown fences, no commentary. \
The object must have these fields: \
title (string), \
summary (string, one paragraph of 150-200 words), \
key_findings (array of 3-5 strings), \
facts (array of objects with source, url, excerpt and content strings), \
generated_at (ISO 8601 timestamp). \
Write complete sentences; never truncate.";

/// Builds the user prompt listing the selected facts.
#[must_use]
pub fn synthesis_prompt(query: &str, facts: &[Fact]) -> String {
    let mut prompt = format!("Write a research report answering: '{query}'\n\nFACTS:\n");
    for (i, fact) in facts.iter().enumerate() {
        let _ = writeln!(
            prompt,
            "{}. Source: {}\n   URL: {}\n   Excerpt: {}\n   Content: {}",
            i + 1,
            fact.source,
            fact.url.as_deref().unwrap_or(""),
            fact.excerpt.as_deref().unwrap_or(""),
            fact.content
        );
    }
    prompt.push_str(
        "\nUse the 3-5 most relevant facts above, each as a full object. \
         Keep every field relevant to the query.",
    );
    prompt
}

/// Redacts free-text fields in place. Non-string values are left for
/// schema validation to report.
fn redact_candidate(candidate: &mut Map<String, Value>) {
    fn redact_str(value: &mut Value) {
        if let Value::String(s) = value {
            *s = redact_pii(s);
        }
    }

    for key in ["title", "summary"] {
        if let Some(value) = candidate.get_mut(key) {
            redact_str(value);
        }
    }
    if let Some(Value::Array(findings)) = candidate.get_mut("key_findings") {
        findings.iter_mut().for_each(redact_str);
    }
    if let Some(Value::Array(facts)) = candidate.get_mut("facts") {
        for fact in facts.iter_mut().filter_map(Value::as_object_mut) {
            for key in ["content", "excerpt"] {
                if let Some(value) = fact.get_mut(key) {
                    redact_str(value);
                }
            }
        }
    }
}

/// Asks the model for a structured report and stores the raw candidate.
#[derive(Debug, Clone)]
pub struct SynthesizeStage {
    generator: Arc<ResilientGenerator>,
    model: String,
    max_tokens: u32,
    temperature: f32,
    use_cache: bool,
    fact_limit: usize,
}

impl SynthesizeStage {
    /// Creates the stage with default generation settings.
    #[must_use]
    pub fn new(generator: Arc<ResilientGenerator>) -> Self {
        Self::from_config(generator, &GenerationConfig::default(), &PipelineConfig::default())
    }

    /// Creates the stage from configuration.
    #[must_use]
    pub fn from_config(
        generator: Arc<ResilientGenerator>,
        generation: &GenerationConfig,
        pipeline: &PipelineConfig,
    ) -> Self {
        Self {
            generator,
            model: generation.model.clone(),
            max_tokens: generation.report_max_tokens,
            temperature: generation.report_temperature,
            use_cache: generation.use_cache,
            fact_limit: pipeline.facts_for_synthesis,
        }
    }

    fn request(&self, state: &RunState) -> GenerationRequest {
        let facts = state.facts().unwrap_or_default();
        let selected = &facts[..facts.len().min(self.fact_limit)];
        GenerationRequest::new(
            self.model.clone(),
            vec![
                ChatMessage::system(SYSTEM_PROMPT),
                ChatMessage::user(synthesis_prompt(&state.query, selected)),
            ],
        )
        .with_max_tokens(self.max_tokens)
        .with_temperature(self.temperature)
        .with_cache(self.use_cache)
    }
}

#[async_trait]
impl Stage for SynthesizeStage {
    fn name(&self) -> &str {
        "writer"
    }

    async fn execute(&self, mut state: RunState, ctx: &StageContext) -> StageOutcome {
        let request = self.request(&state);

        let parsed = match self.generator.generate(&request).await {
            Ok(text) => extract_json_object(&text).map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };

        let mut candidate = match parsed {
            Ok(candidate) => candidate,
            Err(error) => {
                warn!(error = %error, "Report synthesis produced no JSON object");
                ctx.emit(steps::WRITER_ERROR, json!({"error": error})).await;
                return StageOutcome::degraded(state, Violation::writer_parse_failure());
            }
        };

        redact_candidate(&mut candidate);
        if !candidate.contains_key("generated_at") {
            candidate.insert("generated_at".to_string(), Value::String(iso_timestamp()));
        }

        let keys_present: Vec<String> = candidate.keys().cloned().collect();
        info!(keys = ?keys_present, "Report candidate produced");
        ctx.emit(steps::WRITER_SUCCESS, json!({"keys": keys_present})).await;

        state.set_output(keys::REPORT_RAW, Artifact::RawReport(Value::Object(candidate)));
        state.record_tool("groq_writer");
        StageOutcome::Success(state)
    }
}
