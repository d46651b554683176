//! Narrative article generation from the canonical report.

use async_trait::async_trait;
use serde_json::json;
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::{info, warn};

use super::{Stage, StageContext, StageOutcome};
use crate::config::{GenerationConfig, PipelineConfig};
use crate::core::{keys, Artifact, Report, RunState, Violation};
use crate::events::steps;
use crate::guardrails::redact_pii;
use crate::providers::{ChatMessage, GenerationRequest};
use crate::resilience::{is_unavailable, ResilientGenerator};
use crate::utils::{trim_incomplete_sentence, word_count};

const SYSTEM_PROMPT: &str = "You are a professional business writer specializing in market research articles. \
Write complete, well-structured articles with no repetition or truncation. \
Develop each section fully and let it flow into the next.";

/// Section headings and their word targets.
const SECTIONS: &[(&str, u32)] = &[
    ("Introduction", 150),
    ("Main Analysis", 300),
    ("Evidence & Examples", 200),
    ("Implications", 150),
    ("Conclusion", 100),
];

fn article_prompt(query: &str, report: &Report, fact_limit: usize) -> String {
    let mut prompt = format!(
        "Write a comprehensive article about: '{query}'\n\nARTICLE TITLE: {}\n\nCONTENT REQUIREMENTS:\n",
        report.title
    );
    for (section, words) in SECTIONS {
        let _ = writeln!(prompt, "- {section} ({words} words)");
    }

    let _ = write!(prompt, "\nSOURCE MATERIAL:\nSummary: {}\n\nKey Findings:\n", report.summary);
    for finding in &report.key_findings {
        let _ = writeln!(prompt, "- {finding}");
    }
    prompt.push_str("\nFacts:\n");
    for (i, fact) in report.facts.iter().take(fact_limit).enumerate() {
        let _ = writeln!(prompt, "{}. {}: {}", i + 1, fact.source, fact.content);
    }

    let total: u32 = SECTIONS.iter().map(|(_, words)| words).sum();
    let _ = write!(
        prompt,
        "\nINSTRUCTIONS:\n\
         - Professional, objective tone with smooth transitions\n\
         - Do not repeat information\n\
         - Complete every sentence and paragraph\n\
         - Use markdown formatting\n\
         - Total length: approximately {total} words"
    );
    prompt
}

/// Turns the validated report into a long-form article.
///
/// Requires the canonical report; without one the stage records
/// `no_structured_report` and leaves the state otherwise untouched.
#[derive(Debug, Clone)]
pub struct NarrateStage {
    generator: Arc<ResilientGenerator>,
    model: String,
    max_tokens: u32,
    temperature: f32,
    use_cache: bool,
    fact_limit: usize,
}

impl NarrateStage {
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
            max_tokens: generation.article_max_tokens,
            temperature: generation.article_temperature,
            use_cache: generation.use_cache,
            fact_limit: pipeline.article_fact_limit,
        }
    }
}

#[async_trait]
impl Stage for NarrateStage {
    fn name(&self) -> &str {
        "narrative_writer"
    }

    async fn execute(&self, mut state: RunState, ctx: &StageContext) -> StageOutcome {
        let Some(report) = state.report() else {
            return StageOutcome::degraded(state, Violation::no_structured_report());
        };

        let request = GenerationRequest::new(
            self.model.clone(),
            vec![
                ChatMessage::system(SYSTEM_PROMPT),
                ChatMessage::user(article_prompt(&state.query, report, self.fact_limit)),
            ],
        )
        .with_max_tokens(self.max_tokens)
        .with_temperature(self.temperature)
        .with_cache(self.use_cache);

        let generated = match self.generator.generate(&request).await {
            Ok(text) if is_unavailable(&text) => Err("generation unavailable after retries".to_string()),
            Ok(text) => Ok(text),
            Err(e) => Err(e.to_string()),
        };

        let text = match generated {
            Ok(text) => text,
            Err(error) => {
                warn!(error = %error, "Narrative generation failed");
                ctx.emit(steps::NARRATIVE_WRITER_ERROR, json!({"error": error})).await;
                return StageOutcome::degraded(state, Violation::narrative_failed());
            }
        };

        let article = redact_pii(&trim_incomplete_sentence(&text));
        let words = word_count(&article);
        info!(word_count = words, "Article written");
        ctx.emit(steps::NARRATIVE_WRITER_SUCCESS, json!({"word_count": words})).await;

        state.set_output(keys::ARTICLE, Artifact::Article(article));
        state.record_tool("narrative_writer");
        StageOutcome::Success(state)
    }
}
