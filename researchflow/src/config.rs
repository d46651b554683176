//! Configuration for the research pipeline and its collaborators.
//!
//! Every field has a serde default, so a partial JSON file (or none at all)
//! yields a usable configuration. Environment variables are overlaid by
//! [`ResearchConfig::from_env`].

use crate::errors::ConfigError;
use crate::resilience::{BackoffStrategy, RetryConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResearchConfig {
    /// Search and page fetching.
    #[serde(default)]
    pub search: SearchConfig,
    /// Generation requests.
    #[serde(default)]
    pub generation: GenerationConfig,
    /// Retry behavior for generation requests.
    #[serde(default)]
    pub retry: RetryConfig,
    /// Stage and routing settings.
    #[serde(default)]
    pub pipeline: PipelineConfig,
    /// Artifact locations.
    #[serde(default)]
    pub artifacts: ArtifactConfig,
}

impl ResearchConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a configuration from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Builds a configuration from defaults overlaid with the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().overlay_env(|name| std::env::var(name).ok())
    }

    /// Overlays values from an environment lookup function.
    ///
    /// Recognized variables: `GROQ_API_KEY`, `GROQ_BASE_URL`, `DEV_GROQ_MODEL`,
    /// `SERPAPI_KEY`, `ARTIFACTS_CACHE`.
    pub fn overlay_env<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup("GROQ_API_KEY") {
            self.generation.api_key = Some(key);
        }
        if let Some(url) = lookup("GROQ_BASE_URL") {
            self.generation.base_url = url;
        }
        if let Some(model) = lookup("DEV_GROQ_MODEL") {
            self.generation.model = model;
        }
        if let Some(key) = lookup("SERPAPI_KEY") {
            self.search.api_key = Some(key);
        }
        if let Some(dir) = lookup("ARTIFACTS_CACHE") {
            self.artifacts.directory = PathBuf::from(dir);
        }
        self.validate()?;
        Ok(self)
    }

    /// Checks cross-field constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.search.top_k == 0 {
            return Err(ConfigError::invalid("search.top_k", "must be >= 1"));
        }
        if self.search.fetch_concurrency == 0 {
            return Err(ConfigError::invalid("search.fetch_concurrency", "must be >= 1"));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::invalid("retry.max_attempts", "must be >= 1"));
        }
        if self.pipeline.failure_threshold == 0 {
            return Err(ConfigError::invalid("pipeline.failure_threshold", "must be >= 1"));
        }
        if self.pipeline.breaker_threshold == 0 {
            return Err(ConfigError::invalid("pipeline.breaker_threshold", "must be >= 1"));
        }
        check_seconds("search.fetch_timeout_seconds", self.search.fetch_timeout_seconds)?;
        check_seconds(
            "search.overall_fetch_timeout_seconds",
            self.search.overall_fetch_timeout_seconds,
        )?;
        check_seconds("search.search_timeout_seconds", self.search.search_timeout_seconds)?;
        check_seconds(
            "generation.request_timeout_seconds",
            self.generation.request_timeout_seconds,
        )?;
        Ok(())
    }

    /// Sets the generation model.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.generation.model = model.into();
        self
    }

    /// Sets the number of search results to retrieve.
    #[must_use]
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.search.top_k = top_k;
        self
    }

    /// Enables or disables the response cache.
    #[must_use]
    pub fn with_cache(mut self, enabled: bool) -> Self {
        self.generation.use_cache = enabled;
        self
    }

    /// Sets the artifacts directory.
    #[must_use]
    pub fn with_artifacts_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.artifacts.directory = dir.into();
        self
    }

    /// Sets the retry configuration.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}

/// Timeouts must convert to a non-zero [`Duration`].
fn check_seconds(key: &str, seconds: f64) -> Result<(), ConfigError> {
    match Duration::try_from_secs_f64(seconds) {
        Ok(duration) if !duration.is_zero() => Ok(()),
        Ok(_) => Err(ConfigError::invalid(key, "must be > 0 seconds")),
        Err(e) => Err(ConfigError::invalid(key, e.to_string())),
    }
}

/// Search and page-fetch settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Number of results to retrieve.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Maximum number of page fetches in flight.
    #[serde(default = "default_fetch_concurrency")]
    pub fetch_concurrency: usize,
    /// Timeout for a single page fetch in seconds.
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_seconds: f64,
    /// Timeout for all page fetches of one run in seconds.
    #[serde(default = "default_overall_fetch_timeout")]
    pub overall_fetch_timeout_seconds: f64,
    /// Timeout for the search request in seconds.
    #[serde(default = "default_search_timeout")]
    pub search_timeout_seconds: f64,
    /// Maximum characters of page text kept per document.
    #[serde(default = "default_page_char_limit")]
    pub page_char_limit: usize,
    /// Search API endpoint.
    #[serde(default = "default_search_endpoint")]
    pub endpoint: String,
    /// Search API key.
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
}

fn default_top_k() -> usize {
    10
}

fn default_fetch_concurrency() -> usize {
    4
}

fn default_fetch_timeout() -> f64 {
    15.0
}

fn default_overall_fetch_timeout() -> f64 {
    60.0
}

fn default_search_timeout() -> f64 {
    20.0
}

fn default_page_char_limit() -> usize {
    2000
}

fn default_search_endpoint() -> String {
    "https://serpapi.com/search.json".to_string()
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            fetch_concurrency: default_fetch_concurrency(),
            fetch_timeout_seconds: default_fetch_timeout(),
            overall_fetch_timeout_seconds: default_overall_fetch_timeout(),
            search_timeout_seconds: default_search_timeout(),
            page_char_limit: default_page_char_limit(),
            endpoint: default_search_endpoint(),
            api_key: None,
        }
    }
}

impl SearchConfig {
    /// Gets the per-fetch timeout as Duration.
    #[must_use]
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.fetch_timeout_seconds)
    }

    /// Gets the overall fetch timeout as Duration.
    #[must_use]
    pub fn overall_fetch_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.overall_fetch_timeout_seconds)
    }

    /// Gets the search timeout as Duration.
    #[must_use]
    pub fn search_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.search_timeout_seconds)
    }
}

/// Generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Model identifier.
    #[serde(default = "default_model")]
    pub model: String,
    /// OpenAI-compatible API base URL.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// API key.
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    /// Request timeout in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: f64,
    /// Whether cached responses may be reused.
    #[serde(default = "default_use_cache")]
    pub use_cache: bool,
    /// Token budget for the structured report.
    #[serde(default = "default_report_max_tokens")]
    pub report_max_tokens: u32,
    /// Sampling temperature for the structured report.
    #[serde(default = "default_report_temperature")]
    pub report_temperature: f32,
    /// Token budget for the narrative article.
    #[serde(default = "default_article_max_tokens")]
    pub article_max_tokens: u32,
    /// Sampling temperature for the narrative article.
    #[serde(default = "default_article_temperature")]
    pub article_temperature: f32,
}

fn default_model() -> String {
    "llama-3.3-70b-versatile".to_string()
}

fn default_base_url() -> String {
    "https://api.groq.com/openai/v1".to_string()
}

fn default_request_timeout() -> f64 {
    30.0
}

fn default_use_cache() -> bool {
    true
}

fn default_report_max_tokens() -> u32 {
    1200
}

fn default_report_temperature() -> f32 {
    0.1
}

fn default_article_max_tokens() -> u32 {
    2000
}

fn default_article_temperature() -> f32 {
    0.2
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            base_url: default_base_url(),
            api_key: None,
            request_timeout_seconds: default_request_timeout(),
            use_cache: default_use_cache(),
            report_max_tokens: default_report_max_tokens(),
            report_temperature: default_report_temperature(),
            article_max_tokens: default_article_max_tokens(),
            article_temperature: default_article_temperature(),
        }
    }
}

impl GenerationConfig {
    /// Gets the request timeout as Duration.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.request_timeout_seconds)
    }
}

/// Stage and routing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Failures after Synthesize that divert the run to the partial summary.
    #[serde(default = "default_threshold")]
    pub failure_threshold: u32,
    /// Catastrophic research failures after which the breaker opens.
    #[serde(default = "default_threshold")]
    pub breaker_threshold: u32,
    /// Facts handed to the synthesis prompt.
    #[serde(default = "default_facts_for_synthesis")]
    pub facts_for_synthesis: usize,
    /// Maximum characters of content kept per fact.
    #[serde(default = "default_fact_char_limit")]
    pub fact_char_limit: usize,
    /// Facts quoted in the narrative prompt.
    #[serde(default = "default_article_fact_limit")]
    pub article_fact_limit: usize,
}

fn default_threshold() -> u32 {
    3
}

fn default_facts_for_synthesis() -> usize {
    5
}

fn default_fact_char_limit() -> usize {
    500
}

fn default_article_fact_limit() -> usize {
    3
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_threshold(),
            breaker_threshold: default_threshold(),
            facts_for_synthesis: default_facts_for_synthesis(),
            fact_char_limit: default_fact_char_limit(),
            article_fact_limit: default_article_fact_limit(),
        }
    }
}

/// Locations of files written by the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactConfig {
    /// Directory holding every artifact.
    #[serde(default = "default_artifacts_dir")]
    pub directory: PathBuf,
    /// Response cache file name.
    #[serde(default = "default_cache_file")]
    pub cache_file: String,
    /// Trace (JSON lines) file name.
    #[serde(default = "default_trace_file")]
    pub trace_file: String,
    /// Run summary file name.
    #[serde(default = "default_summary_file")]
    pub summary_file: String,
}

fn default_artifacts_dir() -> PathBuf {
    PathBuf::from("artifacts")
}

fn default_cache_file() -> String {
    "groq_cache.json".to_string()
}

fn default_trace_file() -> String {
    "sample_trace.json".to_string()
}

fn default_summary_file() -> String {
    "run_summary.json".to_string()
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            directory: default_artifacts_dir(),
            cache_file: default_cache_file(),
            trace_file: default_trace_file(),
            summary_file: default_summary_file(),
        }
    }
}

impl ArtifactConfig {
    /// Full path of the response cache file.
    #[must_use]
    pub fn cache_path(&self) -> PathBuf {
        self.directory.join(&self.cache_file)
    }

    /// Full path of the trace file.
    #[must_use]
    pub fn trace_path(&self) -> PathBuf {
        self.directory.join(&self.trace_file)
    }

    /// Full path of the run summary file.
    #[must_use]
    pub fn summary_path(&self) -> PathBuf {
        self.directory.join(&self.summary_file)
    }
}

/// Parses a backoff strategy name (`exponential`, `linear`, `constant`).
pub fn parse_backoff(name: &str) -> Result<BackoffStrategy, ConfigError> {
    match name.to_ascii_lowercase().as_str() {
        "exponential" => Ok(BackoffStrategy::Exponential),
        "linear" => Ok(BackoffStrategy::Linear),
        "constant" => Ok(BackoffStrategy::Constant),
        other => Err(ConfigError::invalid("retry.backoff_strategy", format!("unknown strategy '{other}'"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = ResearchConfig::default();
        assert_eq!(config.search.top_k, 10);
        assert_eq!(config.search.page_char_limit, 2000);
        assert_eq!(config.generation.model, "llama-3.3-70b-versatile");
        assert_eq!(config.generation.report_max_tokens, 1200);
        assert_eq!(config.pipeline.failure_threshold, 3);
        assert_eq!(config.pipeline.facts_for_synthesis, 5);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.artifacts.cache_path(), PathBuf::from("artifacts/groq_cache.json"));
    }

    #[test]
    fn test_overlay_env() {
        let env: HashMap<&str, &str> = [
            ("GROQ_API_KEY", "gsk-test"),
            ("DEV_GROQ_MODEL", "llama-3.1-8b-instant"),
            ("SERPAPI_KEY", "serp-test"),
            ("ARTIFACTS_CACHE", "/tmp/rf"),
        ]
        .into_iter()
        .collect();

        let config = ResearchConfig::default()
            .overlay_env(|name| env.get(name).map(|v| (*v).to_string()))
            .unwrap();

        assert_eq!(config.generation.api_key.as_deref(), Some("gsk-test"));
        assert_eq!(config.generation.model, "llama-3.1-8b-instant");
        assert_eq!(config.search.api_key.as_deref(), Some("serp-test"));
        assert_eq!(config.artifacts.directory, PathBuf::from("/tmp/rf"));
    }

    #[test]
    fn test_partial_json_file_uses_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"search": {{"top_k": 4}}, "pipeline": {{"failure_threshold": 2}}}}"#).unwrap();

        let config = ResearchConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.search.top_k, 4);
        assert_eq!(config.search.fetch_concurrency, 4);
        assert_eq!(config.pipeline.failure_threshold, 2);
        assert_eq!(config.pipeline.breaker_threshold, 3);
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        let config = ResearchConfig::default().with_top_k(0);
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { .. })));

        let mut config = ResearchConfig::default();
        config.retry.max_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_negative_timeout_in_file_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"search": {{"fetch_timeout_seconds": -1.0}}}}"#).unwrap();

        let err = ResearchConfig::from_json_file(file.path()).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid { ref key, .. } if key == "search.fetch_timeout_seconds"
        ));
    }

    #[test]
    fn test_timeouts_must_be_positive_and_finite() {
        type Setter = fn(&mut ResearchConfig, f64);
        let fields: [(&str, Setter); 4] = [
            ("search.fetch_timeout_seconds", |c, v| c.search.fetch_timeout_seconds = v),
            ("search.overall_fetch_timeout_seconds", |c, v| {
                c.search.overall_fetch_timeout_seconds = v;
            }),
            ("search.search_timeout_seconds", |c, v| c.search.search_timeout_seconds = v),
            ("generation.request_timeout_seconds", |c, v| {
                c.generation.request_timeout_seconds = v;
            }),
        ];

        for (name, set) in fields {
            for bad in [0.0, -1.0, f64::NAN, f64::INFINITY, 1e300] {
                let mut config = ResearchConfig::default();
                set(&mut config, bad);
                match config.validate() {
                    Err(ConfigError::Invalid { key, .. }) => assert_eq!(key, name, "value {bad}"),
                    other => panic!("{name} = {bad} accepted: {other:?}"),
                }
            }
        }

        let mut config = ResearchConfig::default();
        config.search.fetch_timeout_seconds = 0.25;
        config.validate().unwrap();
        assert_eq!(config.search.fetch_timeout(), Duration::from_millis(250));
    }

    #[test]
    fn test_api_keys_are_not_serialized() {
        let mut config = ResearchConfig::default();
        config.generation.api_key = Some("secret".into());
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("secret"));
    }

    #[test]
    fn test_parse_backoff() {
        assert_eq!(parse_backoff("Linear").unwrap(), BackoffStrategy::Linear);
        assert!(parse_backoff("fibonacci").is_err());

        let retry = RetryConfig::default()
            .with_max_attempts(5)
            .with_backoff(parse_backoff("constant").unwrap());
        let config = ResearchConfig::default().with_retry(retry);
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.backoff_strategy, BackoffStrategy::Constant);

        let config = ResearchConfig::default().with_retry(RetryConfig::default().with_max_attempts(0));
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { .. })));
    }
}
