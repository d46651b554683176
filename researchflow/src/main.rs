//! researchflow CLI: runs one research query end to end.

use anyhow::Context;
use clap::Parser;
use researchflow::config::parse_backoff;
use researchflow::prelude::*;
use researchflow::providers::LocalDocsSearch;
use researchflow::resilience::BackoffStrategy;
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Turn a research question into a validated report and article.
#[derive(Parser, Debug)]
#[command(name = "researchflow", version, about, long_about = None)]
struct Cli {
    /// Research query (prompted for if omitted)
    query: Option<String>,

    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory for the response cache, trace, summary and exported reports
    #[arg(long)]
    artifacts_dir: Option<PathBuf>,

    /// Generation model
    #[arg(short, long)]
    model: Option<String>,

    /// Number of search results to retrieve
    #[arg(long)]
    top_k: Option<usize>,

    /// Search *.md and *.txt files in this directory instead of the web
    #[arg(long, value_name = "DIR")]
    local_docs: Option<PathBuf>,

    /// Generation attempts per request, including the first
    #[arg(long)]
    max_attempts: Option<usize>,

    /// Retry backoff: exponential, linear or constant
    #[arg(long, value_parser = parse_backoff)]
    backoff: Option<BackoffStrategy>,

    /// Bypass the response cache
    #[arg(long)]
    no_cache: bool,

    /// Emit logs as JSON
    #[arg(long)]
    json: bool,
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let (json_layer, text_layer) = if json {
        (Some(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr)), None)
    } else {
        (
            None,
            Some(tracing_subscriber::fmt::layer().with_target(false).with_writer(std::io::stderr)),
        )
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(text_layer)
        .init();
}

fn load_config(cli: &Cli) -> anyhow::Result<ResearchConfig> {
    let base = match &cli.config {
        Some(path) => ResearchConfig::from_json_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => ResearchConfig::default(),
    };
    let mut config = base.overlay_env(|name| std::env::var(name).ok())?;

    if let Some(dir) = &cli.artifacts_dir {
        config = config.with_artifacts_dir(dir);
    }
    if let Some(model) = &cli.model {
        config = config.with_model(model);
    }
    if let Some(top_k) = cli.top_k {
        config = config.with_top_k(top_k);
    }
    if cli.no_cache {
        config = config.with_cache(false);
    }
    if cli.max_attempts.is_some() || cli.backoff.is_some() {
        let mut retry = config.retry.clone();
        if let Some(attempts) = cli.max_attempts {
            retry = retry.with_max_attempts(attempts);
        }
        if let Some(strategy) = cli.backoff {
            retry = retry.with_backoff(strategy);
        }
        config = config.with_retry(retry);
    }
    config.validate()?;
    Ok(config)
}

fn read_query(cli: &Cli) -> anyhow::Result<String> {
    if let Some(query) = &cli.query {
        return Ok(query.trim().to_string());
    }
    print!("Enter research query: ");
    std::io::stdout().flush()?;
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    init_tracing(cli.json);

    let query = read_query(&cli)?;
    if query.is_empty() {
        anyhow::bail!("a research query is required");
    }

    let config = load_config(&cli)?;
    let pipeline = match &cli.local_docs {
        Some(dir) => {
            let search = LocalDocsSearch::open(dir)
                .await
                .with_context(|| format!("indexing {}", dir.display()))?;
            ResearchPipeline::from_config_with_search(config, Arc::new(search))
        }
        None => ResearchPipeline::from_config(config),
    }
    .context("wiring pipeline")?;
    let state = pipeline.run(query).await;

    println!("{}", serde_json::to_string_pretty(state.outputs())?);
    println!("Violations: {:?}", state.violations());

    if let Some(handle) = state.export_handle() {
        println!("Report exported to: {}", handle.location);
        if let Ok(absolute) = std::path::absolute(&handle.location) {
            println!("Absolute path: {}", absolute.display());
        }
    }

    Ok(())
}
