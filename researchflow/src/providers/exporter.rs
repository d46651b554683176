//! Markdown document export.

use async_trait::async_trait;
use std::fmt::Write as _;
use std::path::PathBuf;

use super::DocumentExporter;
use crate::core::{ExportHandle, Report};
use crate::errors::ExportError;

/// File name for a report export: `report_<first 20 chars of query>.md`
/// with spaces replaced by underscores.
#[must_use]
pub fn export_file_name(query: &str) -> String {
    let stem: String = query
        .chars()
        .take(20)
        .map(|c| if c == ' ' { '_' } else { c })
        .filter(|c| !matches!(c, '/' | '\\' | '\0'))
        .collect();
    format!("report_{stem}.md")
}

/// Writes reports as Markdown files into a directory.
#[derive(Debug, Clone)]
pub struct MarkdownExporter {
    directory: PathBuf,
}

impl MarkdownExporter {
    /// Creates an exporter writing into `directory`.
    #[must_use]
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    /// Renders a report as Markdown.
    pub fn render(report: &Report) -> Result<String, ExportError> {
        let mut out = String::new();
        render_into(&mut out, report).map_err(|e| ExportError::Render(e.to_string()))?;
        Ok(out)
    }
}

fn render_into(out: &mut String, report: &Report) -> std::fmt::Result {
    writeln!(out, "# {}", report.title)?;
    writeln!(out)?;
    writeln!(out, "## Summary")?;
    writeln!(out)?;
    writeln!(out, "{}", report.summary)?;

    if !report.key_findings.is_empty() {
        writeln!(out)?;
        writeln!(out, "## Key Findings")?;
        writeln!(out)?;
        for finding in &report.key_findings {
            writeln!(out, "- {finding}")?;
        }
    }

    if !report.facts.is_empty() {
        writeln!(out)?;
        writeln!(out, "## Supporting Facts")?;
        for (i, fact) in report.facts.iter().enumerate() {
            writeln!(out)?;
            writeln!(out, "{}. **{}**", i + 1, fact.source)?;
            if let Some(excerpt) = fact.excerpt.as_deref().filter(|e| !e.is_empty()) {
                writeln!(out, "   > {excerpt}")?;
            }
            if let Some(url) = fact.url.as_deref().filter(|u| !u.is_empty()) {
                writeln!(out, "   <{url}>")?;
            }
        }
    }

    writeln!(out)?;
    writeln!(
        out,
        "_Generated at {}_",
        report.generated_at.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
    )
}

#[async_trait]
impl DocumentExporter for MarkdownExporter {
    async fn export(&self, report: &Report, query: &str) -> Result<ExportHandle, ExportError> {
        let body = Self::render(report)?;
        tokio::fs::create_dir_all(&self.directory).await?;
        let path = self.directory.join(export_file_name(query));
        tokio::fs::write(&path, body).await?;
        tracing::debug!(path = %path.display(), "Report exported");
        Ok(ExportHandle::new(path.to_string_lossy()))
    }
}
