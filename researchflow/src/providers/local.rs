//! Keyword search over a directory of local Markdown and text files.

use async_trait::async_trait;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::{debug, info};

use super::SearchProvider;
use crate::core::SearchHit;
use crate::errors::SearchError;
use crate::utils::{normalize_whitespace, truncate_with_marker};

static QUERY_WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\w+").expect("valid query word regex"));

const INDEXED_EXTENSIONS: &[&str] = &["md", "txt"];

#[derive(Debug, Clone)]
struct LocalDocument {
    title: String,
    text: String,
    lowered: String,
}

impl LocalDocument {
    fn new(title: impl Into<String>, text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            title: title.into(),
            lowered: text.to_lowercase(),
            text,
        }
    }

    /// Total occurrences of every query word, substrings included.
    fn score(&self, words: &[String]) -> usize {
        words.iter().map(|w| self.lowered.matches(w.as_str()).count()).sum()
    }
}

/// Searches `*.md` and `*.txt` files in one directory, ranking them by how
/// often the query words occur.
///
/// Hits carry no URL. The document text (capped at `snippet_chars`) is the
/// snippet, so no page fetch is needed and [`SearchProvider::fetch`] returns
/// nothing.
#[derive(Debug, Clone)]
pub struct LocalDocsSearch {
    directory: PathBuf,
    documents: Vec<LocalDocument>,
    snippet_chars: usize,
}

impl LocalDocsSearch {
    /// Indexes the files in `directory`, creating it when missing.
    ///
    /// Unreadable files are skipped.
    pub async fn open(directory: impl Into<PathBuf>) -> Result<Self, SearchError> {
        let directory = directory.into();
        let io_error = |e: std::io::Error| SearchError::LocalDocs(format!("{}: {e}", directory.display()));

        tokio::fs::create_dir_all(&directory).await.map_err(io_error)?;
        let mut entries = tokio::fs::read_dir(&directory).await.map_err(io_error)?;

        let mut paths = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(io_error)? {
            let path = entry.path();
            if is_indexed(&path) {
                paths.push(path);
            }
        }
        paths.sort();

        let mut documents = Vec::with_capacity(paths.len());
        for path in paths {
            match tokio::fs::read_to_string(&path).await {
                Ok(text) => {
                    let title = path
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default();
                    documents.push(LocalDocument::new(title, text));
                }
                Err(e) => debug!(path = %path.display(), error = %e, "Skipping unreadable document"),
            }
        }

        info!(directory = %directory.display(), documents = documents.len(), "Local documents indexed");
        Ok(Self {
            directory,
            documents,
            snippet_chars: 2000,
        })
    }

    /// Builds an index from in-memory `(title, text)` pairs.
    #[must_use]
    pub fn from_documents<I, T, B>(documents: I) -> Self
    where
        I: IntoIterator<Item = (T, B)>,
        T: Into<String>,
        B: Into<String>,
    {
        Self {
            directory: PathBuf::new(),
            documents: documents
                .into_iter()
                .map(|(title, text)| LocalDocument::new(title, text))
                .collect(),
            snippet_chars: 2000,
        }
    }

    /// Caps the document text carried in each hit.
    #[must_use]
    pub fn with_snippet_chars(mut self, snippet_chars: usize) -> Self {
        self.snippet_chars = snippet_chars;
        self
    }

    /// The indexed directory.
    #[must_use]
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Number of indexed documents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    /// Returns true if no document was indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

fn is_indexed(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| INDEXED_EXTENSIONS.contains(&e))
}

#[async_trait]
impl SearchProvider for LocalDocsSearch {
    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<SearchHit>, SearchError> {
        let lowered = query.to_lowercase();
        let words: Vec<String> = QUERY_WORD
            .find_iter(&lowered)
            .map(|m| m.as_str().to_string())
            .collect();

        let mut scored: Vec<(usize, &LocalDocument)> = self
            .documents
            .iter()
            .map(|doc| (doc.score(&words), doc))
            .filter(|(score, _)| *score > 0)
            .collect();
        // stable, so ties keep file name order
        scored.sort_by_key(|(score, _)| std::cmp::Reverse(*score));

        debug!(query, matched = scored.len(), "Local document search");
        Ok(scored
            .into_iter()
            .take(top_k)
            .map(|(_, doc)| {
                let snippet = truncate_with_marker(&normalize_whitespace(&doc.text), self.snippet_chars);
                SearchHit::new(doc.title.clone(), String::new(), snippet)
            })
            .collect())
    }

    async fn fetch(&self, _url: &str) -> String {
        String::new()
    }
}
