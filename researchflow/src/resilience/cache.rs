//! Content-addressed response cache for generation requests.
//!
//! Entries are keyed by a [`Fingerprint`] of the model id and message
//! sequence. Entries are written once per fingerprint and never expire.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::providers::ChatMessage;
use crate::utils::unix_seconds;

/// Deterministic identity of a generation request.
///
/// Derived from the model id and the messages only. Sampling parameters
/// (temperature, token budget) do not participate, so two requests that
/// differ only in those share a cache entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Computes the fingerprint of a request.
    #[must_use]
    pub fn of(model: &str, messages: &[ChatMessage]) -> Self {
        // serde_json maps serialize with sorted keys
        let canonical = serde_json::json!({
            "model": model,
            "messages": messages,
        });
        let mut hasher = Sha256::new();
        hasher.update(canonical.to_string().as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    /// Wraps an existing hex digest.
    #[must_use]
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    /// Returns the hex digest.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Metadata stored with a cached response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheMetadata {
    /// Model that produced the response.
    pub model: String,
    /// Unix time the entry was written.
    pub time: f64,
}

/// A cached generation response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Key of the entry; the map key in persisted form.
    #[serde(skip)]
    pub fingerprint: Fingerprint,
    /// The response text.
    #[serde(rename = "resp")]
    pub response: String,
    /// Provenance of the response.
    #[serde(rename = "meta")]
    pub metadata: CacheMetadata,
}

impl CacheEntry {
    /// Creates an entry stamped with the current time.
    #[must_use]
    pub fn new(fingerprint: Fingerprint, model: impl Into<String>, response: impl Into<String>) -> Self {
        Self {
            fingerprint,
            response: response.into(),
            metadata: CacheMetadata {
                model: model.into(),
                time: unix_seconds(),
            },
        }
    }
}

/// Storage backend for cached responses.
#[async_trait]
pub trait ResponseCache: Send + Sync {
    /// Gets the entry for a fingerprint.
    async fn get(&self, fingerprint: &Fingerprint) -> Option<CacheEntry>;

    /// Stores an entry. An existing entry for the same fingerprint is kept.
    async fn put(&self, entry: CacheEntry);
}

/// In-memory response cache.
#[derive(Debug, Default)]
pub struct InMemoryResponseCache {
    entries: Arc<Mutex<HashMap<Fingerprint, CacheEntry>>>,
}

impl InMemoryResponseCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns true if the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[async_trait]
impl ResponseCache for InMemoryResponseCache {
    async fn get(&self, fingerprint: &Fingerprint) -> Option<CacheEntry> {
        self.entries.lock().get(fingerprint).cloned()
    }

    async fn put(&self, entry: CacheEntry) {
        self.entries
            .lock()
            .entry(entry.fingerprint.clone())
            .or_insert(entry);
    }
}

/// Response cache persisted as a JSON object `{fingerprint: {resp, meta}}`.
///
/// The file is read on first access. A missing or unreadable file starts an
/// empty cache. Every write persists the whole map while the lock is held,
/// so concurrent writers never drop each other's entries. File access runs on
/// the blocking thread pool.
#[derive(Debug, Clone)]
pub struct JsonFileResponseCache {
    store: Arc<FileStore>,
}

#[derive(Debug)]
struct FileStore {
    path: PathBuf,
    entries: Mutex<Option<HashMap<Fingerprint, CacheEntry>>>,
}

impl JsonFileResponseCache {
    /// Creates a cache backed by `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            store: Arc::new(FileStore {
                path: path.into(),
                entries: Mutex::new(None),
            }),
        }
    }

    /// The backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.store.path
    }
}

impl FileStore {
    fn load(path: &Path) -> HashMap<Fingerprint, CacheEntry> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return HashMap::new(),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to read response cache");
                return HashMap::new();
            }
        };

        match serde_json::from_str::<HashMap<String, CacheEntry>>(&raw) {
            Ok(map) => map
                .into_iter()
                .map(|(key, mut entry)| {
                    let fingerprint = Fingerprint::from_hex(key);
                    entry.fingerprint = fingerprint.clone();
                    (fingerprint, entry)
                })
                .collect(),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Ignoring corrupt response cache");
                HashMap::new()
            }
        }
    }

    fn persist(&self, entries: &HashMap<Fingerprint, CacheEntry>) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let by_key: HashMap<&str, &CacheEntry> = entries.iter().map(|(k, v)| (k.as_str(), v)).collect();
        let json = serde_json::to_string_pretty(&by_key).map_err(std::io::Error::other)?;
        std::fs::write(&self.path, json)
    }

    fn get(&self, fingerprint: &Fingerprint) -> Option<CacheEntry> {
        let mut guard = self.entries.lock();
        guard
            .get_or_insert_with(|| Self::load(&self.path))
            .get(fingerprint)
            .cloned()
    }

    fn put(&self, entry: CacheEntry) {
        let mut guard = self.entries.lock();
        let entries = guard.get_or_insert_with(|| Self::load(&self.path));
        if entries.contains_key(&entry.fingerprint) {
            return;
        }
        entries.insert(entry.fingerprint.clone(), entry);
        if let Err(e) = self.persist(entries) {
            tracing::warn!(path = %self.path.display(), error = %e, "Failed to persist response cache");
        }
    }
}

#[async_trait]
impl ResponseCache for JsonFileResponseCache {
    async fn get(&self, fingerprint: &Fingerprint) -> Option<CacheEntry> {
        let store = Arc::clone(&self.store);
        let fingerprint = fingerprint.clone();
        match tokio::task::spawn_blocking(move || store.get(&fingerprint)).await {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(path = %self.store.path.display(), error = %e, "Response cache read aborted");
                None
            }
        }
    }

    async fn put(&self, entry: CacheEntry) {
        let store = Arc::clone(&self.store);
        if let Err(e) = tokio::task::spawn_blocking(move || store.put(entry)).await {
            tracing::warn!(path = %self.store.path.display(), error = %e, "Response cache write aborted");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn messages(text: &str) -> Vec<ChatMessage> {
        vec![ChatMessage::system("Be terse."), ChatMessage::user(text)]
    }

    #[test]
    fn test_fingerprint_is_deterministic() {
        let a = Fingerprint::of("m", &messages("hello"));
        let b = Fingerprint::of("m", &messages("hello"));
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 64);
    }

    #[test]
    fn test_fingerprint_depends_on_model_and_messages() {
        let base = Fingerprint::of("m", &messages("hello"));
        assert_ne!(base, Fingerprint::of("other", &messages("hello")));
        assert_ne!(base, Fingerprint::of("m", &messages("hello!")));
    }

    #[test]
    fn test_entry_serializes_with_short_names() {
        let entry = CacheEntry::new(Fingerprint::from_hex("abc"), "m", "text");
        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["resp"], "text");
        assert_eq!(value["meta"]["model"], "m");
        assert!(value.get("fingerprint").is_none());
    }

    #[tokio::test]
    async fn test_in_memory_is_write_once() {
        let cache = InMemoryResponseCache::new();
        let fp = Fingerprint::from_hex("k");

        cache.put(CacheEntry::new(fp.clone(), "m", "first")).await;
        cache.put(CacheEntry::new(fp.clone(), "m", "second")).await;

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&fp).await.unwrap().response, "first");
    }

    #[tokio::test]
    async fn test_file_cache_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("cache.json");
        let fp = Fingerprint::of("m", &messages("q"));

        let cache = JsonFileResponseCache::new(&path);
        assert!(cache.get(&fp).await.is_none());
        cache.put(CacheEntry::new(fp.clone(), "m", "stored")).await;

        let reopened = JsonFileResponseCache::new(&path);
        let entry = reopened.get(&fp).await.unwrap();
        assert_eq!(entry.response, "stored");
        assert_eq!(entry.fingerprint, fp);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_file_cache_concurrent_writers_keep_every_entry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        let cache = JsonFileResponseCache::new(&path);

        let writers: Vec<_> = (0..8)
            .map(|i| {
                let cache = cache.clone();
                tokio::spawn(async move {
                    let fp = Fingerprint::of("m", &messages(&format!("q{i}")));
                    cache.put(CacheEntry::new(fp, "m", format!("r{i}"))).await;
                })
            })
            .collect();
        for writer in writers {
            writer.await.unwrap();
        }

        let reopened = JsonFileResponseCache::new(&path);
        for i in 0..8 {
            let fp = Fingerprint::of("m", &messages(&format!("q{i}")));
            assert_eq!(reopened.get(&fp).await.unwrap().response, format!("r{i}"));
        }
    }

    #[tokio::test]
    async fn test_file_cache_tolerates_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        std::fs::write(&path, "{not json").unwrap();

        let cache = JsonFileResponseCache::new(&path);
        let fp = Fingerprint::from_hex("k");
        assert!(cache.get(&fp).await.is_none());

        cache.put(CacheEntry::new(fp.clone(), "m", "fresh")).await;
        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("fresh"));
    }
}
