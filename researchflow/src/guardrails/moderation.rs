//! Deterministic pattern-based content moderation.
//!
//! The moderator is advisory: a flag is recorded on the run but never stops
//! artifacts from being produced.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// Banned-topic patterns checked first, in order.
pub const DEFAULT_BANNED_PATTERNS: &[&str] = &[
    r"\bkill\b",
    r"\bterror\b",
    r"\bsexually explicit\b",
    r"\bchild\b",
];

/// Profanity patterns checked after the banned topics.
pub const DEFAULT_PROFANITY_PATTERNS: &[&str] = &[r"\b(fuck|shit|bitch)\b"];

static DEFAULT_MODERATOR: LazyLock<ContentModerator> = LazyLock::new(|| {
    ContentModerator::new(DEFAULT_BANNED_PATTERNS, DEFAULT_PROFANITY_PATTERNS)
        .expect("valid default moderation regex")
});

/// Outcome of a moderation check.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModerationResult {
    /// Whether the text was flagged.
    pub flagged: bool,
    /// Why, when flagged.
    pub reason: Option<String>,
}

impl ModerationResult {
    /// A clean result.
    #[must_use]
    pub fn clean() -> Self {
        Self::default()
    }

    /// A flagged result.
    #[must_use]
    pub fn flagged(reason: impl Into<String>) -> Self {
        Self {
            flagged: true,
            reason: Some(reason.into()),
        }
    }
}

/// Case-insensitive matcher over banned-topic and profanity pattern sets.
#[derive(Debug, Clone)]
pub struct ContentModerator {
    banned: Vec<(String, Regex)>,
    profanity: Vec<Regex>,
}

impl Default for ContentModerator {
    fn default() -> Self {
        DEFAULT_MODERATOR.clone()
    }
}

impl ContentModerator {
    /// Compiles a moderator from pattern lists.
    pub fn new(banned: &[&str], profanity: &[&str]) -> Result<Self, regex::Error> {
        let banned = banned
            .iter()
            .map(|p| Regex::new(p).map(|re| ((*p).to_string(), re)))
            .collect::<Result<Vec<_>, _>>()?;
        let profanity = profanity
            .iter()
            .map(|p| Regex::new(p))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { banned, profanity })
    }

    /// Checks text. The first matching banned pattern wins over profanity.
    #[must_use]
    pub fn check(&self, text: &str) -> ModerationResult {
        let lowered = text.to_lowercase();

        if let Some((pattern, _)) = self.banned.iter().find(|(_, re)| re.is_match(&lowered)) {
            return ModerationResult::flagged(format!("policy matched pattern: {pattern}"));
        }
        if self.profanity.iter().any(|re| re.is_match(&lowered)) {
            return ModerationResult::flagged("contains profanity");
        }
        ModerationResult::clean()
    }
}

/// Checks text with the default pattern sets.
#[must_use]
pub fn check_content(text: &str) -> ModerationResult {
    DEFAULT_MODERATOR.check(text)
}
