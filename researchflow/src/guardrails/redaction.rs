//! Redaction of personal data from generated text.

use regex::Regex;
use std::sync::LazyLock;

static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").expect("valid email regex")
});

static CARD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b\d{4}[ -]?\d{4}[ -]?\d{4}[ -]?\d{4}\b").expect("valid card regex")
});

static SSN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d{3}-\d{2}-\d{4}\b").expect("valid ssn regex"));

static PHONE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:\+\d{1,3}[\s.-]?)?\(?\b\d{3}\)?[\s.-]?\d{3}[\s.-]\d{4}\b").expect("valid phone regex")
});

/// Replaces email addresses, card numbers, SSNs and phone numbers with
/// placeholder tokens.
#[must_use]
pub fn redact_pii(text: &str) -> String {
    let text = EMAIL.replace_all(text, "[REDACTED_EMAIL]");
    let text = CARD.replace_all(&text, "[REDACTED_CARD]");
    let text = SSN.replace_all(&text, "[REDACTED_SSN]");
    PHONE.replace_all(&text, "[REDACTED_PHONE]").into_owned()
}
