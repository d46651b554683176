//! Text normalization helpers shared by the stages.

/// Marker appended to text cut by [`truncate_with_marker`].
pub const TRUNCATION_MARKER: &str = "...";

/// Collapses every run of whitespace into a single space and trims the ends.
#[must_use]
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Caps `text` at `max_chars` characters, appending [`TRUNCATION_MARKER`]
/// when anything was cut.
///
/// Counts characters, not bytes, so multi-byte text never splits a code point.
#[must_use]
pub fn truncate_with_marker(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}{}", &text[..byte_idx], TRUNCATION_MARKER),
        None => text.to_string(),
    }
}

/// Returns true for sentence-terminating punctuation.
#[must_use]
pub fn is_terminal_punctuation(c: char) -> bool {
    matches!(c, '.' | '!' | '?')
}

/// Drops a trailing incomplete sentence.
///
/// If the trimmed text does not end in terminal punctuation, it is cut back
/// to the last terminal punctuation mark, but only when that mark lies within
/// the final 20% of the text; otherwise the text is returned as is.
#[must_use]
pub fn trim_incomplete_sentence(text: &str) -> String {
    let trimmed = text.trim();
    match trimmed.chars().last() {
        None => return String::new(),
        Some(c) if is_terminal_punctuation(c) => return trimmed.to_string(),
        Some(_) => {}
    }

    let Some(last_mark) = trimmed.rfind(is_terminal_punctuation) else {
        return trimmed.to_string();
    };

    // 0.8 * len, in integer arithmetic
    if last_mark * 5 > trimmed.len() * 4 {
        trimmed[..=last_mark].to_string()
    } else {
        trimmed.to_string()
    }
}

/// Counts whitespace-separated words.
#[must_use]
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}
