//! Utility functions for text handling, JSON extraction and timestamps.

pub mod json;
pub mod text;
pub mod timestamps;

pub use json::{extract_json_object, BalancedObjects, JsonExtractError};
pub use text::{
    normalize_whitespace, trim_incomplete_sentence, truncate_with_marker, word_count,
    TRUNCATION_MARKER,
};
pub use timestamps::{iso_timestamp, parse_iso_timestamp, unix_seconds, Timestamp, TimestampError};
