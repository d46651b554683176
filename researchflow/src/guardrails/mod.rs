//! Validation and moderation gate used by the Review and Synthesize stages.
//!
//! - [`validate_report`]: structural check against the report contract
//! - [`ContentModerator`]: advisory banned-topic and profanity matcher
//! - [`redact_pii`]: personal-data redaction for generated text

mod moderation;
mod redaction;
mod schema;

pub use moderation::{
    check_content, ContentModerator, ModerationResult, DEFAULT_BANNED_PATTERNS,
    DEFAULT_PROFANITY_PATTERNS,
};
pub use redaction::redact_pii;
pub use schema::validate_report;
