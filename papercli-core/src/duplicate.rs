//! Recognition of "document already exists" task failures.
//!
//! The service reports duplicates only through the free-form task message, so the match
//! is textual. Keep every use behind [`is_suppressible_duplicate`] so it can be replaced
//! by a structured code once the service exposes one.

use std::sync::LazyLock;

use regex::Regex;

use crate::contract::{TaskError, TaskStatus};

// A bare duplicate sentence, optionally ending in a period. Messages with further text
// after the document reference (e.g. "Note: existing document is in the trash.") must
// not match.
static NOT_CONSUMING_DUPLICATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bnot consuming\b.*: It is a duplicate of\b.*\(#\d+\)\s*(?:\.\s*)?$")
        .expect("duplicate pattern is valid")
});

/// Whether a task message reports a plain duplicate of an existing document.
pub fn is_duplicate_message(message: &str) -> bool {
    NOT_CONSUMING_DUPLICATE.is_match(message)
}

/// Whether a task failure may be treated as success when duplicates are ignored.
pub fn is_suppressible_duplicate(err: &TaskError) -> bool {
    err.status == TaskStatus::Failure && is_duplicate_message(&err.message)
}
