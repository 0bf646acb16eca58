//! Marker vocabularies used by the priority assigner.
//!
//! Matching is case-insensitive. Single-word markers must match a whole
//! word; phrases match anywhere in the text.

/// Words and phrases that mark an error notice.
pub const ERROR_MARKERS: &[&str] = &[
    "error",
    "errors",
    "failed",
    "failure",
    "exception",
    "traceback",
    "panic",
    "panicked",
    "crash",
    "crashed",
    "unable to",
    "cannot",
    "could not",
    "not found",
    "timed out",
    "stack trace",
];

/// Words and phrases that mark a finished generation step.
pub const COMPLETION_MARKERS: &[&str] = &[
    "done",
    "created",
    "generated",
    "completed",
    "finished",
    "updated",
    "implemented",
    "generation complete",
    "build succeeded",
    "successfully",
];

/// Whether `text` reads like an error notice.
pub fn is_error_notice(text: &str) -> bool {
    contains_marker(text, ERROR_MARKERS)
}

/// Whether `text` reports a completed generation step.
pub fn is_generation_complete(text: &str) -> bool {
    contains_marker(text, COMPLETION_MARKERS)
}

fn contains_marker(text: &str, markers: &[&str]) -> bool {
    let lower = text.to_lowercase();
    let words: Vec<&str> = lower
        .split(|c: char| !c.is_alphanumeric() && c != '\'')
        .filter(|w| !w.is_empty())
        .collect();

    markers.iter().any(|marker| {
        if marker.contains(' ') {
            lower.contains(marker)
        } else {
            words.iter().any(|w| w == marker)
        }
    })
}
