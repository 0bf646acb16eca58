//! Error types for the ContextRank domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for ContextRank operations that can fail.
///
/// The conversation store itself never surfaces errors; this type covers the
/// collaborators around it (classifier, transcripts, configuration).
#[derive(Debug, Error)]
pub enum Error {
    // --- Classifier errors ---
    #[error("Classifier error: {0}")]
    Classifier(#[from] ClassifierError),

    // --- Transcript errors ---
    #[error("Transcript error at line {line}: {reason}")]
    Transcript { line: usize, reason: String },

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Failures reported by a [`Classifier`](crate::classifier::Classifier).
///
/// Every variant is recoverable: callers degrade to a default tier.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClassifierError {
    #[error("classifier unavailable: {0}")]
    Unavailable(String),

    #[error("classifier timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },

    #[error("classifier rejected message {message_id}: {reason}")]
    Rejected { message_id: String, reason: String },
}
