//! Error types for pulse-core

use thiserror::Error;

/// Main error type for the pulse-core library
#[derive(Error, Debug)]
pub enum Error {
    /// Status source unreachable, timed out, or returned garbage
    #[error("backend status unavailable for {conversation_id}: {message}")]
    GateUnavailable {
        conversation_id: String,
        message: String,
    },

    /// Stall classifier could not produce a valid classification
    #[error("classification failed: {0}")]
    Classification(#[from] ClassificationFailure),

    /// Nudge composer could not produce a valid message
    #[error("composition failed: {0}")]
    Composition(#[from] CompositionFailure),

    /// Deployment or tenant setup defect; always fatal
    #[error("configuration error: {0}")]
    Config(String),

    /// Transport-level language oracle error
    #[error("oracle error: {0}")]
    Oracle(String),

    /// Transport-level status source error
    #[error("status source error: {0}")]
    StatusSource(String),

    /// Database error
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid input handed to a public entry point
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Decision or review not found
    #[error("not found: {0}")]
    NotFound(String),

    /// Run was cancelled before a message was composed
    #[error("cancelled: {0}")]
    Cancelled(String),
}

/// Why the classifier gave up on a transcript.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClassificationFailure {
    #[error("oracle call failed: {0}")]
    Oracle(String),

    #[error("oracle call timed out after {0}s")]
    Timeout(u64),

    #[error("malformed oracle output: {0}")]
    Malformed(String),

    #[error("category `{0}` is not in the configured set")]
    UnknownCategory(String),

    #[error("confidence {0} is outside [0, 1]")]
    OutOfRange(f64),

    #[error("oracle output carried no evidence quote")]
    MissingEvidence,

    #[error("evidence {0:?} does not appear in the transcript")]
    EvidenceNotInTranscript(String),
}

/// Why the composer refused to emit a message.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompositionFailure {
    #[error("message is {len} characters, limit is {limit}")]
    TooLong { len: usize, limit: usize },

    #[error("persona `{0}` is not configured")]
    UnknownPersona(String),

    #[error("no templates for category `{0}`")]
    UnsupportedCategory(String),

    #[error("invalid template choice: {0}")]
    InvalidSlot(String),

    #[error("oracle call failed: {0}")]
    Oracle(String),
}

/// Result type alias for pulse-core
pub type Result<T> = std::result::Result<T, Error>;
