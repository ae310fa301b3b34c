use thiserror::Error;

/// Custom Result type for this crate.
pub type Result<T> = std::result::Result<T, LexGraphError>;

/// Enum representing all possible errors in the wikt_graph library.
#[derive(Error, Debug)]
pub enum LexGraphError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A nested definition or relation element lacks a required field.
    /// Recovered locally by skipping the element.
    #[error("Malformed element in {context}: {reason}")]
    MalformedElement { context: String, reason: String },

    /// A word entry without a usable surface form. The entry is dropped.
    #[error("Word entry has no surface form: {0}")]
    MissingIdentity(String),

    /// The store rejected a batch. Fatal for the whole unit of work.
    #[error("Failed to persist {family}: {reason}")]
    Persistence { family: &'static str, reason: String },

    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    #[error("Referential integrity violated: {0}")]
    IntegrityViolation(String),

    #[error("Data directory not found or could not be determined")]
    DataDirNotFound,

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Internal error: {0}")]
    Internal(String), // For unexpected situations
}

impl LexGraphError {
    pub(crate) fn malformed(context: impl Into<String>, reason: impl Into<String>) -> Self {
        LexGraphError::MalformedElement {
            context: context.into(),
            reason: reason.into(),
        }
    }
}
