//! Error types for the validation pipeline.
//!
//! Validation-domain problems never surface here: they become [`Finding`]s
//! (see [`crate::finding`]) so a run always returns the complete list.
//! Only pre-validation fatals abort a run, since no pointer-addressed
//! diagnosis is possible for them.
//!
//! [`Finding`]: crate::finding::Finding

use thiserror::Error;

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, ValidatorError>;

/// Errors that abort a run before any findings are produced.
#[derive(Error, Debug)]
pub enum ValidatorError {
    /// The document cannot be pointer-addressed at all.
    #[error("Malformed document: {reason}")]
    MalformedDocument { reason: String },

    /// A rule definition or template registry problem, detected at load
    /// time and surfaced to the caller distinctly from validation findings.
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Serialization errors from reading rule or schema inputs.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ValidatorError {
    /// Create a malformed-document error.
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedDocument {
            reason: reason.into(),
        }
    }

    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }
}
