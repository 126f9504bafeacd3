//! Error types for expense intake

use crate::models::{Field, FieldErrors};
use thiserror::Error;

/// Result type alias for expense form operations
pub type Result<T> = std::result::Result<T, ExpenseError>;

#[derive(Error, Debug)]
pub enum ExpenseError {

    // =============================
    // Form Session Errors
    // =============================

    #[error("Validation failed: {0}")]
    Validation(FieldErrors),

    #[error(transparent)]
    Intake(#[from] IntakeError),

    /// Displays the handler's message verbatim so it can be shown as a banner
    #[error("{0}")]
    Submission(String),

    #[error("Form is submitting; edits are disabled")]
    FormBusy,

    #[error("Invalid value for field {field}: {reason}")]
    InvalidFieldValue { field: Field, reason: String },

    #[error("Extraction error: {0}")]
    Extraction(String),

    #[error("Configuration error: {0}")]
    Config(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),
}

/// Receipt upload failures, shown next to the upload control
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IntakeError {
    #[error("File size must be less than {}MB", megabytes(.max))]
    FileTooLarge { size: u64, max: u64 },

    #[error("Unsupported file type: {0}")]
    UnsupportedType(String),

    #[error("Failed to process receipt")]
    ExtractionFailed,
}

const MIB: u64 = 1024 * 1024;

/// Whole MiB print bare ("5"), anything else with two decimals ("0.50")
fn megabytes(bytes: &u64) -> String {
    if *bytes % MIB == 0 {
        (*bytes / MIB).to_string()
    } else {
        format!("{:.2}", *bytes as f64 / MIB as f64)
    }
}
