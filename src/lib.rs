//! Expense Intake
//!
//! Core of an expense submission form:
//! - Pure per-field validation of the expense metadata
//! - Receipt intake with size/type limits and pluggable data extraction
//! - A form controller that serializes extraction and submission
//! - Pluggable submission (simulated backend or HTTP API)
//!
//! FLOW:
//! INPUT / FILE DROP → INTAKE → FORM STATE → VALIDATE → SUBMIT → NOTIFY

pub mod clock;
pub mod config;
pub mod error;
pub mod form;
pub mod intake;
pub mod models;
pub mod notification;
pub mod submission;
pub mod validation;

pub use error::Result;

// Re-export common types
pub use models::*;
pub use form::{ExpenseForm, ExtractionOutcome, FormSnapshot};
pub use error::{ExpenseError, IntakeError};
