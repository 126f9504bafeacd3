//! Core data models for expense intake

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

//
// ================= Enums =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Category {
    Meals,
    Transpo,
    Miscellaneous,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::Meals, Category::Transpo, Category::Miscellaneous];

    /// Value submitted by the category select
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Meals => "Meals",
            Category::Transpo => "Transpo",
            Category::Miscellaneous => "Miscellaneous",
        }
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "Meals" => Ok(Category::Meals),
            "Transpo" | "Transportation" => Ok(Category::Transpo),
            "Miscellaneous" => Ok(Category::Miscellaneous),
            other => Err(format!("unknown category '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ExpenseStatus {
    Draft,
    Pending,
    Approved,
    Rejected,
}

//
// ================= Fields =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "camelCase")]
pub enum Field {
    Date,
    Particulars,
    Client,
    CeNumber,
    Category,
    Amount,
    Receipt,
}

impl Field {
    pub const ALL: [Field; 7] = [
        Field::Date,
        Field::Particulars,
        Field::Client,
        Field::CeNumber,
        Field::Category,
        Field::Amount,
        Field::Receipt,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Field::Date => "date",
            Field::Particulars => "particulars",
            Field::Client => "client",
            Field::CeNumber => "ceNumber",
            Field::Category => "category",
            Field::Amount => "amount",
            Field::Receipt => "receipt",
        }
    }
}

impl FromStr for Field {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Field::ALL
            .into_iter()
            .find(|field| field.as_str() == s)
            .ok_or_else(|| format!("unknown field '{}'", s))
    }
}

/// Validation messages keyed by failing field. Absent key means valid.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<Field, String>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, field: Field) -> Option<&str> {
        self.0.get(&field).map(|s| s.as_str())
    }

    pub fn contains(&self, field: Field) -> bool {
        self.0.contains_key(&field)
    }

    /// Set or clear a single field's entry
    pub fn set(&mut self, field: Field, message: Option<String>) {
        match message {
            Some(message) => {
                self.0.insert(field, message);
            }
            None => {
                self.0.remove(&field);
            }
        }
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn fields(&self) -> impl Iterator<Item = Field> + '_ {
        self.0.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Field, &str)> {
        self.0.iter().map(|(field, message)| (*field, message.as_str()))
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined = self
            .iter()
            .map(|(field, message)| format!("{}: {}", field, message))
            .collect::<Vec<_>>()
            .join("; ");
        write!(f, "{}", joined)
    }
}

/// Per-field lifecycle as seen by the presentation layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldState {
    Pristine,
    Valid,
    Invalid,
}

//
// ================= Receipt =================
//

/// File handed over by the picker. Content is never read by the core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptFile {
    pub name: String,
    /// Size in bytes
    pub size: u64,
    pub mime_type: String,
}

impl ReceiptFile {
    pub fn new(name: impl Into<String>, size: u64, mime_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            size,
            mime_type: mime_type.into(),
        }
    }

    /// Lowercased extension without the dot
    pub fn extension(&self) -> Option<String> {
        self.name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .filter(|ext| !ext.is_empty())
    }

    pub fn is_pdf(&self) -> bool {
        self.mime_type == "application/pdf" || self.extension().as_deref() == Some("pdf")
    }

    /// Size in MiB with two decimals, e.g. "2.00 MB"
    pub fn size_label(&self) -> String {
        format!("{:.2} MB", self.size as f64 / 1024.0 / 1024.0)
    }
}

/// Values a receipt extractor managed to read. Either may be absent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedFields {
    pub date: Option<NaiveDate>,
    pub amount: Option<f64>,
}

//
// ================= Form Input =================
//

/// Raw form values for one session, valid or not
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpenseFormData {
    pub date: Option<NaiveDate>,
    pub particulars: String,
    pub client: String,
    pub ce_number: String,
    /// Raw select value; parsed into [`Category`] on validation
    pub category: String,
    pub amount: Option<f64>,
    pub receipt: Option<ReceiptFile>,
}

impl ExpenseFormData {
    /// Defaults used when the form mounts
    pub fn new(today: NaiveDate) -> Self {
        Self {
            date: Some(today),
            particulars: String::new(),
            client: String::new(),
            ce_number: String::new(),
            category: Category::Meals.as_str().to_string(),
            amount: Some(0.0),
            receipt: None,
        }
    }
}

/// A single field update coming from an input control
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Date(Option<NaiveDate>),
    Text(String),
    Amount(Option<f64>),
}

/// Form values that passed every field rule.
///
/// Only the validator constructs this, so anything holding one can rely on
/// the field invariants.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct ValidatedExpense {
    pub date: NaiveDate,
    pub particulars: String,
    pub client: String,
    pub ce_number: String,
    pub category: Category,
    pub amount: f64,
    pub receipt: ReceiptFile,
}

//
// ================= Expense Record =================
//

/// Record shape a backend stores for a submitted expense
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Expense {
    pub id: Uuid,
    pub user_id: Uuid,
    pub date: NaiveDate,
    pub particulars: String,
    pub client: String,
    pub ce_number: String,
    pub category: Category,
    pub amount: f64,
    pub status: ExpenseStatus,
    pub receipt_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Expense {
    /// New pending record for a validated submission
    pub fn pending(user_id: Uuid, expense: &ValidatedExpense) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            date: expense.date,
            particulars: expense.particulars.clone(),
            client: expense.client.clone(),
            ce_number: expense.ce_number.clone(),
            category: expense.category,
            amount: expense.amount,
            status: ExpenseStatus::Pending,
            receipt_url: None,
            created_at: now,
            updated_at: now,
        }
    }
}

//
// ================= Submission =================
//

/// Whole-form submission lifecycle, broadcast on every transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionState {
    Idle,
    Submitting,
    Succeeded,
    Failed { message: String },
}

/// What a `submit()` call did when it returned `Ok`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    Submitted,
    /// Another submission was already in flight; nothing happened
    AlreadySubmitting,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Category::Meals => "Meals",
            Category::Transpo => "Transportation",
            Category::Miscellaneous => "Miscellaneous",
        };
        write!(f, "{}", s)
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
