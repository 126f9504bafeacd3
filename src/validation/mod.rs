//! Field validation for the expense form
//!
//! Rules-based, pure and synchronous.
//! Values + today in, field errors out.

use crate::models::{
    Category, ExpenseFormData, Field, FieldErrors, ValidatedExpense,
};
use chrono::NaiveDate;
use lazy_static::lazy_static;
use regex::Regex;
use tracing::debug;

pub const MIN_PARTICULARS_CHARS: usize = 10;
pub const MIN_CLIENT_CHARS: usize = 2;
pub const MAX_AMOUNT: f64 = 100_000.0;

lazy_static! {
    static ref CE_NUMBER_PATTERN: Regex =
        Regex::new(r"^[A-Z0-9-]+$").expect("CE number pattern is a valid regex");
}

/// Trait for a single field rule
pub trait FieldRule: Send + Sync {
    fn name(&self) -> &'static str;

    /// Field whose error entry this rule owns
    fn field(&self) -> Field;

    /// Error message when the rule fails, `None` when it passes
    fn check(&self, values: &ExpenseFormData, today: NaiveDate) -> Option<String>;
}

/// Validator that applies registered rules field by field
pub struct Validator {
    rules: Vec<Box<dyn FieldRule>>,
}

impl Validator {
    pub fn new() -> Self {
        Self {
            rules: Vec::new(),
        }
    }

    pub fn add_rule(&mut self, rule: Box<dyn FieldRule>) {
        self.rules.push(rule);
    }

    /// Validate every field. First failing rule per field wins.
    pub fn validate(&self, values: &ExpenseFormData, today: NaiveDate) -> FieldErrors {
        let mut errors = FieldErrors::new();

        for field in Field::ALL {
            errors.set(field, self.validate_field(field, values, today));
        }

        debug!(
            rule_count = self.rules.len(),
            error_count = errors.len(),
            "Form validated"
        );

        errors
    }

    /// Validate one field, leaving every other field alone
    pub fn validate_field(
        &self,
        field: Field,
        values: &ExpenseFormData,
        today: NaiveDate,
    ) -> Option<String> {
        self.rules
            .iter()
            .filter(|rule| rule.field() == field)
            .find_map(|rule| rule.check(values, today))
    }

    /// Validate and convert into the typed submission value
    pub fn parse(
        &self,
        values: &ExpenseFormData,
        today: NaiveDate,
    ) -> std::result::Result<ValidatedExpense, FieldErrors> {
        let errors = self.validate(values, today);
        if !errors.is_empty() {
            return Err(errors);
        }

        // Rules above guarantee each conversion; any gap means a custom rule
        // set skipped a field, which is reported against that field.
        let mut missing = FieldErrors::new();

        let date = values.date;
        if date.is_none() {
            missing.set(Field::Date, Some(DATE_REQUIRED.to_string()));
        }

        let category = values.category.parse::<Category>().ok();
        if category.is_none() {
            missing.set(Field::Category, Some(CATEGORY_INVALID.to_string()));
        }

        let amount = values.amount.filter(|amount| !amount.is_nan());
        if amount.is_none() {
            missing.set(Field::Amount, Some(AMOUNT_REQUIRED.to_string()));
        }

        let receipt = values.receipt.clone();
        if receipt.is_none() {
            missing.set(Field::Receipt, Some(RECEIPT_REQUIRED.to_string()));
        }

        match (date, category, amount, receipt) {
            (Some(date), Some(category), Some(amount), Some(receipt)) => Ok(ValidatedExpense {
                date,
                particulars: values.particulars.clone(),
                client: values.client.clone(),
                ce_number: values.ce_number.clone(),
                category,
                amount,
                receipt,
            }),
            _ => Err(missing),
        }
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::new()
    }
}

//
// ================= Messages =================
//

const DATE_REQUIRED: &str = "Date is required";
const DATE_IN_FUTURE: &str = "Date cannot be in the future";
const PARTICULARS_REQUIRED: &str = "Particulars are required";
const PARTICULARS_TOO_SHORT: &str = "Please provide more details (minimum 10 characters)";
const CLIENT_REQUIRED: &str = "Client is required";
const CLIENT_TOO_SHORT: &str = "Client name is too short";
const CE_NUMBER_REQUIRED: &str = "CE Number is required";
const CE_NUMBER_FORMAT: &str =
    "CE Number must contain only uppercase letters, numbers, and hyphens";
const CATEGORY_REQUIRED: &str = "Category is required";
const CATEGORY_INVALID: &str = "Invalid category";
const AMOUNT_REQUIRED: &str = "Amount is required";
const AMOUNT_NOT_POSITIVE: &str = "Amount must be positive";
const AMOUNT_TOO_LARGE: &str = "Amount exceeds maximum limit";
const RECEIPT_REQUIRED: &str = "Receipt is required";

//
// ========== Field Rules ==========
//

/// Rule: date present and not after today
pub struct DateRule;

impl FieldRule for DateRule {
    fn name(&self) -> &'static str {
        "date_not_in_future"
    }

    fn field(&self) -> Field {
        Field::Date
    }

    fn check(&self, values: &ExpenseFormData, today: NaiveDate) -> Option<String> {
        match values.date {
            None => Some(DATE_REQUIRED.to_string()),
            Some(date) if date > today => Some(DATE_IN_FUTURE.to_string()),
            Some(_) => None,
        }
    }
}

/// Rule: required text with a minimum character count
pub struct MinLengthRule {
    field: Field,
    min_chars: usize,
    required_message: &'static str,
    too_short_message: &'static str,
}

impl MinLengthRule {
    pub fn particulars() -> Self {
        Self {
            field: Field::Particulars,
            min_chars: MIN_PARTICULARS_CHARS,
            required_message: PARTICULARS_REQUIRED,
            too_short_message: PARTICULARS_TOO_SHORT,
        }
    }

    pub fn client() -> Self {
        Self {
            field: Field::Client,
            min_chars: MIN_CLIENT_CHARS,
            required_message: CLIENT_REQUIRED,
            too_short_message: CLIENT_TOO_SHORT,
        }
    }

    fn text<'a>(&self, values: &'a ExpenseFormData) -> &'a str {
        match self.field {
            Field::Client => &values.client,
            _ => &values.particulars,
        }
    }
}

impl FieldRule for MinLengthRule {
    fn name(&self) -> &'static str {
        match self.field {
            Field::Client => "client_min_length",
            _ => "particulars_min_length",
        }
    }

    fn field(&self) -> Field {
        self.field
    }

    fn check(&self, values: &ExpenseFormData, _today: NaiveDate) -> Option<String> {
        let text = self.text(values);

        if text.is_empty() {
            Some(self.required_message.to_string())
        } else if text.chars().count() < self.min_chars {
            Some(self.too_short_message.to_string())
        } else {
            None
        }
    }
}

/// Rule: CE number limited to uppercase letters, digits and hyphens
pub struct CeNumberRule;

impl FieldRule for CeNumberRule {
    fn name(&self) -> &'static str {
        "ce_number_format"
    }

    fn field(&self) -> Field {
        Field::CeNumber
    }

    fn check(&self, values: &ExpenseFormData, _today: NaiveDate) -> Option<String> {
        if values.ce_number.is_empty() {
            Some(CE_NUMBER_REQUIRED.to_string())
        } else if !CE_NUMBER_PATTERN.is_match(&values.ce_number) {
            Some(CE_NUMBER_FORMAT.to_string())
        } else {
            None
        }
    }
}

/// Rule: category is one of the fixed values
pub struct CategoryRule;

impl FieldRule for CategoryRule {
    fn name(&self) -> &'static str {
        "category_known"
    }

    fn field(&self) -> Field {
        Field::Category
    }

    fn check(&self, values: &ExpenseFormData, _today: NaiveDate) -> Option<String> {
        if values.category.is_empty() {
            Some(CATEGORY_REQUIRED.to_string())
        } else if values.category.parse::<Category>().is_err() {
            Some(CATEGORY_INVALID.to_string())
        } else {
            None
        }
    }
}

/// Rule: amount in (0, MAX_AMOUNT]
pub struct AmountRule;

impl FieldRule for AmountRule {
    fn name(&self) -> &'static str {
        "amount_bounds"
    }

    fn field(&self) -> Field {
        Field::Amount
    }

    fn check(&self, values: &ExpenseFormData, _today: NaiveDate) -> Option<String> {
        match values.amount {
            None => Some(AMOUNT_REQUIRED.to_string()),
            Some(amount) if amount.is_nan() => Some(AMOUNT_REQUIRED.to_string()),
            Some(amount) if amount <= 0.0 => Some(AMOUNT_NOT_POSITIVE.to_string()),
            Some(amount) if amount > MAX_AMOUNT => Some(AMOUNT_TOO_LARGE.to_string()),
            Some(_) => None,
        }
    }
}

/// Rule: a receipt is attached
pub struct ReceiptRule;

impl FieldRule for ReceiptRule {
    fn name(&self) -> &'static str {
        "receipt_attached"
    }

    fn field(&self) -> Field {
        Field::Receipt
    }

    fn check(&self, values: &ExpenseFormData, _today: NaiveDate) -> Option<String> {
        values
            .receipt
            .is_none()
            .then(|| RECEIPT_REQUIRED.to_string())
    }
}

/// Create a validator with the standard expense form rules
pub fn create_default_validator() -> Validator {
    let mut validator = Validator::new();
    validator.add_rule(Box::new(DateRule));
    validator.add_rule(Box::new(MinLengthRule::particulars()));
    validator.add_rule(Box::new(MinLengthRule::client()));
    validator.add_rule(Box::new(CeNumberRule));
    validator.add_rule(Box::new(CategoryRule));
    validator.add_rule(Box::new(AmountRule));
    validator.add_rule(Box::new(ReceiptRule));
    validator
}

/// Validate with the standard rule set
pub fn validate(values: &ExpenseFormData, today: NaiveDate) -> FieldErrors {
    create_default_validator().validate(values, today)
}

//
// ================= Tests =================
//
