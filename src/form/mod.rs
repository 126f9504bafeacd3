//! Expense form state controller
//!
//! EDIT → VALIDATE FIELD → (DROP RECEIPT → EXTRACT → APPLY) → SUBMIT → NOTIFY
//!
//! All state sits behind one async mutex that is never held while an
//! extraction or a submission is awaited. A caller that abandons either
//! await leaves the form idle again.

use crate::clock::{Clock, SystemClock};
use crate::config::FormConfig;
use crate::error::{ExpenseError, IntakeError};
use crate::intake::{MockReceiptExtractor, ReceiptIntake, ReceiptPreview};
use crate::models::{
    ExpenseFormData, ExtractedFields, Field, FieldErrors, FieldState, FieldValue, ReceiptFile,
    SubmissionState, SubmitOutcome,
};
use crate::notification::{Notification, Notifier, SUBMIT_FAILURE_MESSAGE, SUBMIT_SUCCESS_MESSAGE};
use crate::submission::{ExpenseSubmitter, HttpSubmitter, SimulatedSubmitter};
use crate::validation::{create_default_validator, Validator};
use crate::Result;
use chrono::NaiveDate;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

const TRANSITION_CHANNEL_CAPACITY: usize = 16;

/// Result of a receipt selection once its extraction settled
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractionOutcome {
    /// Extracted values were written into the form
    Applied(ExtractedFields),
    /// A newer selection, removal, reset or submission made this result stale
    Superseded,
}

/// Point-in-time copy of the form for rendering
#[derive(Debug, Clone)]
pub struct FormSnapshot {
    pub values: ExpenseFormData,
    pub errors: FieldErrors,
    pub touched: BTreeSet<Field>,
    pub submission: SubmissionState,
    /// Outcome of the most recent completed submission
    pub last_outcome: Option<SubmissionState>,
    /// Form-level error from the last failed submission
    pub banner: Option<String>,
    pub intake_error: Option<IntakeError>,
    pub extracting: bool,
    pub preview: Option<ReceiptPreview>,
}

impl FormSnapshot {
    pub fn field_state(&self, field: Field) -> FieldState {
        if !self.touched.contains(&field) {
            FieldState::Pristine
        } else if self.errors.contains(field) {
            FieldState::Invalid
        } else {
            FieldState::Valid
        }
    }

    pub fn is_submitting(&self) -> bool {
        self.submission == SubmissionState::Submitting
    }
}

struct FormState {
    values: ExpenseFormData,
    errors: FieldErrors,
    touched: BTreeSet<Field>,
    submission: SubmissionState,
    last_outcome: Option<SubmissionState>,
    banner: Option<String>,
    intake_error: Option<IntakeError>,
    extracting: bool,
    preview: Option<ReceiptPreview>,
    /// Bumped on every selection, removal and reset
    selection_token: u64,
}

impl FormState {
    fn new(today: NaiveDate) -> Self {
        Self {
            values: ExpenseFormData::new(today),
            errors: FieldErrors::new(),
            touched: BTreeSet::new(),
            submission: SubmissionState::Idle,
            last_outcome: None,
            banner: None,
            intake_error: None,
            extracting: false,
            preview: None,
            selection_token: 0,
        }
    }

    fn ensure_editable(&self) -> Result<()> {
        if self.submission == SubmissionState::Submitting {
            return Err(ExpenseError::FormBusy);
        }
        Ok(())
    }
}

/// One expense form session
pub struct ExpenseForm {
    validator: Validator,
    intake: ReceiptIntake,
    submitter: Arc<dyn ExpenseSubmitter>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    reset_on_success: bool,
    state: Arc<Mutex<FormState>>,
    transitions: broadcast::Sender<SubmissionState>,
}

impl ExpenseForm {
    pub fn new(
        validator: Validator,
        intake: ReceiptIntake,
        submitter: Arc<dyn ExpenseSubmitter>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (transitions, _) = broadcast::channel(TRANSITION_CHANNEL_CAPACITY);
        let state = FormState::new(clock.today());

        Self {
            validator,
            intake,
            submitter,
            notifier,
            clock,
            reset_on_success: false,
            state: Arc::new(Mutex::new(state)),
            transitions,
        }
    }

    /// Standard rules, mock extractor, and the HTTP submitter when an API
    /// URL is configured (simulated submitter otherwise)
    pub fn from_config(config: &FormConfig, notifier: Arc<dyn Notifier>) -> Result<Self> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let extractor = MockReceiptExtractor::new(config.extraction_latency, clock.clone());
        let intake = ReceiptIntake::new(Arc::new(extractor), config.max_receipt_bytes);
        let max_receipt_bytes = intake.max_bytes();

        let submitter: Arc<dyn ExpenseSubmitter> = match &config.api_base_url {
            Some(url) => Arc::new(HttpSubmitter::new(url, config.owner_id)?),
            None => Arc::new(SimulatedSubmitter::new(config.submit_delay)),
        };

        info!(
            submitter = submitter.name(),
            max_receipt_bytes,
            "Expense form initialized"
        );

        Ok(Self::new(create_default_validator(), intake, submitter, notifier, clock)
            .with_reset_on_success(config.reset_on_success))
    }

    pub fn with_reset_on_success(mut self, reset_on_success: bool) -> Self {
        self.reset_on_success = reset_on_success;
        self
    }

    /// Replace the mount-time defaults. Fields stay pristine.
    pub fn with_values(mut self, values: ExpenseFormData) -> Self {
        let mut state = FormState::new(self.clock.today());
        state.values = values;
        self.state = Arc::new(Mutex::new(state));
        self
    }

    /// Receive every submission state transition from now on
    pub fn subscribe(&self) -> broadcast::Receiver<SubmissionState> {
        self.transitions.subscribe()
    }

    pub fn intake(&self) -> &ReceiptIntake {
        &self.intake
    }

    pub async fn snapshot(&self) -> FormSnapshot {
        let state = self.state.lock().await;
        FormSnapshot {
            values: state.values.clone(),
            errors: state.errors.clone(),
            touched: state.touched.clone(),
            submission: state.submission.clone(),
            last_outcome: state.last_outcome.clone(),
            banner: state.banner.clone(),
            intake_error: state.intake_error.clone(),
            extracting: state.extracting,
            preview: state.preview.clone(),
        }
    }

    pub async fn values(&self) -> ExpenseFormData {
        self.state.lock().await.values.clone()
    }

    pub async fn errors(&self) -> FieldErrors {
        self.state.lock().await.errors.clone()
    }

    //
    // ================= Field Edits =================
    //

    /// Update one field and re-run only its rules
    pub async fn set_field(&self, field: Field, value: FieldValue) -> Result<()> {
        let today = self.clock.today();
        let mut state = self.state.lock().await;
        state.ensure_editable()?;

        apply_value(&mut state.values, field, value)?;
        self.revalidate(&mut state, field, today);
        Ok(())
    }

    /// Write extracted values that are present; absent ones are untouched
    pub async fn set_from_extraction(&self, extracted: ExtractedFields) -> Result<()> {
        let today = self.clock.today();
        let mut state = self.state.lock().await;
        state.ensure_editable()?;

        self.apply_extraction(&mut state, &extracted, today);
        Ok(())
    }

    //
    // ================= Receipt =================
    //

    /// Attach a receipt and run extraction on it.
    ///
    /// Rejected files leave the current receipt in place. Results that
    /// resolve after a newer selection are dropped.
    pub async fn select_file(&self, file: ReceiptFile) -> Result<ExtractionOutcome> {
        let today = self.clock.today();

        let token = {
            let mut state = self.state.lock().await;
            state.ensure_editable()?;

            if let Err(e) = self.intake.check(&file) {
                state.intake_error = Some(e.clone());
                return Err(e.into());
            }

            if let Some(previous) = state.preview.take() {
                self.intake.close_preview(&previous);
            }
            state.preview = Some(self.intake.open_preview(&file));
            state.values.receipt = Some(file.clone());
            state.intake_error = None;
            state.selection_token += 1;
            state.extracting = true;
            self.revalidate(&mut state, Field::Receipt, today);

            info!(
                file = %file.name,
                size = file.size,
                token = state.selection_token,
                "Receipt accepted"
            );

            state.selection_token
        };

        let guard = CancelGuard::new(
            self.state.clone(),
            Box::new(move |state: &mut FormState| {
                if state.selection_token == token {
                    state.extracting = false;
                }
            }),
        );

        let result = self.intake.extract(&file).await;

        let mut state = self.state.lock().await;
        guard.disarm();

        if state.selection_token != token {
            warn!(
                file = %file.name,
                token,
                current = state.selection_token,
                "Discarding superseded extraction result"
            );
            return Ok(ExtractionOutcome::Superseded);
        }

        state.extracting = false;

        if state.submission == SubmissionState::Submitting {
            warn!(file = %file.name, "Discarding extraction result during submission");
            return Ok(ExtractionOutcome::Superseded);
        }

        match result {
            Ok(fields) => {
                self.apply_extraction(&mut state, &fields, self.clock.today());
                Ok(ExtractionOutcome::Applied(fields))
            }
            Err(e) => {
                warn!(file = %file.name, error = %e, "Receipt extraction failed");
                state.intake_error = Some(IntakeError::ExtractionFailed);
                Err(IntakeError::ExtractionFailed.into())
            }
        }
    }

    /// Detach the receipt, release its preview and orphan any extraction
    pub async fn remove_file(&self) -> Result<()> {
        let today = self.clock.today();
        let mut state = self.state.lock().await;
        state.ensure_editable()?;

        if let Some(preview) = state.preview.take() {
            self.intake.close_preview(&preview);
        }
        state.values.receipt = None;
        state.intake_error = None;
        state.extracting = false;
        state.selection_token += 1;
        self.revalidate(&mut state, Field::Receipt, today);

        debug!("Receipt removed");
        Ok(())
    }

    //
    // ================= Submission =================
    //

    /// Validate everything and hand the expense to the submitter.
    ///
    /// A call made while another submission is in flight does nothing.
    pub async fn submit(&self) -> Result<SubmitOutcome> {
        let today = self.clock.today();

        let expense = {
            let mut state = self.state.lock().await;

            if state.submission == SubmissionState::Submitting {
                debug!("Submit ignored: already submitting");
                return Ok(SubmitOutcome::AlreadySubmitting);
            }

            state.touched.extend(Field::ALL);

            let expense = match self.validator.parse(&state.values, today) {
                Ok(expense) => expense,
                Err(errors) => {
                    info!(
                        error_count = errors.len(),
                        fields = %errors,
                        "Submission blocked by validation errors"
                    );
                    state.errors = errors.clone();
                    return Err(ExpenseError::Validation(errors));
                }
            };

            state.errors.clear();
            state.banner = None;
            state.submission = SubmissionState::Submitting;
            self.broadcast(SubmissionState::Submitting);

            expense
        };

        let transitions = self.transitions.clone();
        let guard = CancelGuard::new(
            self.state.clone(),
            Box::new(move |state: &mut FormState| {
                if state.submission == SubmissionState::Submitting {
                    warn!("Submission abandoned by caller; form is idle again");
                    state.submission = SubmissionState::Idle;
                    let _ = transitions.send(SubmissionState::Idle);
                }
            }),
        );

        info!(
            submitter = self.submitter.name(),
            ce_number = %expense.ce_number,
            amount = expense.amount,
            "Submitting expense"
        );

        let result = self.submitter.submit(&expense).await;

        let mut state = self.state.lock().await;
        guard.disarm();
        state.submission = SubmissionState::Idle;

        match result {
            Ok(()) => {
                info!("Expense submission succeeded");

                state.errors.clear();
                if self.reset_on_success {
                    self.reset_state(&mut state, self.clock.today());
                }
                state.last_outcome = Some(SubmissionState::Succeeded);

                self.broadcast(SubmissionState::Succeeded);
                self.notifier
                    .notify(Notification::success(SUBMIT_SUCCESS_MESSAGE));
                self.broadcast(SubmissionState::Idle);

                Ok(SubmitOutcome::Submitted)
            }
            Err(e) => {
                let message = e.to_string();
                warn!(error = %message, "Expense submission failed");

                let failed = SubmissionState::Failed {
                    message: message.clone(),
                };
                state.banner = Some(message.clone());
                state.last_outcome = Some(failed.clone());

                self.broadcast(failed);
                self.notifier
                    .notify(Notification::error(SUBMIT_FAILURE_MESSAGE));
                self.broadcast(SubmissionState::Idle);

                Err(ExpenseError::Submission(message))
            }
        }
    }

    pub async fn dismiss_banner(&self) {
        self.state.lock().await.banner = None;
    }

    /// Back to mount-time defaults
    pub async fn reset(&self) -> Result<()> {
        let today = self.clock.today();
        let mut state = self.state.lock().await;
        state.ensure_editable()?;

        self.reset_state(&mut state, today);
        info!("Expense form reset");
        Ok(())
    }

    //
    // ================= Internals =================
    //

    fn revalidate(&self, state: &mut FormState, field: Field, today: NaiveDate) {
        let error = self.validator.validate_field(field, &state.values, today);

        debug!(
            field = %field,
            valid = error.is_none(),
            "Field validated"
        );

        state.touched.insert(field);
        state.errors.set(field, error);
    }

    fn apply_extraction(&self, state: &mut FormState, extracted: &ExtractedFields, today: NaiveDate) {
        if let Some(date) = extracted.date {
            state.values.date = Some(date);
            self.revalidate(state, Field::Date, today);
        }

        if let Some(amount) = extracted.amount.filter(|amount| !amount.is_nan()) {
            state.values.amount = Some(amount);
            self.revalidate(state, Field::Amount, today);
        }
    }

    fn reset_state(&self, state: &mut FormState, today: NaiveDate) {
        if let Some(preview) = state.preview.take() {
            self.intake.close_preview(&preview);
        }
        state.values = ExpenseFormData::new(today);
        state.errors.clear();
        state.touched.clear();
        state.banner = None;
        state.intake_error = None;
        state.extracting = false;
        state.selection_token += 1;
    }

    fn broadcast(&self, next: SubmissionState) {
        debug!(state = ?next, "Submission state changed");
        // No subscribers is fine
        let _ = self.transitions.send(next);
    }
}

type CancelAction = Box<dyn FnOnce(&mut FormState) + Send>;

/// Runs its action if dropped before `disarm`, i.e. when the future that
/// owns it is cancelled mid-await
struct CancelGuard {
    state: Arc<Mutex<FormState>>,
    on_cancel: Option<CancelAction>,
}

impl CancelGuard {
    fn new(state: Arc<Mutex<FormState>>, on_cancel: CancelAction) -> Self {
        Self {
            state,
            on_cancel: Some(on_cancel),
        }
    }

    fn disarm(mut self) {
        self.on_cancel = None;
    }
}

impl Drop for CancelGuard {
    fn drop(&mut self) {
        let Some(action) = self.on_cancel.take() else {
            return;
        };

        if let Ok(mut state) = self.state.try_lock() {
            action(&mut *state);
            return;
        }

        // Lock is contended; finish the cleanup on the runtime
        let state = self.state.clone();
        match Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    let mut state = state.lock().await;
                    action(&mut *state);
                });
            }
            Err(_) => warn!("No runtime to restore form state after cancellation"),
        }
    }
}

fn apply_value(values: &mut ExpenseFormData, field: Field, value: FieldValue) -> Result<()> {
    match (field, value) {
        (Field::Date, FieldValue::Date(date)) => values.date = date,
        (Field::Particulars, FieldValue::Text(text)) => values.particulars = text,
        (Field::Client, FieldValue::Text(text)) => values.client = text,
        (Field::CeNumber, FieldValue::Text(text)) => values.ce_number = text,
        (Field::Category, FieldValue::Text(text)) => values.category = text,
        (Field::Amount, FieldValue::Amount(amount)) => values.amount = amount,
        (Field::Receipt, _) => {
            return Err(ExpenseError::InvalidFieldValue {
                field,
                reason: "receipt is set through select_file / remove_file".to_string(),
            })
        }
        (field, other) => {
            return Err(ExpenseError::InvalidFieldValue {
                field,
                reason: format!("unexpected value {:?}", other),
            })
        }
    }
    Ok(())
}

//
// ================= Tests =================
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::intake::{ReceiptExtractor, MAX_RECEIPT_BYTES};
    use crate::models::ValidatedExpense;
    use crate::notification::{NotificationCenter, Severity};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::Notify;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 17).unwrap()
    }

    fn png(name: &str, size: u64) -> ReceiptFile {
        ReceiptFile::new(name, size, "image/png")
    }

    //
    // ---------- test doubles ----------
    //

    /// Returns canned fields per file name after a per-file delay
    struct ScriptedExtractor {
        script: HashMap<String, (Duration, ExtractedFields)>,
    }

    impl ScriptedExtractor {
        fn instant() -> Self {
            Self {
                script: HashMap::new(),
            }
        }

        fn with(mut self, name: &str, delay: Duration, fields: ExtractedFields) -> Self {
            self.script.insert(name.to_string(), (delay, fields));
            self
        }
    }

    #[async_trait]
    impl ReceiptExtractor for ScriptedExtractor {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn extract(&self, file: &ReceiptFile) -> Result<ExtractedFields> {
            match self.script.get(&file.name) {
                Some((delay, fields)) => {
                    tokio::time::sleep(*delay).await;
                    Ok(*fields)
                }
                None => Ok(ExtractedFields::default()),
            }
        }
    }

    struct FailingExtractor;

    #[async_trait]
    impl ReceiptExtractor for FailingExtractor {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn extract(&self, _file: &ReceiptFile) -> Result<ExtractedFields> {
            Err(ExpenseError::Extraction("unreadable image".to_string()))
        }
    }

    struct RecordingSubmitter {
        calls: AtomicUsize,
        failure: Option<String>,
    }

    impl RecordingSubmitter {
        fn ok() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                failure: None,
            })
        }

        fn failing(message: &str) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                failure: Some(message.to_string()),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ExpenseSubmitter for RecordingSubmitter {
        fn name(&self) -> &'static str {
            "recording"
        }

        async fn submit(&self, _expense: &ValidatedExpense) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.failure {
                Some(message) => Err(ExpenseError::Submission(message.clone())),
                None => Ok(()),
            }
        }
    }

    /// Blocks inside `submit` until released
    struct GatedSubmitter {
        calls: AtomicUsize,
        entered: Notify,
        release: Notify,
    }

    #[async_trait]
    impl ExpenseSubmitter for GatedSubmitter {
        fn name(&self) -> &'static str {
            "gated"
        }

        async fn submit(&self, _expense: &ValidatedExpense) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.entered.notify_one();
            self.release.notified().await;
            Ok(())
        }
    }

    fn build_form(
        extractor: Arc<dyn ReceiptExtractor>,
        submitter: Arc<dyn ExpenseSubmitter>,
    ) -> (ExpenseForm, Arc<NotificationCenter>) {
        let notifications = Arc::new(NotificationCenter::new());
        let form = ExpenseForm::new(
            create_default_validator(),
            ReceiptIntake::new(extractor, MAX_RECEIPT_BYTES),
            submitter,
            notifications.clone(),
            Arc::new(FixedClock(today())),
        );
        (form, notifications)
    }

    async fn fill_valid(form: &ExpenseForm) {
        form.select_file(png("lunch.png", 2 * 1024 * 1024)).await.unwrap();
        form.set_field(
            Field::Particulars,
            FieldValue::Text("Lunch meeting with Acme procurement".to_string()),
        )
        .await
        .unwrap();
        form.set_field(Field::Client, FieldValue::Text("Acme Corp".to_string()))
            .await
            .unwrap();
        form.set_field(Field::CeNumber, FieldValue::Text("CE-2024-001".to_string()))
            .await
            .unwrap();
        form.set_field(Field::Amount, FieldValue::Amount(Some(1250.0)))
            .await
            .unwrap();
    }

    fn drain(rx: &mut broadcast::Receiver<SubmissionState>) -> Vec<SubmissionState> {
        let mut seen = Vec::new();
        while let Ok(state) = rx.try_recv() {
            seen.push(state);
        }
        seen
    }

    //
    // ---------- field edits ----------
    //

    #[tokio::test]
    async fn test_set_field_revalidates_only_that_field() {
        let (form, _) = build_form(Arc::new(ScriptedExtractor::instant()), RecordingSubmitter::ok());

        let snapshot = form.snapshot().await;
        assert!(snapshot.errors.is_empty());
        assert_eq!(snapshot.field_state(Field::Particulars), FieldState::Pristine);

        form.set_field(Field::Particulars, FieldValue::Text("Lunch".to_string()))
            .await
            .unwrap();

        let snapshot = form.snapshot().await;
        assert_eq!(snapshot.errors.len(), 1);
        assert_eq!(
            snapshot.errors.get(Field::Particulars),
            Some("Please provide more details (minimum 10 characters)")
        );
        assert_eq!(snapshot.field_state(Field::Particulars), FieldState::Invalid);
        assert_eq!(snapshot.field_state(Field::Client), FieldState::Pristine);

        form.set_field(
            Field::Particulars,
            FieldValue::Text("Lunch with the Acme team".to_string()),
        )
        .await
        .unwrap();

        let snapshot = form.snapshot().await;
        assert!(snapshot.errors.is_empty());
        assert_eq!(snapshot.field_state(Field::Particulars), FieldState::Valid);
    }

    #[tokio::test]
    async fn test_mismatched_value_rejected() {
        let (form, _) = build_form(Arc::new(ScriptedExtractor::instant()), RecordingSubmitter::ok());

        let err = form
            .set_field(Field::Amount, FieldValue::Text("12".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ExpenseError::InvalidFieldValue {
                field: Field::Amount,
                ..
            }
        ));

        let err = form
            .set_field(Field::Receipt, FieldValue::Text("x.png".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err, ExpenseError::InvalidFieldValue { .. }));
        assert_eq!(form.values().await.amount, Some(0.0));
    }

    #[tokio::test]
    async fn test_initial_values_stay_pristine() {
        let (form, _) = build_form(Arc::new(ScriptedExtractor::instant()), RecordingSubmitter::ok());

        let mut initial = ExpenseFormData::new(today());
        initial.client = "Initech".to_string();
        let form = form.with_values(initial);

        let snapshot = form.snapshot().await;
        assert_eq!(snapshot.values.client, "Initech");
        assert_eq!(snapshot.field_state(Field::Client), FieldState::Pristine);
    }

    #[tokio::test]
    async fn test_set_from_extraction_applies_present_fields() {
        let (form, _) = build_form(Arc::new(ScriptedExtractor::instant()), RecordingSubmitter::ok());
        let original_date = form.values().await.date;

        form.set_from_extraction(ExtractedFields {
            date: None,
            amount: Some(480.25),
        })
        .await
        .unwrap();

        let snapshot = form.snapshot().await;
        assert_eq!(snapshot.values.amount, Some(480.25));
        assert_eq!(snapshot.values.date, original_date);
        assert_eq!(snapshot.field_state(Field::Amount), FieldState::Valid);
        assert_eq!(snapshot.field_state(Field::Date), FieldState::Pristine);

        form.set_from_extraction(ExtractedFields {
            date: today().succ_opt(),
            amount: Some(f64::NAN),
        })
        .await
        .unwrap();

        let snapshot = form.snapshot().await;
        assert_eq!(snapshot.values.amount, Some(480.25));
        assert_eq!(
            snapshot.errors.get(Field::Date),
            Some("Date cannot be in the future")
        );
    }

    //
    // ---------- receipt intake ----------
    //

    #[tokio::test(start_paused = true)]
    async fn test_receipt_drop_populates_date_and_amount() {
        let extractor = MockReceiptExtractor::new(
            Duration::from_millis(1500),
            Arc::new(FixedClock(today())),
        );
        let (form, _) = build_form(Arc::new(extractor), RecordingSubmitter::ok());

        // Surface the receipt error first
        assert!(form.submit().await.is_err());
        assert_eq!(
            form.errors().await.get(Field::Receipt),
            Some("Receipt is required")
        );

        let outcome = form
            .select_file(png("receipt.png", 2 * 1024 * 1024))
            .await
            .unwrap();

        let fields = match outcome {
            ExtractionOutcome::Applied(fields) => fields,
            other => panic!("unexpected outcome {:?}", other),
        };

        let snapshot = form.snapshot().await;
        assert_eq!(snapshot.values.date, fields.date);
        assert_eq!(snapshot.values.amount, fields.amount);
        assert!(!snapshot.errors.contains(Field::Receipt));
        assert!(!snapshot.errors.contains(Field::Amount));
        assert!(!snapshot.extracting);
        assert_eq!(snapshot.values.receipt.unwrap().name, "receipt.png");
        assert_eq!(form.intake().previews().live_count(), 1);
    }

    #[tokio::test]
    async fn test_oversized_receipt_rejected() {
        let (form, _) = build_form(Arc::new(ScriptedExtractor::instant()), RecordingSubmitter::ok());

        let err = form
            .select_file(png("huge.png", 6 * 1024 * 1024))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "File size must be less than 5MB");

        let snapshot = form.snapshot().await;
        assert!(snapshot.values.receipt.is_none());
        assert!(matches!(
            snapshot.intake_error,
            Some(IntakeError::FileTooLarge { .. })
        ));
        assert!(snapshot.preview.is_none());
        assert_eq!(form.intake().previews().live_count(), 0);

        // corrective action clears the intake error
        form.select_file(png("ok.png", 1024)).await.unwrap();
        assert!(form.snapshot().await.intake_error.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_extraction_is_ignored() {
        let extractor = ScriptedExtractor::instant()
            .with(
                "first.png",
                Duration::from_secs(3),
                ExtractedFields {
                    date: None,
                    amount: Some(111.0),
                },
            )
            .with(
                "second.png",
                Duration::from_secs(1),
                ExtractedFields {
                    date: None,
                    amount: Some(222.0),
                },
            );
        let (form, _) = build_form(Arc::new(extractor), RecordingSubmitter::ok());
        let form = Arc::new(form);

        let first = {
            let form = form.clone();
            tokio::spawn(async move { form.select_file(png("first.png", 1024)).await })
        };
        while form.snapshot().await.values.receipt.is_none() {
            tokio::task::yield_now().await;
        }

        let second = form.select_file(png("second.png", 1024)).await.unwrap();
        assert_eq!(
            second,
            ExtractionOutcome::Applied(ExtractedFields {
                date: None,
                amount: Some(222.0)
            })
        );

        let first = first.await.unwrap().unwrap();
        assert_eq!(first, ExtractionOutcome::Superseded);

        let snapshot = form.snapshot().await;
        assert_eq!(snapshot.values.amount, Some(222.0));
        assert_eq!(snapshot.values.receipt.unwrap().name, "second.png");
        assert!(!snapshot.extracting);
        assert_eq!(form.intake().previews().live_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_remove_file_releases_preview_and_orphans_extraction() {
        let extractor = ScriptedExtractor::instant().with(
            "slow.png",
            Duration::from_secs(2),
            ExtractedFields {
                date: None,
                amount: Some(999.0),
            },
        );
        let (form, _) = build_form(Arc::new(extractor), RecordingSubmitter::ok());
        let form = Arc::new(form);

        let pending = {
            let form = form.clone();
            tokio::spawn(async move { form.select_file(png("slow.png", 1024)).await })
        };
        while form.snapshot().await.values.receipt.is_none() {
            tokio::task::yield_now().await;
        }
        assert!(form.snapshot().await.extracting);

        form.remove_file().await.unwrap();

        let snapshot = form.snapshot().await;
        assert!(snapshot.values.receipt.is_none());
        assert!(snapshot.preview.is_none());
        assert!(!snapshot.extracting);
        assert_eq!(snapshot.errors.get(Field::Receipt), Some("Receipt is required"));
        assert_eq!(form.intake().previews().live_count(), 0);

        assert_eq!(pending.await.unwrap().unwrap(), ExtractionOutcome::Superseded);
        assert_eq!(form.values().await.amount, Some(0.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_extraction_clears_extracting_flag() {
        let extractor = ScriptedExtractor::instant().with(
            "slow.png",
            Duration::from_secs(2),
            ExtractedFields {
                date: None,
                amount: Some(999.0),
            },
        );
        let (form, _) = build_form(Arc::new(extractor), RecordingSubmitter::ok());

        let abandoned =
            tokio::time::timeout(Duration::from_millis(100), form.select_file(png("slow.png", 1024)))
                .await;
        assert!(abandoned.is_err());

        let snapshot = form.snapshot().await;
        assert!(!snapshot.extracting);
        assert_eq!(snapshot.values.receipt.unwrap().name, "slow.png");
        assert_eq!(snapshot.values.amount, Some(0.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_orphans_extraction() {
        let extractor = ScriptedExtractor::instant().with(
            "slow.png",
            Duration::from_secs(2),
            ExtractedFields {
                date: NaiveDate::from_ymd_opt(2024, 5, 1),
                amount: Some(999.0),
            },
        );
        let (form, _) = build_form(Arc::new(extractor), RecordingSubmitter::ok());
        let form = Arc::new(form);

        let pending = {
            let form = form.clone();
            tokio::spawn(async move { form.select_file(png("slow.png", 1024)).await })
        };
        while form.snapshot().await.values.receipt.is_none() {
            tokio::task::yield_now().await;
        }

        form.reset().await.unwrap();

        assert_eq!(pending.await.unwrap().unwrap(), ExtractionOutcome::Superseded);
        let values = form.values().await;
        assert_eq!(values.amount, Some(0.0));
        assert_eq!(values.date, Some(today()));
        assert!(values.receipt.is_none());
    }

    #[tokio::test]
    async fn test_extraction_failure_keeps_receipt() {
        let (form, _) = build_form(Arc::new(FailingExtractor), RecordingSubmitter::ok());

        let err = form.select_file(png("blurry.png", 1024)).await.unwrap_err();
        assert_eq!(err.to_string(), "Failed to process receipt");

        let snapshot = form.snapshot().await;
        assert!(snapshot.values.receipt.is_some());
        assert_eq!(snapshot.intake_error, Some(IntakeError::ExtractionFailed));
        assert!(!snapshot.errors.contains(Field::Receipt));
    }

    //
    // ---------- submission ----------
    //

    #[tokio::test]
    async fn test_invalid_submit_never_calls_handler() {
        let submitter = RecordingSubmitter::ok();
        let (form, _) = build_form(Arc::new(ScriptedExtractor::instant()), submitter.clone());

        let err = form.submit().await.unwrap_err();
        let errors = match err {
            ExpenseError::Validation(errors) => errors,
            other => panic!("unexpected error {:?}", other),
        };

        assert_eq!(
            errors.fields().collect::<Vec<_>>(),
            vec![
                Field::Particulars,
                Field::Client,
                Field::CeNumber,
                Field::Amount,
                Field::Receipt
            ]
        );
        assert_eq!(submitter.calls(), 0);

        let snapshot = form.snapshot().await;
        assert_eq!(snapshot.errors, errors);
        assert_eq!(snapshot.field_state(Field::Date), FieldState::Valid);
        assert_eq!(snapshot.submission, SubmissionState::Idle);
    }

    #[tokio::test]
    async fn test_future_date_blocks_submit() {
        let submitter = RecordingSubmitter::ok();
        let (form, _) = build_form(Arc::new(ScriptedExtractor::instant()), submitter.clone());
        fill_valid(&form).await;

        form.set_field(Field::Date, FieldValue::Date(today().succ_opt()))
            .await
            .unwrap();
        assert_eq!(
            form.errors().await.get(Field::Date),
            Some("Date cannot be in the future")
        );

        let err = form.submit().await.unwrap_err();
        match err {
            ExpenseError::Validation(errors) => {
                assert_eq!(errors.len(), 1);
                assert_eq!(errors.get(Field::Date), Some("Date cannot be in the future"));
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert_eq!(submitter.calls(), 0);
    }

    #[tokio::test]
    async fn test_successful_submission() {
        let submitter = RecordingSubmitter::ok();
        let (form, notifications) =
            build_form(Arc::new(ScriptedExtractor::instant()), submitter.clone());
        let mut rx = form.subscribe();
        fill_valid(&form).await;

        let outcome = form.submit().await.unwrap();
        assert_eq!(outcome, SubmitOutcome::Submitted);
        assert_eq!(submitter.calls(), 1);

        assert_eq!(
            drain(&mut rx),
            vec![
                SubmissionState::Submitting,
                SubmissionState::Succeeded,
                SubmissionState::Idle
            ]
        );

        let snapshot = form.snapshot().await;
        assert!(snapshot.errors.is_empty());
        assert_eq!(snapshot.submission, SubmissionState::Idle);
        assert_eq!(snapshot.last_outcome, Some(SubmissionState::Succeeded));
        assert_eq!(snapshot.values.client, "Acme Corp");

        let notification = notifications.current().unwrap();
        assert_eq!(notification.severity, Severity::Success);
        assert_eq!(notification.message, "Expense submitted successfully!");
    }

    #[tokio::test]
    async fn test_failed_submission_keeps_values() {
        let submitter = RecordingSubmitter::failing("network down");
        let (form, notifications) =
            build_form(Arc::new(ScriptedExtractor::instant()), submitter.clone());
        let mut rx = form.subscribe();
        fill_valid(&form).await;
        let before = form.values().await;

        let err = form.submit().await.unwrap_err();
        assert!(matches!(err, ExpenseError::Submission(ref m) if m == "network down"));

        assert_eq!(
            drain(&mut rx),
            vec![
                SubmissionState::Submitting,
                SubmissionState::Failed {
                    message: "network down".to_string()
                },
                SubmissionState::Idle
            ]
        );

        let snapshot = form.snapshot().await;
        assert_eq!(snapshot.banner.as_deref(), Some("network down"));
        assert_eq!(snapshot.values, before);
        assert_eq!(snapshot.submission, SubmissionState::Idle);
        assert_eq!(notifications.current().unwrap().severity, Severity::Error);

        // retry is allowed and reaches the handler again
        assert!(form.submit().await.is_err());
        assert_eq!(submitter.calls(), 2);

        form.dismiss_banner().await;
        assert!(form.snapshot().await.banner.is_none());
    }

    #[tokio::test]
    async fn test_double_submit_invokes_handler_once() {
        let submitter = Arc::new(GatedSubmitter {
            calls: AtomicUsize::new(0),
            entered: Notify::new(),
            release: Notify::new(),
        });
        let (form, _) = build_form(Arc::new(ScriptedExtractor::instant()), submitter.clone());
        fill_valid(&form).await;
        let form = Arc::new(form);

        let first = {
            let form = form.clone();
            tokio::spawn(async move { form.submit().await })
        };
        submitter.entered.notified().await;

        assert_eq!(form.submit().await.unwrap(), SubmitOutcome::AlreadySubmitting);
        assert!(form.snapshot().await.is_submitting());

        // edits are disabled while submitting
        assert!(matches!(
            form.set_field(Field::Client, FieldValue::Text("Other".to_string()))
                .await,
            Err(ExpenseError::FormBusy)
        ));
        assert!(matches!(
            form.select_file(png("other.png", 1024)).await,
            Err(ExpenseError::FormBusy)
        ));
        assert!(matches!(form.remove_file().await, Err(ExpenseError::FormBusy)));

        submitter.release.notify_one();
        assert_eq!(first.await.unwrap().unwrap(), SubmitOutcome::Submitted);
        assert_eq!(submitter.calls.load(Ordering::SeqCst), 1);
        assert!(!form.snapshot().await.is_submitting());
    }

    #[tokio::test(start_paused = true)]
    async fn test_extraction_during_submission_is_discarded() {
        let extractor = ScriptedExtractor::instant().with(
            "slow.png",
            Duration::from_secs(2),
            ExtractedFields {
                date: NaiveDate::from_ymd_opt(2024, 5, 1),
                amount: Some(999.0),
            },
        );
        let submitter = Arc::new(GatedSubmitter {
            calls: AtomicUsize::new(0),
            entered: Notify::new(),
            release: Notify::new(),
        });
        let (form, _) = build_form(Arc::new(extractor), submitter.clone());
        fill_valid(&form).await;
        let form = Arc::new(form);

        let pending = {
            let form = form.clone();
            tokio::spawn(async move { form.select_file(png("slow.png", 1024)).await })
        };
        while form.snapshot().await.values.receipt.as_ref().map(|r| r.name.as_str())
            != Some("slow.png")
        {
            tokio::task::yield_now().await;
        }

        let submitting = {
            let form = form.clone();
            tokio::spawn(async move { form.submit().await })
        };
        submitter.entered.notified().await;

        // extraction settles while the submitter is still blocked
        assert_eq!(pending.await.unwrap().unwrap(), ExtractionOutcome::Superseded);

        let snapshot = form.snapshot().await;
        assert!(snapshot.is_submitting());
        assert!(!snapshot.extracting);
        assert_eq!(snapshot.values.amount, Some(1250.0));
        assert_eq!(snapshot.values.date, Some(today()));

        submitter.release.notify_one();
        assert_eq!(submitting.await.unwrap().unwrap(), SubmitOutcome::Submitted);
        assert_eq!(form.values().await.amount, Some(1250.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_submit_returns_form_to_idle() {
        let (form, _) = build_form(
            Arc::new(ScriptedExtractor::instant()),
            Arc::new(SimulatedSubmitter::new(Duration::from_secs(2))),
        );
        let mut rx = form.subscribe();
        fill_valid(&form).await;

        let abandoned = tokio::time::timeout(Duration::from_millis(100), form.submit()).await;
        assert!(abandoned.is_err());

        assert_eq!(
            drain(&mut rx),
            vec![SubmissionState::Submitting, SubmissionState::Idle]
        );
        assert!(!form.snapshot().await.is_submitting());

        form.set_field(Field::Client, FieldValue::Text("Initech".to_string()))
            .await
            .unwrap();
        assert_eq!(form.submit().await.unwrap(), SubmitOutcome::Submitted);
        form.reset().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_on_success_orphans_extraction() {
        let extractor = ScriptedExtractor::instant().with(
            "slow.png",
            Duration::from_secs(2),
            ExtractedFields {
                date: NaiveDate::from_ymd_opt(2024, 5, 1),
                amount: Some(999.0),
            },
        );
        let (form, _) = build_form(Arc::new(extractor), RecordingSubmitter::ok());
        let form = Arc::new(form.with_reset_on_success(true));
        fill_valid(&form).await;

        let pending = {
            let form = form.clone();
            tokio::spawn(async move { form.select_file(png("slow.png", 1024)).await })
        };
        while !form.snapshot().await.extracting {
            tokio::task::yield_now().await;
        }

        assert_eq!(form.submit().await.unwrap(), SubmitOutcome::Submitted);

        assert_eq!(pending.await.unwrap().unwrap(), ExtractionOutcome::Superseded);
        let values = form.values().await;
        assert_eq!(values, ExpenseFormData::new(today()));
    }

    #[tokio::test]
    async fn test_reset_on_success_clears_form() {
        let (form, _) = build_form(Arc::new(ScriptedExtractor::instant()), RecordingSubmitter::ok());
        let form = form.with_reset_on_success(true);
        fill_valid(&form).await;
        assert_eq!(form.intake().previews().live_count(), 1);

        form.submit().await.unwrap();

        let snapshot = form.snapshot().await;
        assert_eq!(snapshot.values, ExpenseFormData::new(today()));
        assert!(snapshot.touched.is_empty());
        assert!(snapshot.preview.is_none());
        assert_eq!(snapshot.last_outcome, Some(SubmissionState::Succeeded));
        assert_eq!(form.intake().previews().live_count(), 0);
    }

    #[tokio::test]
    async fn test_manual_reset() {
        let (form, _) = build_form(Arc::new(ScriptedExtractor::instant()), RecordingSubmitter::ok());
        fill_valid(&form).await;
        form.set_field(Field::Client, FieldValue::Text("A".to_string()))
            .await
            .unwrap();

        form.reset().await.unwrap();

        let snapshot = form.snapshot().await;
        assert_eq!(snapshot.values, ExpenseFormData::new(today()));
        assert!(snapshot.errors.is_empty());
        assert_eq!(form.intake().previews().live_count(), 0);
    }
}
