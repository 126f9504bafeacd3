use chrono::Local;
use expense_intake::{
    config::FormConfig,
    form::{ExpenseForm, ExtractionOutcome},
    models::{Field, FieldValue, ReceiptFile},
    notification::NotificationCenter,
    ExpenseError,
};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = FormConfig::from_env()?;
    let notifications = Arc::new(NotificationCenter::new());
    let form = ExpenseForm::from_config(&config, notifications.clone())?;

    info!("Expense form session started");

    // An oversized scan is turned away before extraction
    let oversized = ReceiptFile::new("scan.png", 6 * 1024 * 1024, "image/png");
    if let Err(e) = form.select_file(oversized).await {
        warn!(error = %e, "Receipt rejected");
    }

    let receipt = ReceiptFile::new("receipt.jpg", 2 * 1024 * 1024, "image/jpeg");
    match form.select_file(receipt).await? {
        ExtractionOutcome::Applied(fields) => info!(
            date = ?fields.date,
            amount = ?fields.amount,
            "Receipt data applied"
        ),
        ExtractionOutcome::Superseded => warn!("Receipt extraction superseded"),
    }

    form.set_field(
        Field::Particulars,
        FieldValue::Text("Client lunch to review Q3 deliverables".to_string()),
    )
    .await?;
    form.set_field(Field::Client, FieldValue::Text("Acme Corp".to_string()))
        .await?;
    form.set_field(Field::CeNumber, FieldValue::Text("ce-2024-001".to_string()))
        .await?;

    // Lowercase CE number blocks the first attempt
    if let Err(ExpenseError::Validation(errors)) = form.submit().await {
        for (field, message) in errors.iter() {
            warn!(field = %field, "{}", message);
        }
    }

    form.set_field(Field::CeNumber, FieldValue::Text("CE-2024-001".to_string()))
        .await?;

    let result = form.submit().await;
    let snapshot = form.snapshot().await;

    println!("\n=== EXPENSE SUBMISSION ===");
    println!("Today:       {}", Local::now().date_naive());
    if let Some(date) = snapshot.values.date {
        println!("Date:        {}", date);
    }
    println!("Particulars: {}", snapshot.values.particulars);
    println!("Client:      {}", snapshot.values.client);
    println!("CE Number:   {}", snapshot.values.ce_number);
    println!("Category:    {}", snapshot.values.category);
    if let Some(amount) = snapshot.values.amount {
        println!("Amount:      ₱{:.2}", amount);
    }
    if let Some(preview) = &snapshot.preview {
        println!("Receipt:     {}", preview.caption());
    }
    if let Some(banner) = &snapshot.banner {
        println!("Error:       {}", banner);
    }
    if let Some(notification) = notifications.current() {
        println!("\n[{:?}] {}", notification.severity, notification.message);
    }

    result?;
    Ok(())
}
