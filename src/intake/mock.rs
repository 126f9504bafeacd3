//! Mock receipt extractor
//!
//! Stands in for a real OCR service: waits a fixed latency, then makes up a
//! plausible date and amount.

use super::ReceiptExtractor;
use crate::clock::Clock;
use crate::models::{ExtractedFields, ReceiptFile};
use crate::Result;
use async_trait::async_trait;
use chrono::{Duration as DateDelta, NaiveDate};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

const LOOKBACK_DAYS: i64 = 30;
const MIN_AMOUNT: f64 = 100.0;
const MAX_AMOUNT: f64 = 5000.0;

pub struct MockReceiptExtractor {
    latency: Duration,
    clock: Arc<dyn Clock>,
}

impl MockReceiptExtractor {
    pub fn new(latency: Duration, clock: Arc<dyn Clock>) -> Self {
        Self { latency, clock }
    }
}

#[async_trait]
impl ReceiptExtractor for MockReceiptExtractor {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn extract(&self, file: &ReceiptFile) -> Result<ExtractedFields> {
        tokio::time::sleep(self.latency).await;

        let fields = synthesize(self.clock.today());

        info!(
            file = %file.name,
            date = ?fields.date,
            amount = ?fields.amount,
            "Mock receipt data extracted"
        );

        Ok(fields)
    }
}

/// Date within the past 30 days, amount in [100, 5000] rounded to cents
fn synthesize(today: NaiveDate) -> ExtractedFields {
    let mut rng = rand::thread_rng();

    let days_back = rng.gen_range(0..LOOKBACK_DAYS);
    let date = today - DateDelta::days(days_back);

    let raw = rng.gen_range(MIN_AMOUNT..=MAX_AMOUNT);
    let amount = (raw * 100.0).round() / 100.0;

    ExtractedFields {
        date: Some(date),
        amount: Some(amount),
    }
}
