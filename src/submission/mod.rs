//! Submission handler trait and implementations
//!
//! Receives only validated expenses. Errors carry the message shown to the
//! user in the form banner.

use crate::models::ValidatedExpense;
use crate::Result;
use async_trait::async_trait;
use std::time::Duration;
use tracing::info;

pub mod http;
pub use http::HttpSubmitter;

/// Trait for sending a validated expense somewhere
#[async_trait]
pub trait ExpenseSubmitter: Send + Sync {
    fn name(&self) -> &'static str;

    async fn submit(&self, expense: &ValidatedExpense) -> Result<()>;
}

/// Simulated backend: fixed delay, always succeeds
pub struct SimulatedSubmitter {
    delay: Duration,
}

impl SimulatedSubmitter {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl ExpenseSubmitter for SimulatedSubmitter {
    fn name(&self) -> &'static str {
        "simulated"
    }

    async fn submit(&self, expense: &ValidatedExpense) -> Result<()> {
        tokio::time::sleep(self.delay).await;

        info!(
            date = %expense.date,
            client = %expense.client,
            ce_number = %expense.ce_number,
            category = %expense.category,
            amount = expense.amount,
            receipt = %expense.receipt.name,
            "Expense submitted (simulated)"
        );

        Ok(())
    }
}
