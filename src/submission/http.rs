//! HTTP-backed submitter for a real expense API

use super::ExpenseSubmitter;
use crate::error::ExpenseError;
use crate::models::{Expense, ValidatedExpense};
use crate::Result;
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::{error, info};
use uuid::Uuid;

const EXPENSES_PATH: &str = "/api/v1/expenses";

/// Posts each submission as a pending `Expense` record
pub struct HttpSubmitter {
    client: Client,
    base_url: String,
    owner_id: Uuid,
}

impl HttpSubmitter {
    pub fn new(base_url: &str, owner_id: Uuid) -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(60))
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            owner_id,
        })
    }
}

#[async_trait]
impl ExpenseSubmitter for HttpSubmitter {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn submit(&self, expense: &ValidatedExpense) -> Result<()> {
        let url = format!("{}{}", self.base_url, EXPENSES_PATH);
        let record = Expense::pending(self.owner_id, expense);

        let response = self
            .client
            .post(&url)
            .json(&record)
            .send()
            .await
            .map_err(|e| {
                error!("Expense API request failed: {}", e);
                ExpenseError::Submission(format!("Failed to reach expense API: {}", e))
            })?;

        let status = response.status();
        if !status.is_success() {
            error!(status = %status, "Expense API rejected submission");
            return Err(ExpenseError::Submission(format!(
                "Expense API returned {}",
                status
            )));
        }

        info!(expense_id = %record.id, "Expense submitted");
        Ok(())
    }
}
