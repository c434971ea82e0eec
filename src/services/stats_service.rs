//! Statistics aggregator: records accepted transactions and builds monthly
//! per-service revenue reports.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::validate_amount;
use crate::{
    broker::TransactionAccepted,
    error::AppError,
    models::report::{ReportQuery, ServiceReport, ServiceTransaction},
    repository::StatsStore,
};

#[derive(Clone)]
pub struct StatsService {
    store: Arc<dyn StatsStore>,
}

impl StatsService {
    pub fn new(store: Arc<dyn StatsStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn StatsStore> {
        &self.store
    }

    /// Store one accepted transaction, dated by the event timestamp.
    ///
    /// Returns `false` when the transaction was already recorded.
    pub async fn record_transaction(
        &self,
        event: &TransactionAccepted,
        timestamp: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        validate_amount(event.amount)?;

        let inserted = self
            .store
            .record_transaction(ServiceTransaction {
                id: event.transaction_id,
                service_id: event.service_id,
                amount: event.amount,
                created_at: timestamp,
            })
            .await?;

        if inserted {
            tracing::info!(
                transaction_id = %event.transaction_id,
                service_id = %event.service_id,
                amount = %event.amount,
                "transaction recorded"
            );
        } else {
            tracing::debug!(transaction_id = %event.transaction_id, "duplicate transaction ignored");
        }

        Ok(inserted)
    }

    /// Revenue of one service over one calendar month; empty when nothing matches.
    pub async fn report(&self, query: ReportQuery) -> Result<Vec<ServiceReport>, AppError> {
        if !(1..=12).contains(&query.month) {
            return Err(AppError::Validation(
                "month must be between 1 and 12".to_string(),
            ));
        }

        self.store
            .report(query.service_id, query.month, query.year)
            .await
    }
}
