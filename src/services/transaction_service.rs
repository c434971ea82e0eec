//! Transaction service - lifecycle of client payment transactions.
//!
//! This service handles:
//! - Creating a transaction together with the reservation of its amount
//! - Reading transactions by id and by user
//! - The one-way status machine (`processed -> accepted | rejected`)
//! - Publishing the transaction-accepted event
//!
//! # Atomicity Guarantees
//!
//! Creation and status updates are single store transactions: the
//! transaction row, the reservation and the balance move are written
//! together or not at all.
//!
//! Publishing is not part of that unit. It runs on its own task after the
//! status update committed, and its failure is only logged.

use std::sync::Arc;

use uuid::Uuid;

use super::validate_amount;
use crate::{
    broker::{EventPublisher, Message, NEW_TRANSACTION_KEY, TransactionAccepted},
    error::AppError,
    models::transaction::{NewTransaction, Transaction, TransactionStatus},
    repository::LedgerStore,
};

#[derive(Clone)]
pub struct TransactionService {
    store: Arc<dyn LedgerStore>,
    publisher: Arc<dyn EventPublisher>,
}

impl TransactionService {
    pub fn new(store: Arc<dyn LedgerStore>, publisher: Arc<dyn EventPublisher>) -> Self {
        Self { store, publisher }
    }

    /// Create a `processed` transaction and reserve its amount.
    ///
    /// # Errors
    ///
    /// - `NotFound`: the user has no account
    /// - `InsufficientBalance`: free funds are lower than the amount; nothing
    ///   is written
    /// - `Validation`: bad amount, or the order already has a transaction or
    ///   a reservation
    pub async fn create(&self, request: NewTransaction) -> Result<Transaction, AppError> {
        validate_amount(request.amount)?;

        let account = self
            .store
            .account_by_user_id(request.user_id)
            .await?
            .ok_or(AppError::NotFound("account"))?;

        let transaction = self.store.create_transaction(account.id, request).await?;

        tracing::info!(
            transaction_id = %transaction.id,
            account_id = %account.id,
            amount = %transaction.amount,
            "transaction created"
        );
        Ok(transaction)
    }

    pub async fn get(&self, transaction_id: Uuid) -> Result<Transaction, AppError> {
        self.store
            .transaction_by_id(transaction_id)
            .await?
            .ok_or(AppError::NotFound("transaction"))
    }

    pub async fn list_by_user(&self, user_id: Uuid) -> Result<Vec<Transaction>, AppError> {
        self.store.transactions_by_user_id(user_id).await
    }

    /// Move a transaction to `status`.
    ///
    /// Accepting it emits exactly one transaction-accepted event. The caller
    /// never waits for, nor sees the outcome of, the publish.
    pub async fn update_status(
        &self,
        transaction_id: Uuid,
        status: &str,
    ) -> Result<Transaction, AppError> {
        let status: TransactionStatus = status.parse().map_err(AppError::Validation)?;

        let transaction = self
            .store
            .update_transaction_status(transaction_id, status)
            .await?;

        tracing::info!(transaction_id = %transaction.id, status = %transaction.status, "transaction status updated");

        if transaction.status == TransactionStatus::Accepted {
            self.publish_accepted(&transaction);
        }

        Ok(transaction)
    }

    fn publish_accepted(&self, transaction: &Transaction) {
        let publisher = Arc::clone(&self.publisher);
        let transaction_id = transaction.id;
        let message = Message::new(NEW_TRANSACTION_KEY, TransactionAccepted::from(transaction));

        tokio::spawn(async move {
            let result = match message.into_raw() {
                Ok(message) => publisher.push(&message).await,
                Err(e) => Err(e),
            };

            match result {
                Ok(()) => tracing::debug!(transaction_id = %transaction_id, "transaction event published"),
                Err(e) => {
                    tracing::error!(transaction_id = %transaction_id, error = %e, "failed to publish transaction event")
                }
            }
        });
    }
}
