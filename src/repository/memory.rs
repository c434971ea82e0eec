//! In-memory stores for development and testing.
//!
//! Each mutation is staged on a copy of the whole state and swapped in only
//! when every step succeeded, which gives the same all-or-nothing behaviour as
//! a database transaction. The single mutex serializes writers the way row
//! locks do in PostgreSQL.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{
    AccountStore, LedgerStore, OperationStore, ProductStore, ReservationStore, StatsStore,
    TransactionStore, month_bounds,
};
use crate::{
    error::AppError,
    models::{
        account::Account,
        operation::{HistoryQuery, HistorySort, Operation, OperationType},
        product::Product,
        report::{ServiceReport, ServiceTransaction},
        reservation::{NewReservation, Reservation, ReservationRef},
        transaction::{NewTransaction, Transaction, TransactionStatus},
    },
    services::AMOUNT_LIMIT,
};

#[derive(Debug, Clone, Default)]
struct LedgerState {
    accounts: HashMap<Uuid, Account>,
    transactions: Vec<Transaction>,
    reservations: HashMap<Uuid, Reservation>,
    operations: Vec<Operation>,
    products: HashMap<Uuid, Product>,
    next_operation_id: i64,
    fail_log_appends: bool,
}

impl LedgerState {
    fn account(&self, account_id: Uuid) -> Result<Account, AppError> {
        self.accounts
            .get(&account_id)
            .cloned()
            .ok_or(AppError::NotFound("account"))
    }

    fn apply_deltas(
        &mut self,
        account_id: Uuid,
        free_delta: Decimal,
        reserved_delta: Decimal,
    ) -> Result<Account, AppError> {
        let account = self
            .accounts
            .get_mut(&account_id)
            .ok_or(AppError::NotFound("account"))?;

        // Same bound as NUMERIC(20, 2).
        let (Some(free), Some(reserved)) = (
            account.free.checked_add(free_delta),
            account.reserved.checked_add(reserved_delta),
        ) else {
            return Err(AppError::Validation("amount is out of range".to_string()));
        };
        if free >= AMOUNT_LIMIT || reserved >= AMOUNT_LIMIT {
            return Err(AppError::Validation("amount is out of range".to_string()));
        }
        if free < Decimal::ZERO || reserved < Decimal::ZERO {
            return Err(AppError::Storage(format!(
                "balance check violated for account {account_id}"
            )));
        }

        account.free = free;
        account.reserved = reserved;
        account.updated_at = Utc::now();

        Ok(account.clone())
    }

    fn append_operation(
        &mut self,
        account_id: Uuid,
        amount: Decimal,
        operation_type: OperationType,
        product_id: Option<Uuid>,
        order_id: Option<Uuid>,
    ) -> Result<(), AppError> {
        if self.fail_log_appends {
            return Err(AppError::Storage("operation log unavailable".to_string()));
        }

        self.next_operation_id += 1;
        self.operations.push(Operation {
            id: self.next_operation_id,
            account_id,
            amount,
            operation_type,
            product_id,
            product_name: None,
            order_id,
            created_at: Utc::now(),
        });

        Ok(())
    }

    fn find_reservation(&self, reference: ReservationRef) -> Option<&Reservation> {
        match reference {
            ReservationRef::Id(id) => self.reservations.get(&id),
            ReservationRef::OrderId(order_id) => {
                self.reservations.values().find(|r| r.order_id == order_id)
            }
            ReservationRef::TransactionId(transaction_id) => self
                .reservations
                .values()
                .find(|r| r.transaction_id == Some(transaction_id)),
        }
    }

    fn reserve(
        &mut self,
        reservation: &NewReservation,
        transaction_id: Option<Uuid>,
    ) -> Result<Reservation, AppError> {
        let account = self.account(reservation.account_id)?;
        if account.free < reservation.amount {
            return Err(AppError::InsufficientBalance);
        }
        if self
            .find_reservation(ReservationRef::OrderId(reservation.order_id))
            .is_some()
        {
            return Err(AppError::Validation(
                "a reservation for this order already exists".to_string(),
            ));
        }

        let created = Reservation {
            id: Uuid::new_v4(),
            account_id: reservation.account_id,
            product_id: reservation.product_id,
            order_id: reservation.order_id,
            amount: reservation.amount,
            transaction_id,
            created_at: Utc::now(),
        };
        self.reservations.insert(created.id, created.clone());

        self.apply_deltas(reservation.account_id, -reservation.amount, reservation.amount)?;
        self.append_operation(
            reservation.account_id,
            reservation.amount,
            OperationType::Reservation,
            Some(reservation.product_id),
            Some(reservation.order_id),
        )?;

        Ok(created)
    }

    fn settle(
        &mut self,
        reference: ReservationRef,
        operation_type: OperationType,
    ) -> Result<Option<Reservation>, AppError> {
        let Some(id) = self.find_reservation(reference).map(|r| r.id) else {
            return Ok(None);
        };
        let Some(reservation) = self.reservations.remove(&id) else {
            return Ok(None);
        };

        let free_delta = match operation_type {
            OperationType::Refund => reservation.amount,
            _ => Decimal::ZERO,
        };
        self.apply_deltas(reservation.account_id, free_delta, -reservation.amount)?;
        self.append_operation(
            reservation.account_id,
            reservation.amount,
            operation_type,
            Some(reservation.product_id),
            Some(reservation.order_id),
        )?;

        Ok(Some(reservation))
    }
}

/// Ledger store holding everything in process memory.
#[derive(Debug, Default)]
pub struct MemoryLedgerStore {
    state: Mutex<LedgerState>,
    fail_operation_log: AtomicBool,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every operation-log append fail until switched off again.
    ///
    /// Mutations that need a log entry then fail as a whole and leave the
    /// state exactly as it was.
    pub fn fail_operation_log(&self, fail: bool) {
        self.fail_operation_log.store(fail, Ordering::SeqCst);
    }

    /// Every operation recorded so far, oldest first.
    pub async fn all_operations(&self) -> Vec<Operation> {
        self.state.lock().await.operations.clone()
    }

    pub async fn all_reservations(&self) -> Vec<Reservation> {
        self.state.lock().await.reservations.values().cloned().collect()
    }

    /// Run `f` on a staged copy of the state and keep the result only on success.
    async fn atomically<T>(
        &self,
        f: impl FnOnce(&mut LedgerState) -> Result<T, AppError>,
    ) -> Result<T, AppError> {
        let mut state = self.state.lock().await;

        let mut draft = state.clone();
        draft.fail_log_appends = self.fail_operation_log.load(Ordering::SeqCst);

        let value = f(&mut draft)?;
        *state = draft;

        Ok(value)
    }
}

#[async_trait]
impl AccountStore for MemoryLedgerStore {
    async fn create_account(&self, user_id: Uuid, free: Decimal) -> Result<Account, AppError> {
        self.atomically(|state| {
            if state.accounts.values().any(|a| a.user_id == user_id) {
                return Err(AppError::Validation(
                    "an account already exists for this user".to_string(),
                ));
            }

            let now = Utc::now();
            let account = Account {
                id: Uuid::new_v4(),
                user_id,
                free,
                reserved: Decimal::ZERO,
                created_at: now,
                updated_at: now,
            };
            state.accounts.insert(account.id, account.clone());

            if free > Decimal::ZERO {
                state.append_operation(account.id, free, OperationType::Deposit, None, None)?;
            }

            Ok(account)
        })
        .await
    }

    async fn account_by_id(&self, account_id: Uuid) -> Result<Option<Account>, AppError> {
        Ok(self.state.lock().await.accounts.get(&account_id).cloned())
    }

    async fn account_by_user_id(&self, user_id: Uuid) -> Result<Option<Account>, AppError> {
        let state = self.state.lock().await;
        Ok(state.accounts.values().find(|a| a.user_id == user_id).cloned())
    }

    async fn deposit(&self, account_id: Uuid, amount: Decimal) -> Result<Account, AppError> {
        self.atomically(|state| {
            let account = state.apply_deltas(account_id, amount, Decimal::ZERO)?;
            state.append_operation(account_id, amount, OperationType::Deposit, None, None)?;
            Ok(account)
        })
        .await
    }

    async fn withdraw(&self, account_id: Uuid, amount: Decimal) -> Result<Account, AppError> {
        self.atomically(|state| {
            if state.account(account_id)?.free < amount {
                return Err(AppError::InsufficientBalance);
            }
            let account = state.apply_deltas(account_id, -amount, Decimal::ZERO)?;
            state.append_operation(account_id, amount, OperationType::Withdraw, None, None)?;
            Ok(account)
        })
        .await
    }

    async fn transfer(
        &self,
        from_account_id: Uuid,
        to_account_id: Uuid,
        amount: Decimal,
    ) -> Result<(Account, Account), AppError> {
        self.atomically(|state| {
            let from = state.account(from_account_id)?;
            state.account(to_account_id)?;
            if from.free < amount {
                return Err(AppError::InsufficientBalance);
            }

            let from = state.apply_deltas(from_account_id, -amount, Decimal::ZERO)?;
            let to = state.apply_deltas(to_account_id, amount, Decimal::ZERO)?;
            state.append_operation(
                from_account_id,
                amount,
                OperationType::TransferFrom,
                None,
                None,
            )?;
            state.append_operation(to_account_id, amount, OperationType::TransferTo, None, None)?;

            Ok((from, to))
        })
        .await
    }

    async fn set_free_balance(&self, account_id: Uuid, free: Decimal) -> Result<Account, AppError> {
        self.atomically(|state| {
            let current = state.account(account_id)?;
            let delta = free - current.free;
            if delta.is_zero() {
                return Ok(current);
            }

            let account = state.apply_deltas(account_id, delta, Decimal::ZERO)?;
            let operation_type = if delta > Decimal::ZERO {
                OperationType::Deposit
            } else {
                OperationType::Withdraw
            };
            state.append_operation(account_id, delta.abs(), operation_type, None, None)?;

            Ok(account)
        })
        .await
    }
}

#[async_trait]
impl ReservationStore for MemoryLedgerStore {
    async fn reserve(&self, reservation: NewReservation) -> Result<Reservation, AppError> {
        self.atomically(|state| state.reserve(&reservation, None)).await
    }

    async fn revenue(&self, reference: ReservationRef) -> Result<Reservation, AppError> {
        self.atomically(|state| {
            state
                .settle(reference, OperationType::Revenue)?
                .ok_or(AppError::NotFound("reservation"))
        })
        .await
    }

    async fn refund(&self, reference: ReservationRef) -> Result<Reservation, AppError> {
        self.atomically(|state| {
            state
                .settle(reference, OperationType::Refund)?
                .ok_or(AppError::NotFound("reservation"))
        })
        .await
    }

    async fn reservation(
        &self,
        reference: ReservationRef,
    ) -> Result<Option<Reservation>, AppError> {
        Ok(self.state.lock().await.find_reservation(reference).cloned())
    }
}

#[async_trait]
impl TransactionStore for MemoryLedgerStore {
    async fn create_transaction(
        &self,
        account_id: Uuid,
        transaction: NewTransaction,
    ) -> Result<Transaction, AppError> {
        self.atomically(|state| {
            if state
                .transactions
                .iter()
                .any(|t| t.order_id == transaction.order_id)
            {
                return Err(AppError::Validation(
                    "a transaction for this order already exists".to_string(),
                ));
            }

            let now = Utc::now();
            let created = Transaction {
                id: Uuid::new_v4(),
                user_id: transaction.user_id,
                order_id: transaction.order_id,
                service_id: transaction.service_id,
                amount: transaction.amount,
                status: TransactionStatus::Processed,
                created_at: now,
                updated_at: now,
            };
            state.transactions.push(created.clone());

            state.reserve(
                &NewReservation {
                    account_id,
                    product_id: transaction.service_id,
                    order_id: transaction.order_id,
                    amount: transaction.amount,
                },
                Some(created.id),
            )?;

            Ok(created)
        })
        .await
    }

    async fn transaction_by_id(
        &self,
        transaction_id: Uuid,
    ) -> Result<Option<Transaction>, AppError> {
        let state = self.state.lock().await;
        Ok(state
            .transactions
            .iter()
            .find(|t| t.id == transaction_id)
            .cloned())
    }

    async fn transactions_by_user_id(&self, user_id: Uuid) -> Result<Vec<Transaction>, AppError> {
        let state = self.state.lock().await;
        Ok(state
            .transactions
            .iter()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn update_transaction_status(
        &self,
        transaction_id: Uuid,
        status: TransactionStatus,
    ) -> Result<Transaction, AppError> {
        self.atomically(|state| {
            let transaction = state
                .transactions
                .iter_mut()
                .find(|t| t.id == transaction_id)
                .ok_or(AppError::NotFound("transaction"))?;

            if !transaction.status.can_transition_to(status) {
                return Err(AppError::InvalidStatusTransition {
                    from: transaction.status,
                    to: status,
                });
            }

            transaction.status = status;
            transaction.updated_at = Utc::now();
            let updated = transaction.clone();

            let operation_type = match status {
                TransactionStatus::Accepted => OperationType::Revenue,
                _ => OperationType::Refund,
            };
            state.settle(ReservationRef::TransactionId(updated.id), operation_type)?;

            Ok(updated)
        })
        .await
    }
}

#[async_trait]
impl OperationStore for MemoryLedgerStore {
    async fn operations(
        &self,
        account_id: Uuid,
        query: HistoryQuery,
    ) -> Result<Vec<Operation>, AppError> {
        let state = self.state.lock().await;

        let mut operations: Vec<Operation> = state
            .operations
            .iter()
            .filter(|op| op.account_id == account_id)
            .map(|op| Operation {
                product_name: op
                    .product_id
                    .and_then(|id| state.products.get(&id))
                    .map(|product| product.name.clone()),
                ..op.clone()
            })
            .collect();

        match query.sort {
            HistorySort::Date => {
                operations.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)))
            }
            HistorySort::Amount => {
                operations.sort_by(|a, b| b.amount.cmp(&a.amount).then(b.id.cmp(&a.id)))
            }
        }

        Ok(operations
            .into_iter()
            .skip(usize::try_from(query.offset).unwrap_or(0))
            .take(usize::try_from(query.limit).unwrap_or(0))
            .collect())
    }
}

#[async_trait]
impl ProductStore for MemoryLedgerStore {
    async fn create_product(&self, name: &str) -> Result<Product, AppError> {
        self.atomically(|state| {
            if state.products.values().any(|p| p.name == name) {
                return Err(AppError::Validation(
                    "a product with this name already exists".to_string(),
                ));
            }

            let product = Product {
                id: Uuid::new_v4(),
                name: name.to_string(),
                created_at: Utc::now(),
            };
            state.products.insert(product.id, product.clone());

            Ok(product)
        })
        .await
    }

    async fn product_by_id(&self, product_id: Uuid) -> Result<Option<Product>, AppError> {
        Ok(self.state.lock().await.products.get(&product_id).cloned())
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn ping(&self) -> Result<(), AppError> {
        Ok(())
    }
}

/// Statistics store holding every recorded transaction in memory.
#[derive(Debug, Default)]
pub struct MemoryStatsStore {
    transactions: Mutex<HashMap<Uuid, ServiceTransaction>>,
}

impl MemoryStatsStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.transactions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.transactions.lock().await.is_empty()
    }
}

#[async_trait]
impl StatsStore for MemoryStatsStore {
    async fn record_transaction(&self, transaction: ServiceTransaction) -> Result<bool, AppError> {
        let mut transactions = self.transactions.lock().await;
        if transactions.contains_key(&transaction.id) {
            return Ok(false);
        }

        transactions.insert(transaction.id, transaction);
        Ok(true)
    }

    async fn report(
        &self,
        service_id: Uuid,
        month: u32,
        year: i32,
    ) -> Result<Vec<ServiceReport>, AppError> {
        let (start, end) = month_bounds(month, year)
            .ok_or_else(|| AppError::Validation("invalid month or year".to_string()))?;

        let transactions = self.transactions.lock().await;
        let matching: Vec<&ServiceTransaction> = transactions
            .values()
            .filter(|t| t.service_id == service_id && t.created_at >= start && t.created_at < end)
            .collect();

        if matching.is_empty() {
            return Ok(Vec::new());
        }

        Ok(vec![ServiceReport {
            service_id,
            amount: matching.iter().map(|t| t.amount).sum(),
        }])
    }

    async fn ping(&self) -> Result<(), AppError> {
        Ok(())
    }
}
