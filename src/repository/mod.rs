//! Storage layer.
//!
//! Each entity gets a narrow capability trait; [`LedgerStore`] composes them
//! into the facade the services depend on. Every mutating method is one atomic
//! unit: it either applies all of its balance changes and log entries, or
//! none of them.
//!
//! Two implementations exist:
//! - [`postgres::PgLedgerStore`] / [`postgres::PgStatsStore`] for production
//! - [`memory::MemoryLedgerStore`] / [`memory::MemoryStatsStore`] for tests
//!   and local development

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::{
    error::AppError,
    models::{
        account::Account,
        operation::{HistoryQuery, Operation},
        product::Product,
        report::{ServiceReport, ServiceTransaction},
        reservation::{NewReservation, Reservation, ReservationRef},
        transaction::{NewTransaction, Transaction, TransactionStatus},
    },
};

pub mod memory;
pub mod postgres;

#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Insert a new account for `user_id`. A positive `free` is logged as a deposit.
    async fn create_account(&self, user_id: Uuid, free: Decimal) -> Result<Account, AppError>;

    async fn account_by_id(&self, account_id: Uuid) -> Result<Option<Account>, AppError>;

    async fn account_by_user_id(&self, user_id: Uuid) -> Result<Option<Account>, AppError>;

    async fn deposit(&self, account_id: Uuid, amount: Decimal) -> Result<Account, AppError>;

    /// Fails with `InsufficientBalance` when `free < amount`.
    async fn withdraw(&self, account_id: Uuid, amount: Decimal) -> Result<Account, AppError>;

    /// Returns `(from, to)` after the move.
    async fn transfer(
        &self,
        from_account_id: Uuid,
        to_account_id: Uuid,
        amount: Decimal,
    ) -> Result<(Account, Account), AppError>;

    /// Set `free` to an absolute value, logging the difference.
    async fn set_free_balance(&self, account_id: Uuid, free: Decimal) -> Result<Account, AppError>;
}

#[async_trait]
pub trait ReservationStore: Send + Sync {
    /// Move funds from `free` to `reserved` and record the reservation.
    async fn reserve(&self, reservation: NewReservation) -> Result<Reservation, AppError>;

    /// Consume a reservation: `reserved` shrinks, `free` is untouched.
    async fn revenue(&self, reference: ReservationRef) -> Result<Reservation, AppError>;

    /// Cancel a reservation: the amount goes back from `reserved` to `free`.
    async fn refund(&self, reference: ReservationRef) -> Result<Reservation, AppError>;

    async fn reservation(&self, reference: ReservationRef)
    -> Result<Option<Reservation>, AppError>;
}

#[async_trait]
pub trait TransactionStore: Send + Sync {
    /// Insert a `processed` transaction for `account_id` and reserve its amount
    /// in one unit. The reservation carries the order id, the service id as
    /// product and the new transaction's id. An order id takes at most one
    /// transaction.
    async fn create_transaction(
        &self,
        account_id: Uuid,
        transaction: NewTransaction,
    ) -> Result<Transaction, AppError>;

    async fn transaction_by_id(&self, transaction_id: Uuid)
    -> Result<Option<Transaction>, AppError>;

    async fn transactions_by_user_id(&self, user_id: Uuid) -> Result<Vec<Transaction>, AppError>;

    /// Move a `processed` transaction to a terminal status.
    ///
    /// Accepting settles the reservation linked to this transaction as
    /// revenue, rejecting as a refund, when it still exists. Reservations of
    /// other transactions or bare reservations on the same order id are never
    /// touched. Any other transition fails with
    /// `InvalidStatusTransition` and changes nothing.
    async fn update_transaction_status(
        &self,
        transaction_id: Uuid,
        status: TransactionStatus,
    ) -> Result<Transaction, AppError>;
}

#[async_trait]
pub trait OperationStore: Send + Sync {
    async fn operations(
        &self,
        account_id: Uuid,
        query: HistoryQuery,
    ) -> Result<Vec<Operation>, AppError>;
}

#[async_trait]
pub trait ProductStore: Send + Sync {
    /// Register a product name. Names are unique.
    async fn create_product(&self, name: &str) -> Result<Product, AppError>;

    async fn product_by_id(&self, product_id: Uuid) -> Result<Option<Product>, AppError>;
}

/// Facade over every ledger capability, plus a liveness probe.
#[async_trait]
pub trait LedgerStore:
    AccountStore + ReservationStore + TransactionStore + OperationStore + ProductStore
{
    async fn ping(&self) -> Result<(), AppError>;
}

/// Storage for the statistics service.
#[async_trait]
pub trait StatsStore: Send + Sync {
    /// Returns `false` when a row with the same transaction id already exists.
    async fn record_transaction(&self, transaction: ServiceTransaction) -> Result<bool, AppError>;

    async fn report(
        &self,
        service_id: Uuid,
        month: u32,
        year: i32,
    ) -> Result<Vec<ServiceReport>, AppError>;

    async fn ping(&self) -> Result<(), AppError>;
}

/// Half-open `[start, end)` range covering one calendar month in UTC.
pub(crate) fn month_bounds(month: u32, year: i32) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let start = chrono::NaiveDate::from_ymd_opt(year, month, 1)?;
    let end = if month == 12 {
        chrono::NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        chrono::NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };

    Some((
        start.and_hms_opt(0, 0, 0)?.and_utc(),
        end.and_hms_opt(0, 0, 0)?.and_utc(),
    ))
}
