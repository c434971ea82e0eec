//! PostgreSQL stores.
//!
//! # Atomicity Guarantees
//!
//! Every mutation runs inside one PostgreSQL transaction. Rows whose balance is
//! checked before being changed are read with `FOR UPDATE`, so concurrent
//! withdrawals, transfers and reservations on the same account serialize on
//! the row lock instead of racing on a stale read. Any early return drops the
//! transaction, which rolls it back.

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::PgConnection;
use uuid::Uuid;

use super::{
    AccountStore, LedgerStore, OperationStore, ProductStore, ReservationStore, StatsStore,
    TransactionStore, month_bounds,
};
use crate::{
    db::DbPool,
    error::AppError,
    models::{
        account::Account,
        operation::{HistoryQuery, HistorySort, Operation, OperationType},
        product::Product,
        report::{ServiceReport, ServiceTransaction},
        reservation::{NewReservation, Reservation, ReservationRef},
        transaction::{NewTransaction, Transaction, TransactionStatus},
    },
};

/// Ledger store backed by the balance-service database.
#[derive(Debug, Clone)]
pub struct PgLedgerStore {
    pool: DbPool,
}

impl PgLedgerStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

/// What happens to the funds when a reservation is removed.
#[derive(Debug, Clone, Copy)]
enum Settlement {
    Revenue,
    Refund,
}

fn map_unique_violation(err: sqlx::Error, message: &str) -> AppError {
    match &err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            AppError::Validation(message.to_string())
        }
        _ => err.into(),
    }
}

/// Lock an account row for the rest of the transaction.
async fn lock_account(conn: &mut PgConnection, account_id: Uuid) -> Result<Account, AppError> {
    sqlx::query_as::<_, Account>("SELECT * FROM balances WHERE id = $1 FOR UPDATE")
        .bind(account_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(AppError::NotFound("account"))
}

/// Add `free_delta` to `free` and `reserved_delta` to `reserved`.
async fn apply_deltas(
    conn: &mut PgConnection,
    account_id: Uuid,
    free_delta: Decimal,
    reserved_delta: Decimal,
) -> Result<Account, AppError> {
    sqlx::query_as::<_, Account>(
        r#"
        UPDATE balances
        SET free = free + $1,
            reserved = reserved + $2,
            updated_at = NOW()
        WHERE id = $3
        RETURNING *
        "#,
    )
    .bind(free_delta)
    .bind(reserved_delta)
    .bind(account_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or(AppError::NotFound("account"))
}

async fn append_operation(
    conn: &mut PgConnection,
    account_id: Uuid,
    amount: Decimal,
    operation_type: OperationType,
    product_id: Option<Uuid>,
    order_id: Option<Uuid>,
) -> Result<(), AppError> {
    sqlx::query(
        r#"
        INSERT INTO operations (account_id, amount, operation_type, product_id, order_id)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(account_id)
    .bind(amount)
    .bind(operation_type.as_str())
    .bind(product_id)
    .bind(order_id)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Lock the account, check its free balance, move `amount` into `reserved`,
/// insert the reservation row and log it.
async fn reserve_in(
    conn: &mut PgConnection,
    reservation: &NewReservation,
    transaction_id: Option<Uuid>,
) -> Result<Reservation, AppError> {
    let account = lock_account(conn, reservation.account_id).await?;
    if account.free < reservation.amount {
        return Err(AppError::InsufficientBalance);
    }

    let created = sqlx::query_as::<_, Reservation>(
        r#"
        INSERT INTO reservations (account_id, product_id, order_id, amount, transaction_id)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING *
        "#,
    )
    .bind(reservation.account_id)
    .bind(reservation.product_id)
    .bind(reservation.order_id)
    .bind(reservation.amount)
    .bind(transaction_id)
    .fetch_one(&mut *conn)
    .await
    .map_err(|e| map_unique_violation(e, "a reservation for this order already exists"))?;

    apply_deltas(conn, reservation.account_id, -reservation.amount, reservation.amount).await?;
    append_operation(
        conn,
        reservation.account_id,
        reservation.amount,
        OperationType::Reservation,
        Some(reservation.product_id),
        Some(reservation.order_id),
    )
    .await?;

    Ok(created)
}

async fn delete_reservation(
    conn: &mut PgConnection,
    reference: ReservationRef,
) -> Result<Option<Reservation>, AppError> {
    let (sql, key) = match reference {
        ReservationRef::Id(id) => ("DELETE FROM reservations WHERE id = $1 RETURNING *", id),
        ReservationRef::OrderId(order_id) => (
            "DELETE FROM reservations WHERE order_id = $1 RETURNING *",
            order_id,
        ),
        ReservationRef::TransactionId(transaction_id) => (
            "DELETE FROM reservations WHERE transaction_id = $1 RETURNING *",
            transaction_id,
        ),
    };

    let reservation = sqlx::query_as::<_, Reservation>(sql)
        .bind(key)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(reservation)
}

/// Release the reserved amount of an already deleted reservation.
async fn settle_in(
    conn: &mut PgConnection,
    reservation: &Reservation,
    settlement: Settlement,
) -> Result<(), AppError> {
    let (free_delta, operation_type) = match settlement {
        Settlement::Revenue => (Decimal::ZERO, OperationType::Revenue),
        Settlement::Refund => (reservation.amount, OperationType::Refund),
    };

    apply_deltas(conn, reservation.account_id, free_delta, -reservation.amount).await?;
    append_operation(
        conn,
        reservation.account_id,
        reservation.amount,
        operation_type,
        Some(reservation.product_id),
        Some(reservation.order_id),
    )
    .await
}

impl PgLedgerStore {
    async fn settle(
        &self,
        reference: ReservationRef,
        settlement: Settlement,
    ) -> Result<Reservation, AppError> {
        let mut tx = self.pool.begin().await?;

        let reservation = delete_reservation(&mut tx, reference)
            .await?
            .ok_or(AppError::NotFound("reservation"))?;
        settle_in(&mut tx, &reservation, settlement).await?;

        tx.commit().await?;

        Ok(reservation)
    }
}

#[async_trait]
impl AccountStore for PgLedgerStore {
    async fn create_account(&self, user_id: Uuid, free: Decimal) -> Result<Account, AppError> {
        let mut tx = self.pool.begin().await?;

        let account = sqlx::query_as::<_, Account>(
            "INSERT INTO balances (user_id, free, reserved) VALUES ($1, $2, 0) RETURNING *",
        )
        .bind(user_id)
        .bind(free)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_unique_violation(e, "an account already exists for this user"))?;

        if free > Decimal::ZERO {
            append_operation(&mut tx, account.id, free, OperationType::Deposit, None, None)
                .await?;
        }

        tx.commit().await?;

        Ok(account)
    }

    async fn account_by_id(&self, account_id: Uuid) -> Result<Option<Account>, AppError> {
        let account = sqlx::query_as::<_, Account>("SELECT * FROM balances WHERE id = $1")
            .bind(account_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(account)
    }

    async fn account_by_user_id(&self, user_id: Uuid) -> Result<Option<Account>, AppError> {
        let account = sqlx::query_as::<_, Account>("SELECT * FROM balances WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(account)
    }

    async fn deposit(&self, account_id: Uuid, amount: Decimal) -> Result<Account, AppError> {
        let mut tx = self.pool.begin().await?;

        let account = apply_deltas(&mut tx, account_id, amount, Decimal::ZERO).await?;
        append_operation(&mut tx, account_id, amount, OperationType::Deposit, None, None).await?;

        tx.commit().await?;

        Ok(account)
    }

    async fn withdraw(&self, account_id: Uuid, amount: Decimal) -> Result<Account, AppError> {
        let mut tx = self.pool.begin().await?;

        let current = lock_account(&mut tx, account_id).await?;
        if current.free < amount {
            tx.rollback().await?;
            return Err(AppError::InsufficientBalance);
        }

        let account = apply_deltas(&mut tx, account_id, -amount, Decimal::ZERO).await?;
        append_operation(&mut tx, account_id, amount, OperationType::Withdraw, None, None)
            .await?;

        tx.commit().await?;

        Ok(account)
    }

    async fn transfer(
        &self,
        from_account_id: Uuid,
        to_account_id: Uuid,
        amount: Decimal,
    ) -> Result<(Account, Account), AppError> {
        let mut tx = self.pool.begin().await?;

        // Lock both rows in id order so opposite transfers cannot deadlock.
        let locked = sqlx::query_as::<_, Account>(
            "SELECT * FROM balances WHERE id = ANY($1) ORDER BY id FOR UPDATE",
        )
        .bind(vec![from_account_id, to_account_id])
        .fetch_all(&mut *tx)
        .await?;

        let from = locked
            .iter()
            .find(|a| a.id == from_account_id)
            .ok_or(AppError::NotFound("account"))?;
        if !locked.iter().any(|a| a.id == to_account_id) {
            return Err(AppError::NotFound("account"));
        }

        if from.free < amount {
            tx.rollback().await?;
            return Err(AppError::InsufficientBalance);
        }

        let from = apply_deltas(&mut tx, from_account_id, -amount, Decimal::ZERO).await?;
        let to = apply_deltas(&mut tx, to_account_id, amount, Decimal::ZERO).await?;
        append_operation(
            &mut tx,
            from_account_id,
            amount,
            OperationType::TransferFrom,
            None,
            None,
        )
        .await?;
        append_operation(&mut tx, to_account_id, amount, OperationType::TransferTo, None, None)
            .await?;

        tx.commit().await?;

        Ok((from, to))
    }

    async fn set_free_balance(&self, account_id: Uuid, free: Decimal) -> Result<Account, AppError> {
        let mut tx = self.pool.begin().await?;

        let current = lock_account(&mut tx, account_id).await?;
        let delta = free - current.free;
        if delta.is_zero() {
            return Ok(current);
        }

        let account = apply_deltas(&mut tx, account_id, delta, Decimal::ZERO).await?;
        let operation_type = if delta > Decimal::ZERO {
            OperationType::Deposit
        } else {
            OperationType::Withdraw
        };
        append_operation(&mut tx, account_id, delta.abs(), operation_type, None, None).await?;

        tx.commit().await?;

        Ok(account)
    }
}

#[async_trait]
impl ReservationStore for PgLedgerStore {
    async fn reserve(&self, reservation: NewReservation) -> Result<Reservation, AppError> {
        let mut tx = self.pool.begin().await?;

        let created = reserve_in(&mut tx, &reservation, None).await?;

        tx.commit().await?;

        Ok(created)
    }

    async fn revenue(&self, reference: ReservationRef) -> Result<Reservation, AppError> {
        self.settle(reference, Settlement::Revenue).await
    }

    async fn refund(&self, reference: ReservationRef) -> Result<Reservation, AppError> {
        self.settle(reference, Settlement::Refund).await
    }

    async fn reservation(
        &self,
        reference: ReservationRef,
    ) -> Result<Option<Reservation>, AppError> {
        let (sql, key) = match reference {
            ReservationRef::Id(id) => ("SELECT * FROM reservations WHERE id = $1", id),
            ReservationRef::OrderId(order_id) => {
                ("SELECT * FROM reservations WHERE order_id = $1", order_id)
            }
            ReservationRef::TransactionId(transaction_id) => (
                "SELECT * FROM reservations WHERE transaction_id = $1",
                transaction_id,
            ),
        };

        let reservation = sqlx::query_as::<_, Reservation>(sql)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        Ok(reservation)
    }
}

#[async_trait]
impl TransactionStore for PgLedgerStore {
    async fn create_transaction(
        &self,
        account_id: Uuid,
        transaction: NewTransaction,
    ) -> Result<Transaction, AppError> {
        let mut tx = self.pool.begin().await?;

        let created = sqlx::query_as::<_, Transaction>(
            r#"
            INSERT INTO transactions (user_id, order_id, service_id, amount, status)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(transaction.user_id)
        .bind(transaction.order_id)
        .bind(transaction.service_id)
        .bind(transaction.amount)
        .bind(TransactionStatus::Processed.as_str())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_unique_violation(e, "a transaction for this order already exists"))?;

        let reservation = NewReservation {
            account_id,
            product_id: transaction.service_id,
            order_id: transaction.order_id,
            amount: transaction.amount,
        };
        reserve_in(&mut tx, &reservation, Some(created.id)).await?;

        tx.commit().await?;

        Ok(created)
    }

    async fn transaction_by_id(
        &self,
        transaction_id: Uuid,
    ) -> Result<Option<Transaction>, AppError> {
        let transaction =
            sqlx::query_as::<_, Transaction>("SELECT * FROM transactions WHERE id = $1")
                .bind(transaction_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(transaction)
    }

    async fn transactions_by_user_id(&self, user_id: Uuid) -> Result<Vec<Transaction>, AppError> {
        let transactions = sqlx::query_as::<_, Transaction>(
            "SELECT * FROM transactions WHERE user_id = $1 ORDER BY created_at, id",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(transactions)
    }

    async fn update_transaction_status(
        &self,
        transaction_id: Uuid,
        status: TransactionStatus,
    ) -> Result<Transaction, AppError> {
        let mut tx = self.pool.begin().await?;

        let current = sqlx::query_as::<_, Transaction>(
            "SELECT * FROM transactions WHERE id = $1 FOR UPDATE",
        )
        .bind(transaction_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(AppError::NotFound("transaction"))?;

        if !current.status.can_transition_to(status) {
            return Err(AppError::InvalidStatusTransition {
                from: current.status,
                to: status,
            });
        }

        let updated = sqlx::query_as::<_, Transaction>(
            r#"
            UPDATE transactions
            SET status = $1,
                updated_at = NOW()
            WHERE id = $2
            RETURNING *
            "#,
        )
        .bind(status.as_str())
        .bind(transaction_id)
        .fetch_one(&mut *tx)
        .await?;

        let settlement = match status {
            TransactionStatus::Accepted => Settlement::Revenue,
            _ => Settlement::Refund,
        };
        if let Some(reservation) =
            delete_reservation(&mut tx, ReservationRef::TransactionId(current.id)).await?
        {
            settle_in(&mut tx, &reservation, settlement).await?;
        }

        tx.commit().await?;

        Ok(updated)
    }
}

#[async_trait]
impl OperationStore for PgLedgerStore {
    async fn operations(
        &self,
        account_id: Uuid,
        query: HistoryQuery,
    ) -> Result<Vec<Operation>, AppError> {
        let order_by = match query.sort {
            HistorySort::Date => "o.created_at DESC, o.id DESC",
            HistorySort::Amount => "o.amount DESC, o.id DESC",
        };
        let sql = format!(
            r#"
            SELECT o.*, p.name AS product_name
            FROM operations o
            LEFT JOIN products p ON p.id = o.product_id
            WHERE o.account_id = $1
            ORDER BY {order_by}
            LIMIT $2 OFFSET $3
            "#
        );

        let operations = sqlx::query_as::<_, Operation>(&sql)
            .bind(account_id)
            .bind(query.limit)
            .bind(query.offset)
            .fetch_all(&self.pool)
            .await?;

        Ok(operations)
    }
}

#[async_trait]
impl ProductStore for PgLedgerStore {
    async fn create_product(&self, name: &str) -> Result<Product, AppError> {
        let product =
            sqlx::query_as::<_, Product>("INSERT INTO products (name) VALUES ($1) RETURNING *")
                .bind(name)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| map_unique_violation(e, "a product with this name already exists"))?;

        Ok(product)
    }

    async fn product_by_id(&self, product_id: Uuid) -> Result<Option<Product>, AppError> {
        let product = sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = $1")
            .bind(product_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(product)
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn ping(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// Statistics store backed by the stats-service database.
#[derive(Debug, Clone)]
pub struct PgStatsStore {
    pool: DbPool,
}

impl PgStatsStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StatsStore for PgStatsStore {
    async fn record_transaction(&self, transaction: ServiceTransaction) -> Result<bool, AppError> {
        let inserted = sqlx::query(
            r#"
            INSERT INTO service_transactions (id, service_id, amount, created_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(transaction.id)
        .bind(transaction.service_id)
        .bind(transaction.amount)
        .bind(transaction.created_at)
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(inserted == 1)
    }

    async fn report(
        &self,
        service_id: Uuid,
        month: u32,
        year: i32,
    ) -> Result<Vec<ServiceReport>, AppError> {
        let (start, end) = month_bounds(month, year)
            .ok_or_else(|| AppError::Validation("invalid month or year".to_string()))?;

        let reports = sqlx::query_as::<_, ServiceReport>(
            r#"
            SELECT service_id, SUM(amount) AS amount
            FROM service_transactions
            WHERE service_id = $1
              AND created_at >= $2
              AND created_at < $3
            GROUP BY service_id
            "#,
        )
        .bind(service_id)
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;

        Ok(reports)
    }

    async fn ping(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
