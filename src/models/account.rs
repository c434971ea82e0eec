//! Account data models and API request/response types.
//!
//! This module defines:
//! - `Account`: the balance row of one user
//! - Request bodies for account creation, balance adjustment, deposits,
//!   withdrawals and transfers

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Represents an account (balance) record from the database.
///
/// # Database Table
///
/// Maps to the `balances` table. Each account:
/// - Belongs to exactly one user (`user_id` is unique)
/// - Splits its funds into `free` (spendable) and `reserved` (held for
///   pending transactions)
///
/// Both amounts are `NUMERIC(20, 2)` and are never negative (enforced by
/// CHECK constraints and by every ledger operation).
#[derive(Debug, Clone, PartialEq, sqlx::FromRow, Serialize)]
pub struct Account {
    /// Unique identifier for this account (the "balance id")
    pub id: Uuid,

    /// Owning user
    pub user_id: Uuid,

    /// Spendable funds
    pub free: Decimal,

    /// Funds held against pending transactions and reservations
    pub reserved: Decimal,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

/// Request body for `POST /balance`.
///
/// ```json
/// { "user_id": "550e8400-e29b-41d4-a716-446655440000", "free": "100.00" }
/// ```
///
/// `reserved` is accepted for compatibility but must be zero: reserved funds
/// only come from reservations.
#[derive(Debug, Deserialize)]
pub struct CreateAccountRequest {
    pub user_id: Uuid,

    #[serde(default)]
    pub free: Decimal,

    #[serde(default)]
    pub reserved: Decimal,
}

/// Request body for `PUT /balance/{balance_id}`.
#[derive(Debug, Deserialize)]
pub struct UpdateBalanceRequest {
    pub free: Decimal,

    /// Must match the current reserved amount when present
    pub reserved: Option<Decimal>,
}

/// Request body for deposits and withdrawals.
#[derive(Debug, Deserialize)]
pub struct AmountRequest {
    pub amount: Decimal,
}

/// Request body for `POST /transfer`.
///
/// Both accounts are updated in the same database transaction.
#[derive(Debug, Deserialize)]
pub struct TransferRequest {
    pub from_account_id: Uuid,

    pub to_account_id: Uuid,

    pub amount: Decimal,
}

/// Response for a successful transfer: both sides after the move.
#[derive(Debug, Serialize)]
pub struct TransferResponse {
    pub from: Account,
    pub to: Account,
}
