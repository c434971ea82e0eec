//! Transaction data models and API request/response types.
//!
//! A transaction is a client's request to pay `amount` to a service for an
//! order. Creating it reserves the funds; its status then moves exactly once,
//! from `processed` to `accepted` or `rejected`.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle state of a transaction.
///
/// `Processed` is the initial, pending state. `Accepted` and `Rejected` are
/// terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Processed,
    Accepted,
    Rejected,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Processed => "processed",
            TransactionStatus::Accepted => "accepted",
            TransactionStatus::Rejected => "rejected",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransactionStatus::Processed)
    }

    /// Only `processed -> accepted` and `processed -> rejected` are legal.
    pub fn can_transition_to(&self, next: TransactionStatus) -> bool {
        !self.is_terminal() && next.is_terminal()
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "processed" | "pending" => Ok(TransactionStatus::Processed),
            "accepted" => Ok(TransactionStatus::Accepted),
            "rejected" => Ok(TransactionStatus::Rejected),
            _ => Err(format!("Invalid transaction status: {}", s)),
        }
    }
}

impl TryFrom<String> for TransactionStatus {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Represents a transaction record from the database.
///
/// # Database Table
///
/// Maps to the `transactions` table. The reservation created alongside it is
/// keyed by the same `order_id`.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow, Serialize)]
pub struct Transaction {
    pub id: Uuid,

    /// User whose account pays for the order
    pub user_id: Uuid,

    pub order_id: Uuid,

    /// Service being paid for; becomes the product of the reservation
    pub service_id: Uuid,

    /// Always positive
    pub amount: Decimal,

    #[sqlx(try_from = "String")]
    pub status: TransactionStatus,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

/// Request body for `POST /transaction`.
///
/// ```json
/// {
///   "user_id": "550e8400-e29b-41d4-a716-446655440000",
///   "order_id": "660e8400-e29b-41d4-a716-446655440001",
///   "service_id": "770e8400-e29b-41d4-a716-446655440002",
///   "amount": "30.00"
/// }
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct NewTransaction {
    pub user_id: Uuid,
    pub order_id: Uuid,
    pub service_id: Uuid,
    pub amount: Decimal,
}

/// Request body for `PUT /transaction/{transaction_id}`.
///
/// The status is kept as a string so an unknown value becomes a validation
/// error rather than a body rejection.
#[derive(Debug, Deserialize)]
pub struct UpdateTransactionRequest {
    pub status: String,
}

/// Response body for `GET /transaction/user/{user_id}`.
#[derive(Debug, Serialize)]
pub struct TransactionsResponse {
    pub transactions: Vec<Transaction>,
}
