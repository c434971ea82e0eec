//! Operation log models.
//!
//! Every balance-affecting action appends one row to `operations` in the same
//! database transaction as the balance change it documents. Rows are never
//! updated or deleted.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationType {
    Deposit,
    Withdraw,
    TransferFrom,
    TransferTo,
    Reservation,
    Revenue,
    Refund,
}

impl OperationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationType::Deposit => "deposit",
            OperationType::Withdraw => "withdraw",
            OperationType::TransferFrom => "transfer_from",
            OperationType::TransferTo => "transfer_to",
            OperationType::Reservation => "reservation",
            OperationType::Revenue => "revenue",
            OperationType::Refund => "refund",
        }
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "deposit" => Ok(OperationType::Deposit),
            "withdraw" => Ok(OperationType::Withdraw),
            "transfer_from" => Ok(OperationType::TransferFrom),
            "transfer_to" => Ok(OperationType::TransferTo),
            "reservation" => Ok(OperationType::Reservation),
            "revenue" => Ok(OperationType::Revenue),
            "refund" => Ok(OperationType::Refund),
            _ => Err(format!("Invalid operation type: {}", s)),
        }
    }
}

impl TryFrom<String> for OperationType {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// One immutable ledger log entry.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow, Serialize)]
pub struct Operation {
    pub id: i64,
    pub account_id: Uuid,
    pub amount: Decimal,

    #[sqlx(try_from = "String")]
    pub operation_type: OperationType,

    /// Set for reservation, revenue and refund entries
    pub product_id: Option<Uuid>,
    /// Catalog name of `product_id`, when the product is registered
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_name: Option<String>,
    pub order_id: Option<Uuid>,

    pub created_at: DateTime<Utc>,
}

pub const DEFAULT_HISTORY_LIMIT: i64 = 10;
pub const MAX_HISTORY_LIMIT: i64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistorySort {
    /// Newest first
    Date,
    /// Largest first
    Amount,
}

/// Validated history page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryQuery {
    pub sort: HistorySort,
    pub limit: i64,
    pub offset: i64,
}

impl Default for HistoryQuery {
    fn default() -> Self {
        Self {
            sort: HistorySort::Date,
            limit: DEFAULT_HISTORY_LIMIT,
            offset: 0,
        }
    }
}

/// Query string of `GET /balance/{balance_id}/operations`.
#[derive(Debug, Default, Deserialize)]
pub struct HistoryParams {
    pub sort: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl TryFrom<HistoryParams> for HistoryQuery {
    type Error = AppError;

    fn try_from(params: HistoryParams) -> Result<Self, Self::Error> {
        let sort = match params.sort.as_deref() {
            None | Some("") | Some("date") => HistorySort::Date,
            Some("amount") => HistorySort::Amount,
            Some(other) => {
                return Err(AppError::Validation(format!("unknown sort type: {other}")));
            }
        };

        let limit = match params.limit {
            None | Some(0) => DEFAULT_HISTORY_LIMIT,
            Some(limit) if limit < 0 => {
                return Err(AppError::Validation("limit must not be negative".to_string()));
            }
            Some(limit) => limit.min(MAX_HISTORY_LIMIT),
        };

        let offset = params.offset.unwrap_or(0);
        if offset < 0 {
            return Err(AppError::Validation("offset must not be negative".to_string()));
        }

        Ok(Self {
            sort,
            limit,
            offset,
        })
    }
}
