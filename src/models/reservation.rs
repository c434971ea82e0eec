//! Reservation models.
//!
//! A reservation holds funds moved from `free` to `reserved` until the order
//! it belongs to is either realized (revenue) or cancelled (refund).

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

/// Represents a reservation record from the database.
///
/// `order_id` is unique, so a reservation can be addressed by either its id
/// or its order. `transaction_id` is set when a transaction opened it.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow, Serialize)]
pub struct Reservation {
    pub id: Uuid,
    pub account_id: Uuid,
    pub product_id: Uuid,
    pub order_id: Uuid,
    pub amount: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// Request body for `POST /reservation`.
#[derive(Debug, Clone, Deserialize)]
pub struct NewReservation {
    pub account_id: Uuid,
    pub product_id: Uuid,
    pub order_id: Uuid,
    pub amount: Decimal,
}

/// How a reservation is looked up for revenue or refund.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReservationRef {
    Id(Uuid),
    OrderId(Uuid),
    /// The reservation opened together with a transaction.
    TransactionId(Uuid),
}

/// Request body for `POST /reservation/revenue` and `POST /reservation/refund`.
///
/// Exactly one of the two fields must be set.
#[derive(Debug, Deserialize)]
pub struct SettleReservationRequest {
    pub reservation_id: Option<Uuid>,
    pub order_id: Option<Uuid>,
}

impl TryFrom<SettleReservationRequest> for ReservationRef {
    type Error = AppError;

    fn try_from(request: SettleReservationRequest) -> Result<Self, Self::Error> {
        match (request.reservation_id, request.order_id) {
            (Some(id), None) => Ok(ReservationRef::Id(id)),
            (None, Some(order_id)) => Ok(ReservationRef::OrderId(order_id)),
            _ => Err(AppError::Validation(
                "exactly one of reservation_id or order_id is required".to_string(),
            )),
        }
    }
}
