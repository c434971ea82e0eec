//! Business logic services.
//!
//! Services contain core business logic separated from HTTP handlers. They
//! validate input, call the stores (which own atomicity) and trigger side
//! effects such as event publication.

pub mod ledger_service;
pub mod product_service;
pub mod stats_service;
pub mod transaction_service;

use rust_decimal::Decimal;

use crate::error::AppError;

/// Money columns are `NUMERIC(20, 2)`.
pub const AMOUNT_SCALE: u32 = 2;

/// Exclusive upper bound of a `NUMERIC(20, 2)` value: 10^18.
pub const AMOUNT_LIMIT: Decimal = Decimal::from_parts(0xA764_0000, 0x0DE0_B6B3, 0, false, 0);

/// Reject amounts that are not strictly positive, carry more than two
/// decimal places, or do not fit a money column.
pub fn validate_amount(amount: Decimal) -> Result<(), AppError> {
    if amount <= Decimal::ZERO {
        return Err(AppError::Validation("amount must be positive".to_string()));
    }
    validate_money(amount)
}

pub(crate) fn validate_money(amount: Decimal) -> Result<(), AppError> {
    if amount.normalize().scale() > AMOUNT_SCALE {
        return Err(AppError::Validation(format!(
            "amount must have at most {AMOUNT_SCALE} decimal places"
        )));
    }
    if amount >= AMOUNT_LIMIT {
        return Err(AppError::Validation(format!(
            "amount must be less than {AMOUNT_LIMIT}"
        )));
    }
    Ok(())
}
