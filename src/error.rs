//! Error types and HTTP error response handling.
//!
//! Store, service and handler layers all return [`AppError`] and pass it up
//! unchanged with `?`. Only the HTTP boundary decides which status code a
//! variant becomes.

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header::RETRY_AFTER},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::json;

use crate::models::transaction::TransactionStatus;

/// Application-wide error type.
///
/// # Error Categories
///
/// - **Validation**: malformed or out-of-range input
/// - **Business rules**: insufficient balance, illegal status transitions
/// - **Resources**: missing account, transaction or reservation
/// - **Storage**: anything the database (or the in-memory store) reports
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Database operation failed (e.g., connection error, query error).
    #[error("Database error: {0}")]
    Database(#[source] sqlx::Error),

    /// Non-database storage failure.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Request body or parameters are invalid.
    #[error("validation error: {0}")]
    Validation(String),

    /// The named entity does not exist.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// Caller may not act on the resource.
    #[error("permission denied")]
    PermissionDenied,

    /// Free balance is lower than the requested amount.
    #[error("insufficient balance")]
    InsufficientBalance,

    /// Transaction status may only move from `processed` to a terminal state.
    #[error("cannot change transaction status from {from} to {to}")]
    InvalidStatusTransition {
        from: TransactionStatus,
        to: TransactionStatus,
    },
}

/// SQLSTATE `numeric_value_out_of_range`.
const NUMERIC_VALUE_OUT_OF_RANGE: &str = "22003";

/// A value that overflows a `NUMERIC` column is the caller's input, not a
/// server fault.
impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db_err)
                if db_err.code().as_deref() == Some(NUMERIC_VALUE_OUT_OF_RANGE) =>
            {
                AppError::Validation("amount is out of range".to_string())
            }
            _ => AppError::Database(err),
        }
    }
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::InsufficientBalance => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::PermissionDenied => StatusCode::FORBIDDEN,
            AppError::InvalidStatusTransition { .. } => StatusCode::CONFLICT,
            AppError::Database(_) | AppError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// JSON body returned for client errors.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub message: String,
    pub code: u16,
}

/// Convert AppError into an HTTP response.
///
/// # Response Format
///
/// Client errors return `{"message": "...", "code": 404}`.
///
/// Internal errors return `{}` with a `Retry-After: 30` header; the cause is
/// logged and never sent to the client.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "request failed");

            let mut response = (status, Json(json!({}))).into_response();
            response
                .headers_mut()
                .insert(RETRY_AFTER, HeaderValue::from_static("30"));
            return response;
        }

        let body = ErrorBody {
            message: self.to_string(),
            code: status.as_u16(),
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insufficient_balance_maps_to_400() {
        let res = AppError::InsufficientBalance.into_response();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn not_found_maps_to_404() {
        let res = AppError::NotFound("account").into_response();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn permission_denied_maps_to_403() {
        let res = AppError::PermissionDenied.into_response();
        assert_eq!(res.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn invalid_transition_maps_to_409() {
        let res = AppError::InvalidStatusTransition {
            from: TransactionStatus::Accepted,
            to: TransactionStatus::Rejected,
        }
        .into_response();
        assert_eq!(res.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn storage_maps_to_500_with_retry_after() {
        let res = AppError::Storage("disk on fire".to_string()).into_response();
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(res.headers().get(RETRY_AFTER).unwrap(), "30");
    }
}
