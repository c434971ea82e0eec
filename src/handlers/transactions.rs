//! Transaction HTTP handlers.
//!
//! This module implements transaction-related API endpoints:
//! - POST /api/v1/transaction - Create a transaction and reserve its amount
//! - GET /api/v1/transaction/{transaction_id} - Get transaction details
//! - PUT /api/v1/transaction/{transaction_id} - Accept or reject
//! - GET /api/v1/transaction/user/{user_id} - List a user's transactions

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use uuid::Uuid;

use crate::{
    app::AppState,
    error::AppError,
    models::transaction::{
        NewTransaction, Transaction, TransactionsResponse, UpdateTransactionRequest,
    },
};

/// Create a transaction.
///
/// # Request Body
///
/// ```json
/// {
///   "user_id": "550e8400-...",
///   "order_id": "770e8400-...",
///   "service_id": "880e8400-...",
///   "amount": "30.00"
/// }
/// ```
///
/// # Response (201)
///
/// ```json
/// {
///   "id": "990e8400-...",
///   "user_id": "550e8400-...",
///   "order_id": "770e8400-...",
///   "service_id": "880e8400-...",
///   "amount": "30.00",
///   "status": "processed",
///   "created_at": "2022-11-01T10:00:00Z",
///   "updated_at": "2022-11-01T10:00:00Z"
/// }
/// ```
///
/// The amount moves from `free` to `reserved` in the same database
/// transaction; with insufficient funds nothing is created (400).
pub async fn create_transaction(
    State(state): State<AppState>,
    Json(request): Json<NewTransaction>,
) -> Result<(StatusCode, Json<Transaction>), AppError> {
    let transaction = state.transactions.create(request).await?;

    Ok((StatusCode::CREATED, Json(transaction)))
}

pub async fn get_transaction(
    State(state): State<AppState>,
    Path(transaction_id): Path<Uuid>,
) -> Result<Json<Transaction>, AppError> {
    let transaction = state.transactions.get(transaction_id).await?;

    Ok(Json(transaction))
}

/// Update a transaction's status.
///
/// # Request Body
///
/// ```json
/// { "status": "accepted" }
/// ```
///
/// # Validation
///
/// - Only a `processed` transaction can change, and only to `accepted` or
///   `rejected` (409 otherwise)
/// - An unknown status string is a 400
///
/// Accepting publishes the transaction event in the background; a broker
/// failure does not fail this request.
pub async fn update_transaction(
    State(state): State<AppState>,
    Path(transaction_id): Path<Uuid>,
    Json(request): Json<UpdateTransactionRequest>,
) -> Result<Json<Transaction>, AppError> {
    let transaction = state
        .transactions
        .update_status(transaction_id, &request.status)
        .await?;

    Ok(Json(transaction))
}

pub async fn list_user_transactions(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<TransactionsResponse>, AppError> {
    let transactions = state.transactions.list_by_user(user_id).await?;

    Ok(Json(TransactionsResponse { transactions }))
}
