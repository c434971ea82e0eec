//! Account (balance) HTTP handlers.
//!
//! This module implements the balance-related API endpoints:
//! - POST /api/v1/balance - Create an account for a user
//! - GET /api/v1/balance/{user_id} - Get a user's account
//! - PUT /api/v1/balance/{balance_id} - Set the free balance
//! - POST /api/v1/balance/{balance_id}/deposit - Add funds
//! - POST /api/v1/balance/{balance_id}/withdraw - Remove funds
//! - GET /api/v1/balance/{balance_id}/operations - Operation history
//! - POST /api/v1/transfer - Move funds between accounts

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use uuid::Uuid;

use crate::{
    app::AppState,
    error::AppError,
    models::{
        account::{
            Account, AmountRequest, CreateAccountRequest, TransferRequest, TransferResponse,
            UpdateBalanceRequest,
        },
        operation::{HistoryParams, HistoryQuery, Operation},
    },
};

/// Create a new account.
///
/// # Request Body
///
/// ```json
/// {
///   "user_id": "550e8400-e29b-41d4-a716-446655440000",
///   "free": "100.00"
/// }
/// ```
///
/// # Response
///
/// - **Success (201 Created)**: the created account, `reserved` is always 0
/// - **Error (400)**: negative or sub-cent `free`, non-zero `reserved`, or
///   the user already has an account
pub async fn create_account(
    State(state): State<AppState>,
    Json(request): Json<CreateAccountRequest>,
) -> Result<(StatusCode, Json<Account>), AppError> {
    let account = state.ledger.create_account(request).await?;

    Ok((StatusCode::CREATED, Json(account)))
}

/// Get the account of a user.
///
/// # URL Parameters
///
/// - `user_id` - owner of the account (not the balance id)
pub async fn get_balance(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<Account>, AppError> {
    let account = state.ledger.account_by_user_id(user_id).await?;

    Ok(Json(account))
}

/// Set the free balance of an account to an absolute value.
///
/// The difference is logged as a deposit or a withdrawal. `reserved` may be
/// sent but must equal the current value.
///
/// ```json
/// { "free": "250.00", "reserved": "30.00" }
/// ```
pub async fn update_balance(
    State(state): State<AppState>,
    Path(balance_id): Path<Uuid>,
    Json(request): Json<UpdateBalanceRequest>,
) -> Result<Json<Account>, AppError> {
    let account = state.ledger.adjust_balance(balance_id, request).await?;

    Ok(Json(account))
}

pub async fn deposit(
    State(state): State<AppState>,
    Path(balance_id): Path<Uuid>,
    Json(request): Json<AmountRequest>,
) -> Result<Json<Account>, AppError> {
    let account = state.ledger.deposit(balance_id, request.amount).await?;

    Ok(Json(account))
}

/// Remove funds from an account.
///
/// # Response
///
/// - **Success (200 OK)**: the account after the withdrawal
/// - **Error (400)**: free balance is lower than the amount
/// - **Error (404)**: unknown account
pub async fn withdraw(
    State(state): State<AppState>,
    Path(balance_id): Path<Uuid>,
    Json(request): Json<AmountRequest>,
) -> Result<Json<Account>, AppError> {
    let account = state.ledger.withdraw(balance_id, request.amount).await?;

    Ok(Json(account))
}

/// Page through an account's operation log.
///
/// # Query Parameters
///
/// - `sort` - `date` (default, newest first) or `amount` (largest first)
/// - `limit` - page size, defaults to and is capped at 10
/// - `offset` - rows to skip
pub async fn history(
    State(state): State<AppState>,
    Path(balance_id): Path<Uuid>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<Vec<Operation>>, AppError> {
    let query = HistoryQuery::try_from(params)?;
    let operations = state.ledger.history(balance_id, query).await?;

    Ok(Json(operations))
}

/// Transfer free funds between two accounts.
///
/// # Atomicity
///
/// Both accounts and both log entries are written in a single database
/// transaction. Either everything succeeds or nothing changes.
pub async fn transfer(
    State(state): State<AppState>,
    Json(request): Json<TransferRequest>,
) -> Result<Json<TransferResponse>, AppError> {
    let (from, to) = state
        .ledger
        .transfer(request.from_account_id, request.to_account_id, request.amount)
        .await?;

    Ok(Json(TransferResponse { from, to }))
}
