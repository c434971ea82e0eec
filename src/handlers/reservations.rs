//! Reservation HTTP handlers.
//!
//! - POST /api/v1/reservation - Hold funds for an order
//! - POST /api/v1/reservation/revenue - Recognize held funds as consumed
//! - POST /api/v1/reservation/refund - Release held funds back to `free`

use axum::{Json, extract::State, http::StatusCode};

use crate::{
    app::AppState,
    error::AppError,
    models::reservation::{NewReservation, Reservation, ReservationRef, SettleReservationRequest},
};

/// Reserve funds.
///
/// ```json
/// {
///   "account_id": "550e8400-...",
///   "product_id": "660e8400-...",
///   "order_id": "770e8400-...",
///   "amount": "30.00"
/// }
/// ```
pub async fn reserve(
    State(state): State<AppState>,
    Json(request): Json<NewReservation>,
) -> Result<(StatusCode, Json<Reservation>), AppError> {
    let reservation = state.ledger.reserve(request).await?;

    Ok((StatusCode::CREATED, Json(reservation)))
}

/// Settle a reservation as revenue.
///
/// The body names the reservation by exactly one of `reservation_id` or
/// `order_id`.
pub async fn revenue(
    State(state): State<AppState>,
    Json(request): Json<SettleReservationRequest>,
) -> Result<Json<Reservation>, AppError> {
    let reference = ReservationRef::try_from(request)?;
    let reservation = state.ledger.revenue(reference).await?;

    Ok(Json(reservation))
}

pub async fn refund(
    State(state): State<AppState>,
    Json(request): Json<SettleReservationRequest>,
) -> Result<Json<Reservation>, AppError> {
    let reference = ReservationRef::try_from(request)?;
    let reservation = state.ledger.refund(reference).await?;

    Ok(Json(reservation))
}
