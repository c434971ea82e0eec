//! Statistics report handler.

use axum::{
    Json,
    extract::{Query, State},
};

use crate::{
    app::StatsState,
    error::AppError,
    models::report::{ReportQuery, ReportResponse},
};

/// Monthly revenue of a service.
///
/// # Endpoint
///
/// `GET /api/v1/report?service_id=<uuid>&month=11&year=2022`
///
/// # Response (200 OK)
///
/// ```json
/// { "reports": [ { "service_id": "880e8400-...", "amount": "130.00" } ] }
/// ```
///
/// `reports` is empty when the service had no accepted transactions that
/// month. A month outside 1..=12 is a 400.
pub async fn get_report(
    State(state): State<StatsState>,
    Query(query): Query<ReportQuery>,
) -> Result<Json<ReportResponse>, AppError> {
    let reports = state.stats.report(query).await?;

    Ok(Json(ReportResponse { reports }))
}
