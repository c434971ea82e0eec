//! Statistics models: the per-service transaction log and the monthly report.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One accepted transaction as recorded by the statistics service.
///
/// The transaction id is the primary key, so a redelivered event is ignored.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow, Serialize)]
pub struct ServiceTransaction {
    pub id: Uuid,
    pub service_id: Uuid,
    pub amount: Decimal,
    pub created_at: DateTime<Utc>,
}

/// Summed revenue of one service over one calendar month.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow, Serialize)]
pub struct ServiceReport {
    pub service_id: Uuid,
    pub amount: Decimal,
}

/// Query string of `GET /api/v1/report`.
#[derive(Debug, Deserialize)]
pub struct ReportQuery {
    pub service_id: Uuid,
    pub month: u32,
    pub year: i32,
}

#[derive(Debug, Serialize)]
pub struct ReportResponse {
    pub reports: Vec<ServiceReport>,
}
