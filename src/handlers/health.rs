//! Health and readiness endpoints for service monitoring.
//!
//! Both services mount the same handlers; each state type says how to reach
//! its own store.

use async_trait::async_trait;
use axum::{Json, extract::State};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::AppError;

/// Something the health check can ping.
#[async_trait]
pub trait HealthProbe: Clone + Send + Sync + 'static {
    async fn ping(&self) -> Result<(), AppError>;
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Overall service status
    pub status: &'static str,

    /// Database connection status
    pub database: &'static str,

    /// Current server timestamp
    pub timestamp: DateTime<Utc>,
}

/// Health check handler.
///
/// # Response (200 OK)
///
/// ```json
/// {
///   "status": "healthy",
///   "database": "connected",
///   "timestamp": "2022-11-01T10:00:00Z"
/// }
/// ```
///
/// # Response (500 Internal Server Error)
///
/// If the store is unreachable, returns the standard error response.
pub async fn health_check<S: HealthProbe>(
    State(state): State<S>,
) -> Result<Json<HealthResponse>, AppError> {
    state.ping().await?;

    Ok(Json(HealthResponse {
        status: "healthy",
        database: "connected",
        timestamp: Utc::now(),
    }))
}

#[derive(Debug, Serialize)]
pub struct ReadyResponse {
    pub status: &'static str,
}

/// Readiness handler: the process accepts requests once the router is served.
pub async fn ready() -> Json<ReadyResponse> {
    Json(ReadyResponse { status: "ready" })
}
