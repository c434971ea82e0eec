//! HTTP request handlers (route handlers).
//!
//! Each handler is an async function that:
//! 1. Extracts request data (JSON body, path, query string)
//! 2. Calls one service method
//! 3. Returns the JSON response or an `AppError`

/// Balance, deposit, withdrawal, history and transfer endpoints
pub mod accounts;
pub mod health;
/// Product catalog endpoints
pub mod products;
/// Statistics report endpoint
pub mod reports;
/// Reservation endpoints
pub mod reservations;
/// Transaction lifecycle endpoints
pub mod transactions;
