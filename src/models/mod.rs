//! Data models representing database entities and API bodies.

/// Account (balance) model
pub mod account;
/// Ledger operation log
pub mod operation;
/// Product catalog
pub mod product;
/// Statistics rows and reports
pub mod report;
/// Reservation model
pub mod reservation;
/// Transaction model and status machine
pub mod transaction;
