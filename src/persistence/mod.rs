//! Persistence layer: PostgreSQL storage for the synchronization core.
//!
//! `models` holds the row structs that mirror the database schema and
//! their conversions into domain types. `postgres` holds the
//! `PostgresPersistence` facade with the queries themselves, grouped by
//! area (devices, ledger, queue, notifications, resilience).

pub mod models;
pub mod postgres;

pub use postgres::PostgresPersistence;
