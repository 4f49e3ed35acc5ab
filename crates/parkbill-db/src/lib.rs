//! Parking billing database layer
//!
//! This crate provides PostgreSQL database access and repository
//! implementations for the parking billing service. It includes:
//!
//! - Connection pool management with sqlx
//! - Repository implementations for all domain entities
//! - A transactional settlement writer that persists an order, its discount
//!   line items, the session state and an optional wallet debit atomically

pub mod pool;
pub mod repositories;

pub use pool::create_pool;
pub use repositories::*;

// Re-export commonly used types
pub use parkbill_core::{AppError, AppResult};
pub use sqlx::{PgPool, Postgres, Transaction};
