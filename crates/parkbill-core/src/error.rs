//! Unified error handling for Parkbill
//!
//! This module provides a comprehensive error type that covers all possible
//! failure scenarios in the application, with automatic HTTP response mapping.
//!
//! Business failures fall into four families consumed by callers: not-found,
//! invalid-state, configuration, and conflict. Conflict is the only family a
//! caller may safely retry, because retrying re-enters the settlement
//! idempotency check.

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;

/// Main application error type
///
/// All errors in the application should be converted to this type.
/// It implements `ResponseError` for automatic HTTP response generation.
#[derive(Error, Debug)]
pub enum AppError {
    // ==================== Database Errors ====================
    #[error("Database error: {0}")]
    Database(String),

    #[error("Database pool error: {0}")]
    Pool(String),

    #[error("Transaction failed: {0}")]
    Transaction(String),

    // ==================== Cache Errors ====================
    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Cache connection failed: {0}")]
    CacheConnection(String),

    // ==================== Business Logic Errors ====================
    #[error("Parking session not found: {0}")]
    SessionNotFound(String),

    #[error("Charge order not found: {0}")]
    OrderNotFound(String),

    #[error("Billing rule not found: {0}")]
    RuleNotFound(String),

    #[error("Promotional rule not found: {0}")]
    PromoNotFound(String),

    #[error("Membership not found: {0}")]
    MemberNotFound(String),

    #[error("Parking site not found: {0}")]
    SiteNotFound(String),

    #[error("Modification record not found: {0}")]
    ModificationNotFound(String),

    #[error("Wallet not found for user: {0}")]
    WalletNotFound(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Site has no usable pricing: {0}")]
    SiteConfig(String),

    #[error("Insufficient balance: required {required}, available {available}")]
    InsufficientBalance { required: i64, available: i64 },

    // ==================== Concurrency Errors ====================
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Could not acquire lock: {0}")]
    LockNotAcquired(String),

    // ==================== Validation Errors ====================
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // ==================== Resource Errors ====================
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    // ==================== Internal Errors ====================
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl AppError {
    /// Returns the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 Bad Request
            AppError::Validation(_) | AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,

            // 402 Payment Required
            AppError::InsufficientBalance { .. } => StatusCode::PAYMENT_REQUIRED,

            // 404 Not Found
            AppError::SessionNotFound(_)
            | AppError::OrderNotFound(_)
            | AppError::RuleNotFound(_)
            | AppError::PromoNotFound(_)
            | AppError::MemberNotFound(_)
            | AppError::SiteNotFound(_)
            | AppError::ModificationNotFound(_)
            | AppError::WalletNotFound(_)
            | AppError::NotFound(_) => StatusCode::NOT_FOUND,

            // 409 Conflict
            AppError::Conflict(_)
            | AppError::LockNotAcquired(_)
            | AppError::AlreadyExists(_) => StatusCode::CONFLICT,

            // 422 Unprocessable Entity
            AppError::InvalidState(_) | AppError::SiteConfig(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }

            // 500 Internal Server Error
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns the stable error code for API responses
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Database(_) => "database_error",
            AppError::Pool(_) => "pool_error",
            AppError::Transaction(_) => "transaction_error",
            AppError::Cache(_) => "cache_error",
            AppError::CacheConnection(_) => "cache_connection_error",
            AppError::SessionNotFound(_) => "session_not_found",
            AppError::OrderNotFound(_) => "order_not_found",
            AppError::RuleNotFound(_) => "rule_not_found",
            AppError::PromoNotFound(_) => "promo_not_found",
            AppError::MemberNotFound(_) => "member_not_found",
            AppError::SiteNotFound(_) => "site_not_found",
            AppError::ModificationNotFound(_) => "modification_not_found",
            AppError::WalletNotFound(_) => "wallet_not_found",
            AppError::InvalidState(_) => "invalid_state",
            AppError::SiteConfig(_) => "site_config_error",
            AppError::InsufficientBalance { .. } => "insufficient_balance",
            AppError::Conflict(_) => "conflict",
            AppError::LockNotAcquired(_) => "lock_not_acquired",
            AppError::Validation(_) => "validation_error",
            AppError::InvalidInput(_) => "invalid_input",
            AppError::NotFound(_) => "not_found",
            AppError::AlreadyExists(_) => "already_exists",
            AppError::Internal(_) => "internal_error",
            AppError::Config(_) => "config_error",
            AppError::Serialization(_) => "serialization_error",
        }
    }

    /// True when a retry may succeed (retrying re-enters the idempotency check)
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::Conflict(_) | AppError::LockNotAcquired(_) | AppError::AlreadyExists(_)
        )
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        AppError::status_code(self)
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        let body = json!({
            "error": self.error_code(),
            "message": self.to_string(),
            "status": status.as_u16(),
        });

        HttpResponse::build(status).json(body)
    }
}

// ==================== From implementations ====================

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Validation(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_codes() {
        assert_eq!(
            AppError::SessionNotFound("42".to_string()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::InvalidState("order already paid".to_string()).status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            AppError::LockNotAcquired("settle:42".to_string()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::InsufficientBalance {
                required: 1000,
                available: 500
            }
            .status_code(),
            StatusCode::PAYMENT_REQUIRED
        );
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(
            AppError::SiteConfig("no unit price".to_string()).error_code(),
            "site_config_error"
        );
        assert_eq!(
            AppError::Conflict("duplicate settlement".to_string()).error_code(),
            "conflict"
        );
    }

    #[test]
    fn test_retryable() {
        assert!(AppError::Conflict("x".to_string()).is_retryable());
        assert!(AppError::LockNotAcquired("x".to_string()).is_retryable());
        assert!(!AppError::InvalidState("x".to_string()).is_retryable());
        assert!(!AppError::SessionNotFound("x".to_string()).is_retryable());
    }
}
