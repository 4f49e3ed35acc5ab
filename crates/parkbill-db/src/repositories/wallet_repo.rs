//! Wallet repository implementation
//!
//! Balance mutations are single conditional UPDATE statements so the balance
//! invariant (never negative) holds without row locks held across calls.

use parkbill_core::{
    models::Wallet,
    traits::WalletRepository,
    AppError, AppResult,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::{debug, error, instrument};

const WALLET_COLUMNS: &str = r#"
    id, user_id, balance, total_recharge, total_consume, status,
    created_at, updated_at
"#;

/// PostgreSQL implementation of WalletRepository
pub struct PgWalletRepository {
    pool: PgPool,
}

impl PgWalletRepository {
    /// Create a new wallet repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WalletRepository for PgWalletRepository {
    #[instrument(skip(self))]
    async fn find_by_user(&self, user_id: i64) -> AppResult<Option<Wallet>> {
        debug!("Finding wallet for user: {}", user_id);

        let result = sqlx::query_as::<sqlx::Postgres, WalletRow>(&format!(
            "SELECT {} FROM wallets WHERE user_id = $1",
            WALLET_COLUMNS
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error finding wallet for user {}: {}", user_id, e);
            AppError::Database(format!("Failed to find wallet: {}", e))
        })?;

        Ok(result.map(Into::into))
    }

    #[instrument(skip(self))]
    async fn create_for_user(&self, user_id: i64) -> AppResult<Wallet> {
        debug!("Creating wallet for user: {}", user_id);

        let row = sqlx::query_as::<sqlx::Postgres, WalletRow>(&format!(
            r#"
            INSERT INTO wallets (user_id, balance, total_recharge, total_consume, status)
            VALUES ($1, 0, 0, 0, 1)
            RETURNING {}
            "#,
            WALLET_COLUMNS
        ))
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                return AppError::AlreadyExists(format!("wallet for user {}", user_id));
            }
            error!("Database error creating wallet: {}", e);
            AppError::Database(format!("Failed to create wallet: {}", e))
        })?;

        Ok(row.into())
    }

    #[instrument(skip(self))]
    async fn credit(&self, user_id: i64, amount: i64) -> AppResult<Wallet> {
        debug!("Crediting {} to wallet of user {}", amount, user_id);

        let row = sqlx::query_as::<sqlx::Postgres, WalletRow>(&format!(
            r#"
            UPDATE wallets
            SET balance = balance + $2,
                total_recharge = total_recharge + $2,
                updated_at = NOW()
            WHERE user_id = $1 AND status = 1
            RETURNING {}
            "#,
            WALLET_COLUMNS
        ))
        .bind(user_id)
        .bind(amount)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error crediting wallet: {}", e);
            AppError::Database(format!("Failed to credit wallet: {}", e))
        })?;

        row.map(Into::into)
            .ok_or_else(|| AppError::WalletNotFound(user_id.to_string()))
    }

    #[instrument(skip(self))]
    async fn debit_if_sufficient(&self, user_id: i64, amount: i64) -> AppResult<Option<Wallet>> {
        debug!("Debiting {} from wallet of user {}", amount, user_id);

        // Check and deduction are one statement; no window for a negative balance
        let row = sqlx::query_as::<sqlx::Postgres, WalletRow>(&format!(
            r#"
            UPDATE wallets
            SET balance = balance - $2,
                total_consume = total_consume + $2,
                updated_at = NOW()
            WHERE user_id = $1 AND status = 1 AND balance >= $2
            RETURNING {}
            "#,
            WALLET_COLUMNS
        ))
        .bind(user_id)
        .bind(amount)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error debiting wallet: {}", e);
            AppError::Database(format!("Failed to debit wallet: {}", e))
        })?;

        Ok(row.map(Into::into))
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db) if db.code().as_deref() == Some("23505")
    )
}

/// Helper struct for mapping database rows
#[derive(Debug, sqlx::FromRow)]
struct WalletRow {
    id: i64,
    user_id: i64,
    balance: i64,
    total_recharge: i64,
    total_consume: i64,
    status: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<WalletRow> for Wallet {
    fn from(row: WalletRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            balance: row.balance,
            total_recharge: row.total_recharge,
            total_consume: row.total_consume,
            status: row.status,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}
