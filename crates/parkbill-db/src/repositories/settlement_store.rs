//! Transactional settlement writer
//!
//! A settlement persists a charge order, its discount line items, the session
//! state change and optionally a wallet debit. All four writes ride one
//! database transaction; a failure anywhere rolls everything back, so a
//! settlement can never be half-recorded.

use parkbill_core::{
    models::{ChargeOrder, DiscountLineItem, PayStatus},
    traits::{SettlementStore, WalletDebit},
    AppError, AppResult,
};
use async_trait::async_trait;
use sqlx::PgPool;
use tracing::{debug, error, instrument, warn};

use super::order_repo::OrderRow;

/// PostgreSQL implementation of SettlementStore
pub struct PgSettlementStore {
    pool: PgPool,
}

impl PgSettlementStore {
    /// Create a new settlement store
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SettlementStore for PgSettlementStore {
    #[instrument(skip(self, order, line_items))]
    async fn persist_settlement(
        &self,
        order: &ChargeOrder,
        line_items: &[DiscountLineItem],
        wallet_debit: Option<WalletDebit>,
    ) -> AppResult<ChargeOrder> {
        debug!(
            "Persisting settlement for session {} (amount {}, {} discounts)",
            order.session_id,
            order.amount,
            line_items.len()
        );

        let mut tx = self.pool.begin().await.map_err(|e| {
            error!("Failed to start settlement transaction: {}", e);
            AppError::Transaction(format!("Failed to start transaction: {}", e))
        })?;

        // The unique constraint on (session_id, exit_time) is the real
        // idempotency guarantee; concurrent settlements lose here
        let order_row = sqlx::query_as::<sqlx::Postgres, OrderRow>(
            r#"
            INSERT INTO charge_orders (
                order_no, session_id, user_id, amount, pay_status, pay_channel,
                pay_time, rule_name, exit_time
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING
                id, order_no, session_id, user_id, amount, pay_status,
                pay_channel, pay_time, rule_name, exit_time, created_at,
                updated_at
            "#,
        )
        .bind(&order.order_no)
        .bind(order.session_id)
        .bind(order.user_id)
        .bind(order.amount)
        .bind(order.pay_status.to_string())
        .bind(&order.pay_channel)
        .bind(order.pay_time)
        .bind(&order.rule_name)
        .bind(order.exit_time)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                warn!(
                    "Duplicate settlement for session {} at {}",
                    order.session_id, order.exit_time
                );
                return AppError::Conflict(format!(
                    "session {} already settled for exit {}",
                    order.session_id, order.exit_time
                ));
            }
            error!("Database error inserting order: {}", e);
            AppError::Database(format!("Failed to insert order: {}", e))
        })?;

        let order_id = order_row.id;

        for item in line_items {
            sqlx::query(
                r#"
                INSERT INTO order_discounts (
                    order_id, source, promo_code, name, kind, value, amount
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(order_id)
            .bind(item.source.to_string())
            .bind(&item.promo_code)
            .bind(&item.name)
            .bind(item.kind.to_string())
            .bind(item.value)
            .bind(item.amount)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                error!("Database error inserting discount line item: {}", e);
                AppError::Database(format!("Failed to insert line item: {}", e))
            })?;
        }

        if let Some(debit) = wallet_debit {
            let updated = sqlx::query(
                r#"
                UPDATE wallets
                SET balance = balance - $2,
                    total_consume = total_consume + $2,
                    updated_at = NOW()
                WHERE user_id = $1 AND status = 1 AND balance >= $2
                "#,
            )
            .bind(debit.user_id)
            .bind(debit.amount)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                error!("Database error debiting wallet in settlement: {}", e);
                AppError::Database(format!("Failed to debit wallet: {}", e))
            })?;

            if updated.rows_affected() == 0 {
                let available: Option<(i64,)> =
                    sqlx::query_as("SELECT balance FROM wallets WHERE user_id = $1")
                        .bind(debit.user_id)
                        .fetch_optional(&mut *tx)
                        .await
                        .map_err(|e| {
                            AppError::Database(format!("Failed to read wallet balance: {}", e))
                        })?;

                // Dropping the transaction rolls back the order insert
                return Err(AppError::InsufficientBalance {
                    required: debit.amount,
                    available: available.map(|b| b.0).unwrap_or(0),
                });
            }
        }

        let paid = order.pay_status == PayStatus::Paid;
        sqlx::query(
            r#"
            UPDATE parking_sessions
            SET exit_time = $2,
                paid_amount = CASE WHEN $3 THEN $4 ELSE paid_amount END,
                status = CASE WHEN $3 THEN 'FINISHED' ELSE status END,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(order.session_id)
        .bind(order.exit_time)
        .bind(paid)
        .bind(order.amount)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            error!("Database error updating session in settlement: {}", e);
            AppError::Database(format!("Failed to update session: {}", e))
        })?;

        tx.commit().await.map_err(|e| {
            error!("Failed to commit settlement transaction: {}", e);
            AppError::Transaction(format!("Failed to commit transaction: {}", e))
        })?;

        debug!(
            "Settlement persisted: order {} for session {}",
            order_row.order_no, order.session_id
        );

        Ok(order_row.into())
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db) if db.code().as_deref() == Some("23505")
    )
}
