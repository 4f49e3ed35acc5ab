//! Charge order repository implementation
//!
//! The orders table carries a unique constraint on (session_id, exit_time);
//! that constraint, not any cache or lock, is what actually guarantees
//! settlement idempotency under concurrency.

use parkbill_core::{
    models::{ChargeOrder, DiscountKind, DiscountLineItem, DiscountSource, PayStatus},
    traits::{OrderRepository, Repository},
    AppError, AppResult,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::{debug, error, instrument, warn};

const ORDER_COLUMNS: &str = r#"
    id, order_no, session_id, user_id, amount, pay_status, pay_channel,
    pay_time, rule_name, exit_time, created_at, updated_at
"#;

const LINE_ITEM_COLUMNS: &str = r#"
    id, order_id, source, promo_code, name, kind, value, amount, created_at
"#;

/// PostgreSQL implementation of OrderRepository
pub struct PgOrderRepository {
    pool: PgPool,
}

impl PgOrderRepository {
    /// Create a new order repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Repository<ChargeOrder, i64> for PgOrderRepository {
    #[instrument(skip(self))]
    async fn find_by_id(&self, id: i64) -> AppResult<Option<ChargeOrder>> {
        debug!("Finding order by id: {}", id);

        let result = sqlx::query_as::<sqlx::Postgres, OrderRow>(&format!(
            "SELECT {} FROM charge_orders WHERE id = $1",
            ORDER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error finding order {}: {}", id, e);
            AppError::Database(format!("Failed to find order: {}", e))
        })?;

        Ok(result.map(Into::into))
    }

    #[instrument(skip(self))]
    async fn find_all(&self, limit: i64, offset: i64) -> AppResult<Vec<ChargeOrder>> {
        let rows = sqlx::query_as::<sqlx::Postgres, OrderRow>(&format!(
            "SELECT {} FROM charge_orders ORDER BY created_at DESC LIMIT $1 OFFSET $2",
            ORDER_COLUMNS
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error listing orders: {}", e);
            AppError::Database(format!("Failed to fetch orders: {}", e))
        })?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self))]
    async fn count(&self) -> AppResult<i64> {
        let result: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM charge_orders")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error counting orders: {}", e);
                AppError::Database(format!("Failed to count orders: {}", e))
            })?;

        Ok(result.0)
    }

    #[instrument(skip(self, entity))]
    async fn create(&self, entity: &ChargeOrder) -> AppResult<ChargeOrder> {
        debug!("Creating order {} for session {}", entity.order_no, entity.session_id);

        let row = sqlx::query_as::<sqlx::Postgres, OrderRow>(&format!(
            r#"
            INSERT INTO charge_orders (
                order_no, session_id, user_id, amount, pay_status, pay_channel,
                pay_time, rule_name, exit_time
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {}
            "#,
            ORDER_COLUMNS
        ))
        .bind(&entity.order_no)
        .bind(entity.session_id)
        .bind(entity.user_id)
        .bind(entity.amount)
        .bind(entity.pay_status.to_string())
        .bind(&entity.pay_channel)
        .bind(entity.pay_time)
        .bind(&entity.rule_name)
        .bind(entity.exit_time)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                warn!(
                    "Duplicate settlement for session {} at {}",
                    entity.session_id, entity.exit_time
                );
                return AppError::Conflict(format!(
                    "session {} already settled for exit {}",
                    entity.session_id, entity.exit_time
                ));
            }
            error!("Database error creating order: {}", e);
            AppError::Database(format!("Failed to create order: {}", e))
        })?;

        Ok(row.into())
    }

    #[instrument(skip(self, entity))]
    async fn update(&self, entity: &ChargeOrder) -> AppResult<ChargeOrder> {
        debug!("Updating order: {}", entity.id);

        let row = sqlx::query_as::<sqlx::Postgres, OrderRow>(&format!(
            r#"
            UPDATE charge_orders
            SET amount = $2,
                pay_status = $3,
                pay_channel = $4,
                pay_time = $5,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            ORDER_COLUMNS
        ))
        .bind(entity.id)
        .bind(entity.amount)
        .bind(entity.pay_status.to_string())
        .bind(&entity.pay_channel)
        .bind(entity.pay_time)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error updating order {}: {}", entity.id, e);
            AppError::Database(format!("Failed to update order: {}", e))
        })?;

        Ok(row.into())
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: i64) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM charge_orders WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error deleting order {}: {}", id, e);
                AppError::Database(format!("Failed to delete order: {}", e))
            })?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl OrderRepository for PgOrderRepository {
    #[instrument(skip(self))]
    async fn find_by_order_no(&self, order_no: &str) -> AppResult<Option<ChargeOrder>> {
        debug!("Finding order by number: {}", order_no);

        let result = sqlx::query_as::<sqlx::Postgres, OrderRow>(&format!(
            "SELECT {} FROM charge_orders WHERE order_no = $1",
            ORDER_COLUMNS
        ))
        .bind(order_no)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error finding order {}: {}", order_no, e);
            AppError::Database(format!("Failed to find order: {}", e))
        })?;

        Ok(result.map(Into::into))
    }

    #[instrument(skip(self))]
    async fn find_by_session_and_exit(
        &self,
        session_id: i64,
        exit_time: DateTime<Utc>,
    ) -> AppResult<Option<ChargeOrder>> {
        debug!(
            "Looking up existing settlement: session {} at {}",
            session_id, exit_time
        );

        let result = sqlx::query_as::<sqlx::Postgres, OrderRow>(&format!(
            "SELECT {} FROM charge_orders WHERE session_id = $1 AND exit_time = $2",
            ORDER_COLUMNS
        ))
        .bind(session_id)
        .bind(exit_time)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error looking up settlement: {}", e);
            AppError::Database(format!("Failed to look up settlement: {}", e))
        })?;

        Ok(result.map(Into::into))
    }

    #[instrument(skip(self))]
    async fn find_line_items(&self, order_id: i64) -> AppResult<Vec<DiscountLineItem>> {
        let rows = sqlx::query_as::<sqlx::Postgres, LineItemRow>(&format!(
            "SELECT {} FROM order_discounts WHERE order_id = $1 ORDER BY id",
            LINE_ITEM_COLUMNS
        ))
        .bind(order_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!(
                "Database error loading line items for order {}: {}",
                order_id, e
            );
            AppError::Database(format!("Failed to fetch line items: {}", e))
        })?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self))]
    async fn mark_paid(
        &self,
        id: i64,
        channel: &str,
        pay_time: DateTime<Utc>,
    ) -> AppResult<Option<ChargeOrder>> {
        debug!("Marking order {} paid via {}", id, channel);

        // Conditional on UNPAID so a concurrent confirm updates zero rows
        let row = sqlx::query_as::<sqlx::Postgres, OrderRow>(&format!(
            r#"
            UPDATE charge_orders
            SET pay_status = 'PAID',
                pay_channel = $2,
                pay_time = $3,
                updated_at = NOW()
            WHERE id = $1 AND pay_status = 'UNPAID'
            RETURNING {}
            "#,
            ORDER_COLUMNS
        ))
        .bind(id)
        .bind(channel)
        .bind(pay_time)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error marking order {} paid: {}", id, e);
            AppError::Database(format!("Failed to mark order paid: {}", e))
        })?;

        Ok(row.map(Into::into))
    }

    #[instrument(skip(self))]
    async fn update_amount(&self, id: i64, amount: i64) -> AppResult<ChargeOrder> {
        debug!("Adjusting order {} amount to {}", id, amount);

        let row = sqlx::query_as::<sqlx::Postgres, OrderRow>(&format!(
            r#"
            UPDATE charge_orders
            SET amount = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            ORDER_COLUMNS
        ))
        .bind(id)
        .bind(amount)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error adjusting order {}: {}", id, e);
            AppError::Database(format!("Failed to adjust order: {}", e))
        })?;

        row.map(Into::into)
            .ok_or_else(|| AppError::OrderNotFound(id.to_string()))
    }

    #[instrument(skip(self))]
    async fn mark_refunded(&self, id: i64) -> AppResult<ChargeOrder> {
        debug!("Marking order {} refunded", id);

        let row = sqlx::query_as::<sqlx::Postgres, OrderRow>(&format!(
            r#"
            UPDATE charge_orders
            SET pay_status = 'REFUNDED', updated_at = NOW()
            WHERE id = $1 AND pay_status = 'PAID'
            RETURNING {}
            "#,
            ORDER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error refunding order {}: {}", id, e);
            AppError::Database(format!("Failed to refund order: {}", e))
        })?;

        row.map(Into::into).ok_or_else(|| {
            AppError::InvalidState(format!("order {} is not in a refundable state", id))
        })
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db) if db.code().as_deref() == Some("23505")
    )
}

/// Helper struct for mapping order rows
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct OrderRow {
    pub id: i64,
    pub order_no: String,
    pub session_id: i64,
    pub user_id: Option<i64>,
    pub amount: i64,
    pub pay_status: String,
    pub pay_channel: Option<String>,
    pub pay_time: Option<DateTime<Utc>>,
    pub rule_name: String,
    pub exit_time: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<OrderRow> for ChargeOrder {
    fn from(row: OrderRow) -> Self {
        Self {
            id: row.id,
            order_no: row.order_no,
            session_id: row.session_id,
            user_id: row.user_id,
            amount: row.amount,
            pay_status: PayStatus::from_str(&row.pay_status).unwrap_or_default(),
            pay_channel: row.pay_channel,
            pay_time: row.pay_time,
            rule_name: row.rule_name,
            exit_time: row.exit_time,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Helper struct for mapping discount line item rows
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct LineItemRow {
    pub id: i64,
    pub order_id: i64,
    pub source: String,
    pub promo_code: Option<String>,
    pub name: String,
    pub kind: String,
    pub value: i32,
    pub amount: i64,
    pub created_at: DateTime<Utc>,
}

impl From<LineItemRow> for DiscountLineItem {
    fn from(row: LineItemRow) -> Self {
        Self {
            id: row.id,
            order_id: row.order_id,
            source: DiscountSource::from_str(&row.source).unwrap_or(DiscountSource::Member),
            promo_code: row.promo_code,
            name: row.name,
            kind: DiscountKind::from_str(&row.kind).unwrap_or(DiscountKind::Percent),
            value: row.value,
            amount: row.amount,
            created_at: row.created_at,
        }
    }
}
