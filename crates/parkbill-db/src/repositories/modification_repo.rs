//! Order modification repository implementation

use parkbill_core::{
    models::{ModificationStatus, ModificationType, OrderModification},
    traits::{ModificationRepository, Repository},
    AppError, AppResult,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::{debug, error, instrument};

const MODIFICATION_COLUMNS: &str = r#"
    id, order_id, kind, requested_amount, original_amount, reason,
    requested_by, status, reviewed_by, review_note, reviewed_at,
    created_at, updated_at
"#;

/// PostgreSQL implementation of ModificationRepository
pub struct PgModificationRepository {
    pool: PgPool,
}

impl PgModificationRepository {
    /// Create a new modification repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Repository<OrderModification, i64> for PgModificationRepository {
    #[instrument(skip(self))]
    async fn find_by_id(&self, id: i64) -> AppResult<Option<OrderModification>> {
        debug!("Finding modification by id: {}", id);

        let result = sqlx::query_as::<sqlx::Postgres, ModificationRow>(&format!(
            "SELECT {} FROM order_modifications WHERE id = $1",
            MODIFICATION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error finding modification {}: {}", id, e);
            AppError::Database(format!("Failed to find modification: {}", e))
        })?;

        Ok(result.map(Into::into))
    }

    #[instrument(skip(self))]
    async fn find_all(&self, limit: i64, offset: i64) -> AppResult<Vec<OrderModification>> {
        let rows = sqlx::query_as::<sqlx::Postgres, ModificationRow>(&format!(
            "SELECT {} FROM order_modifications ORDER BY created_at DESC LIMIT $1 OFFSET $2",
            MODIFICATION_COLUMNS
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error listing modifications: {}", e);
            AppError::Database(format!("Failed to fetch modifications: {}", e))
        })?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self))]
    async fn count(&self) -> AppResult<i64> {
        let result: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM order_modifications")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error counting modifications: {}", e);
                AppError::Database(format!("Failed to count modifications: {}", e))
            })?;

        Ok(result.0)
    }

    #[instrument(skip(self, entity))]
    async fn create(&self, entity: &OrderModification) -> AppResult<OrderModification> {
        debug!(
            "Creating {} modification for order {}",
            entity.kind, entity.order_id
        );

        let row = sqlx::query_as::<sqlx::Postgres, ModificationRow>(&format!(
            r#"
            INSERT INTO order_modifications (
                order_id, kind, requested_amount, original_amount,
                reason, requested_by, status
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {}
            "#,
            MODIFICATION_COLUMNS
        ))
        .bind(entity.order_id)
        .bind(entity.kind.to_string())
        .bind(entity.requested_amount)
        .bind(entity.original_amount)
        .bind(&entity.reason)
        .bind(entity.requested_by)
        .bind(entity.status.to_string())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error creating modification: {}", e);
            AppError::Database(format!("Failed to create modification: {}", e))
        })?;

        Ok(row.into())
    }

    #[instrument(skip(self, entity))]
    async fn update(&self, entity: &OrderModification) -> AppResult<OrderModification> {
        debug!("Updating modification: {}", entity.id);

        let row = sqlx::query_as::<sqlx::Postgres, ModificationRow>(&format!(
            r#"
            UPDATE order_modifications
            SET requested_amount = $2,
                reason = $3,
                status = $4,
                reviewed_by = $5,
                review_note = $6,
                reviewed_at = $7,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            MODIFICATION_COLUMNS
        ))
        .bind(entity.id)
        .bind(entity.requested_amount)
        .bind(&entity.reason)
        .bind(entity.status.to_string())
        .bind(entity.reviewed_by)
        .bind(&entity.review_note)
        .bind(entity.reviewed_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error updating modification {}: {}", entity.id, e);
            AppError::Database(format!("Failed to update modification: {}", e))
        })?;

        Ok(row.into())
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: i64) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM order_modifications WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error deleting modification {}: {}", id, e);
                AppError::Database(format!("Failed to delete modification: {}", e))
            })?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl ModificationRepository for PgModificationRepository {
    #[instrument(skip(self))]
    async fn list_pending(
        &self,
        limit: i64,
        offset: i64,
    ) -> AppResult<Vec<OrderModification>> {
        let rows = sqlx::query_as::<sqlx::Postgres, ModificationRow>(&format!(
            r#"
            SELECT {}
            FROM order_modifications
            WHERE status = 'PENDING'
            ORDER BY created_at
            LIMIT $1 OFFSET $2
            "#,
            MODIFICATION_COLUMNS
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error listing pending modifications: {}", e);
            AppError::Database(format!("Failed to fetch pending modifications: {}", e))
        })?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self))]
    async fn review(
        &self,
        id: i64,
        status: ModificationStatus,
        reviewed_by: i64,
        note: Option<&str>,
    ) -> AppResult<Option<OrderModification>> {
        debug!("Reviewing modification {} as {}", id, status);

        // Conditional on PENDING so a concurrent review updates zero rows
        let row = sqlx::query_as::<sqlx::Postgres, ModificationRow>(&format!(
            r#"
            UPDATE order_modifications
            SET status = $2,
                reviewed_by = $3,
                review_note = $4,
                reviewed_at = NOW(),
                updated_at = NOW()
            WHERE id = $1 AND status = 'PENDING'
            RETURNING {}
            "#,
            MODIFICATION_COLUMNS
        ))
        .bind(id)
        .bind(status.to_string())
        .bind(reviewed_by)
        .bind(note)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error reviewing modification {}: {}", id, e);
            AppError::Database(format!("Failed to review modification: {}", e))
        })?;

        Ok(row.map(Into::into))
    }
}

/// Helper struct for mapping database rows
#[derive(Debug, sqlx::FromRow)]
struct ModificationRow {
    id: i64,
    order_id: i64,
    kind: String,
    requested_amount: i64,
    original_amount: i64,
    reason: String,
    requested_by: i64,
    status: String,
    reviewed_by: Option<i64>,
    review_note: Option<String>,
    reviewed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ModificationRow> for OrderModification {
    fn from(row: ModificationRow) -> Self {
        Self {
            id: row.id,
            order_id: row.order_id,
            kind: ModificationType::from_str(&row.kind).unwrap_or(ModificationType::AmountAdjust),
            requested_amount: row.requested_amount,
            original_amount: row.original_amount,
            reason: row.reason,
            requested_by: row.requested_by,
            status: ModificationStatus::from_str(&row.status).unwrap_or_default(),
            reviewed_by: row.reviewed_by,
            review_note: row.review_note,
            reviewed_at: row.reviewed_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}
