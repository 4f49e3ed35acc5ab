//! Promotional rule repository implementation

use parkbill_core::{
    models::{DiscountKind, PromotionalRule},
    traits::{PromoRepository, Repository},
    AppError, AppResult,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::{debug, error, instrument};

const PROMO_COLUMNS: &str = r#"
    id, code, name, description, kind, value, max_discount, status,
    effective_start, effective_end, created_at, updated_at
"#;

/// PostgreSQL implementation of PromoRepository
pub struct PgPromoRepository {
    pool: PgPool,
}

impl PgPromoRepository {
    /// Create a new promotional rule repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Repository<PromotionalRule, i64> for PgPromoRepository {
    #[instrument(skip(self))]
    async fn find_by_id(&self, id: i64) -> AppResult<Option<PromotionalRule>> {
        debug!("Finding promotional rule by id: {}", id);

        let result = sqlx::query_as::<sqlx::Postgres, PromoRow>(&format!(
            "SELECT {} FROM promotional_rules WHERE id = $1",
            PROMO_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error finding promo {}: {}", id, e);
            AppError::Database(format!("Failed to find promo: {}", e))
        })?;

        Ok(result.map(Into::into))
    }

    #[instrument(skip(self))]
    async fn find_all(&self, limit: i64, offset: i64) -> AppResult<Vec<PromotionalRule>> {
        let rows = sqlx::query_as::<sqlx::Postgres, PromoRow>(&format!(
            "SELECT {} FROM promotional_rules ORDER BY code LIMIT $1 OFFSET $2",
            PROMO_COLUMNS
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error listing promos: {}", e);
            AppError::Database(format!("Failed to fetch promos: {}", e))
        })?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self))]
    async fn count(&self) -> AppResult<i64> {
        let result: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM promotional_rules")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error counting promos: {}", e);
                AppError::Database(format!("Failed to count promos: {}", e))
            })?;

        Ok(result.0)
    }

    #[instrument(skip(self, entity))]
    async fn create(&self, entity: &PromotionalRule) -> AppResult<PromotionalRule> {
        debug!("Creating promotional rule: {}", entity.code);

        let row = sqlx::query_as::<sqlx::Postgres, PromoRow>(&format!(
            r#"
            INSERT INTO promotional_rules (
                code, name, description, kind, value, max_discount, status,
                effective_start, effective_end
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {}
            "#,
            PROMO_COLUMNS
        ))
        .bind(&entity.code)
        .bind(&entity.name)
        .bind(&entity.description)
        .bind(entity.kind.to_string())
        .bind(entity.value)
        .bind(entity.max_discount)
        .bind(entity.status)
        .bind(entity.effective_start)
        .bind(entity.effective_end)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                return AppError::AlreadyExists(format!("promo code {}", entity.code));
            }
            error!("Database error creating promo: {}", e);
            AppError::Database(format!("Failed to create promo: {}", e))
        })?;

        Ok(row.into())
    }

    #[instrument(skip(self, entity))]
    async fn update(&self, entity: &PromotionalRule) -> AppResult<PromotionalRule> {
        debug!("Updating promotional rule: {}", entity.id);

        let row = sqlx::query_as::<sqlx::Postgres, PromoRow>(&format!(
            r#"
            UPDATE promotional_rules
            SET code = $2,
                name = $3,
                description = $4,
                kind = $5,
                value = $6,
                max_discount = $7,
                status = $8,
                effective_start = $9,
                effective_end = $10,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            PROMO_COLUMNS
        ))
        .bind(entity.id)
        .bind(&entity.code)
        .bind(&entity.name)
        .bind(&entity.description)
        .bind(entity.kind.to_string())
        .bind(entity.value)
        .bind(entity.max_discount)
        .bind(entity.status)
        .bind(entity.effective_start)
        .bind(entity.effective_end)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error updating promo {}: {}", entity.id, e);
            AppError::Database(format!("Failed to update promo: {}", e))
        })?;

        Ok(row.into())
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: i64) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM promotional_rules WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error deleting promo {}: {}", id, e);
                AppError::Database(format!("Failed to delete promo: {}", e))
            })?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl PromoRepository for PgPromoRepository {
    #[instrument(skip(self))]
    async fn find_by_code(&self, code: &str) -> AppResult<Option<PromotionalRule>> {
        debug!("Finding promotional rule by code: {}", code);

        let result = sqlx::query_as::<sqlx::Postgres, PromoRow>(&format!(
            "SELECT {} FROM promotional_rules WHERE code = $1",
            PROMO_COLUMNS
        ))
        .bind(code)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error finding promo by code {}: {}", code, e);
            AppError::Database(format!("Failed to find promo: {}", e))
        })?;

        Ok(result.map(Into::into))
    }

    #[instrument(skip(self))]
    async fn update_status(&self, id: i64, status: i32) -> AppResult<PromotionalRule> {
        debug!("Setting promo {} status to {}", id, status);

        let row = sqlx::query_as::<sqlx::Postgres, PromoRow>(&format!(
            r#"
            UPDATE promotional_rules
            SET status = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            PROMO_COLUMNS
        ))
        .bind(id)
        .bind(status)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error updating promo status {}: {}", id, e);
            AppError::Database(format!("Failed to update promo status: {}", e))
        })?;

        row.map(Into::into)
            .ok_or_else(|| AppError::PromoNotFound(id.to_string()))
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
struct PromoRow {
    id: i64,
    code: String,
    name: String,
    description: Option<String>,
    kind: String,
    value: i32,
    max_discount: Option<i64>,
    status: i32,
    effective_start: Option<DateTime<Utc>>,
    effective_end: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<PromoRow> for PromotionalRule {
    fn from(row: PromoRow) -> Self {
        Self {
            id: row.id,
            code: row.code,
            name: row.name,
            description: row.description,
            kind: DiscountKind::from_str(&row.kind).unwrap_or(DiscountKind::Percent),
            value: row.value,
            max_discount: row.max_discount,
            status: row.status,
            effective_start: row.effective_start,
            effective_end: row.effective_end,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}
