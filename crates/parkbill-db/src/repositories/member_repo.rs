//! Membership repository implementation

use parkbill_core::{
    models::Membership,
    traits::{MemberRepository, Repository},
    AppError, AppResult,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use tracing::{debug, error, instrument};

const MEMBER_COLUMNS: &str = r#"
    id, user_id, tier, discount_rate, free_parking, status, remark,
    created_at, updated_at
"#;

/// PostgreSQL implementation of MemberRepository
pub struct PgMemberRepository {
    pool: PgPool,
}

impl PgMemberRepository {
    /// Create a new membership repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Repository<Membership, i64> for PgMemberRepository {
    #[instrument(skip(self))]
    async fn find_by_id(&self, id: i64) -> AppResult<Option<Membership>> {
        debug!("Finding membership by id: {}", id);

        let result = sqlx::query_as::<sqlx::Postgres, MemberRow>(&format!(
            "SELECT {} FROM memberships WHERE id = $1",
            MEMBER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error finding membership {}: {}", id, e);
            AppError::Database(format!("Failed to find membership: {}", e))
        })?;

        Ok(result.map(Into::into))
    }

    #[instrument(skip(self))]
    async fn find_all(&self, limit: i64, offset: i64) -> AppResult<Vec<Membership>> {
        let rows = sqlx::query_as::<sqlx::Postgres, MemberRow>(&format!(
            "SELECT {} FROM memberships ORDER BY user_id LIMIT $1 OFFSET $2",
            MEMBER_COLUMNS
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error listing memberships: {}", e);
            AppError::Database(format!("Failed to fetch memberships: {}", e))
        })?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self))]
    async fn count(&self) -> AppResult<i64> {
        let result: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM memberships")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error counting memberships: {}", e);
                AppError::Database(format!("Failed to count memberships: {}", e))
            })?;

        Ok(result.0)
    }

    #[instrument(skip(self, entity))]
    async fn create(&self, entity: &Membership) -> AppResult<Membership> {
        debug!("Creating membership for user: {}", entity.user_id);

        let row = sqlx::query_as::<sqlx::Postgres, MemberRow>(&format!(
            r#"
            INSERT INTO memberships (user_id, tier, discount_rate, free_parking, status, remark)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {}
            "#,
            MEMBER_COLUMNS
        ))
        .bind(entity.user_id)
        .bind(entity.tier)
        .bind(entity.discount_rate)
        .bind(entity.free_parking)
        .bind(entity.status)
        .bind(&entity.remark)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                return AppError::AlreadyExists(format!(
                    "membership for user {}",
                    entity.user_id
                ));
            }
            error!("Database error creating membership: {}", e);
            AppError::Database(format!("Failed to create membership: {}", e))
        })?;

        Ok(row.into())
    }

    #[instrument(skip(self, entity))]
    async fn update(&self, entity: &Membership) -> AppResult<Membership> {
        debug!("Updating membership: {}", entity.id);

        let row = sqlx::query_as::<sqlx::Postgres, MemberRow>(&format!(
            r#"
            UPDATE memberships
            SET tier = $2,
                discount_rate = $3,
                free_parking = $4,
                status = $5,
                remark = $6,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            MEMBER_COLUMNS
        ))
        .bind(entity.id)
        .bind(entity.tier)
        .bind(entity.discount_rate)
        .bind(entity.free_parking)
        .bind(entity.status)
        .bind(&entity.remark)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error updating membership {}: {}", entity.id, e);
            AppError::Database(format!("Failed to update membership: {}", e))
        })?;

        Ok(row.into())
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: i64) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM memberships WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error deleting membership {}: {}", id, e);
                AppError::Database(format!("Failed to delete membership: {}", e))
            })?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl MemberRepository for PgMemberRepository {
    #[instrument(skip(self))]
    async fn find_by_user(&self, user_id: i64) -> AppResult<Option<Membership>> {
        debug!("Finding membership for user: {}", user_id);

        let result = sqlx::query_as::<sqlx::Postgres, MemberRow>(&format!(
            "SELECT {} FROM memberships WHERE user_id = $1",
            MEMBER_COLUMNS
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!(
                "Database error finding membership for user {}: {}",
                user_id, e
            );
            AppError::Database(format!("Failed to find membership: {}", e))
        })?;

        Ok(result.map(Into::into))
    }

    #[instrument(skip(self))]
    async fn update_status(&self, id: i64, status: i32) -> AppResult<Membership> {
        debug!("Setting membership {} status to {}", id, status);

        let row = sqlx::query_as::<sqlx::Postgres, MemberRow>(&format!(
            r#"
            UPDATE memberships
            SET status = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            MEMBER_COLUMNS
        ))
        .bind(id)
        .bind(status)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error updating membership status {}: {}", id, e);
            AppError::Database(format!("Failed to update membership status: {}", e))
        })?;

        row.map(Into::into)
            .ok_or_else(|| AppError::MemberNotFound(id.to_string()))
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
struct MemberRow {
    id: i64,
    user_id: i64,
    tier: i32,
    discount_rate: Option<Decimal>,
    free_parking: bool,
    status: i32,
    remark: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<MemberRow> for Membership {
    fn from(row: MemberRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            tier: row.tier,
            discount_rate: row.discount_rate,
            free_parking: row.free_parking,
            status: row.status,
            remark: row.remark,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}
