//! Parking site repository implementation

use parkbill_core::{
    models::ParkingSite,
    traits::{Repository, SiteRepository},
    AppError, AppResult,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::{debug, error, instrument};

const SITE_COLUMNS: &str = r#"
    id, code, name, unit_price, free_minutes, status, open_hours,
    created_at, updated_at
"#;

/// PostgreSQL implementation of SiteRepository
pub struct PgSiteRepository {
    pool: PgPool,
}

impl PgSiteRepository {
    /// Create a new site repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Repository<ParkingSite, i64> for PgSiteRepository {
    #[instrument(skip(self))]
    async fn find_by_id(&self, id: i64) -> AppResult<Option<ParkingSite>> {
        debug!("Finding site by id: {}", id);

        let result = sqlx::query_as::<sqlx::Postgres, SiteRow>(&format!(
            "SELECT {} FROM parking_sites WHERE id = $1",
            SITE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error finding site {}: {}", id, e);
            AppError::Database(format!("Failed to find site: {}", e))
        })?;

        Ok(result.map(Into::into))
    }

    #[instrument(skip(self))]
    async fn find_all(&self, limit: i64, offset: i64) -> AppResult<Vec<ParkingSite>> {
        let rows = sqlx::query_as::<sqlx::Postgres, SiteRow>(&format!(
            "SELECT {} FROM parking_sites ORDER BY code LIMIT $1 OFFSET $2",
            SITE_COLUMNS
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error listing sites: {}", e);
            AppError::Database(format!("Failed to fetch sites: {}", e))
        })?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self))]
    async fn count(&self) -> AppResult<i64> {
        let result: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM parking_sites")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error counting sites: {}", e);
                AppError::Database(format!("Failed to count sites: {}", e))
            })?;

        Ok(result.0)
    }

    #[instrument(skip(self, entity))]
    async fn create(&self, entity: &ParkingSite) -> AppResult<ParkingSite> {
        debug!("Creating site: {}", entity.code);

        let row = sqlx::query_as::<sqlx::Postgres, SiteRow>(&format!(
            r#"
            INSERT INTO parking_sites (code, name, unit_price, free_minutes, status, open_hours)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {}
            "#,
            SITE_COLUMNS
        ))
        .bind(&entity.code)
        .bind(&entity.name)
        .bind(entity.unit_price)
        .bind(entity.free_minutes)
        .bind(entity.status)
        .bind(&entity.open_hours)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error creating site: {}", e);
            AppError::Database(format!("Failed to create site: {}", e))
        })?;

        Ok(row.into())
    }

    #[instrument(skip(self, entity))]
    async fn update(&self, entity: &ParkingSite) -> AppResult<ParkingSite> {
        debug!("Updating site: {}", entity.id);

        let row = sqlx::query_as::<sqlx::Postgres, SiteRow>(&format!(
            r#"
            UPDATE parking_sites
            SET code = $2,
                name = $3,
                unit_price = $4,
                free_minutes = $5,
                status = $6,
                open_hours = $7,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            SITE_COLUMNS
        ))
        .bind(entity.id)
        .bind(&entity.code)
        .bind(&entity.name)
        .bind(entity.unit_price)
        .bind(entity.free_minutes)
        .bind(entity.status)
        .bind(&entity.open_hours)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error updating site {}: {}", entity.id, e);
            AppError::Database(format!("Failed to update site: {}", e))
        })?;

        Ok(row.into())
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: i64) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM parking_sites WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error deleting site {}: {}", id, e);
                AppError::Database(format!("Failed to delete site: {}", e))
            })?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl SiteRepository for PgSiteRepository {
    #[instrument(skip(self))]
    async fn find_by_code(&self, code: &str) -> AppResult<Option<ParkingSite>> {
        debug!("Finding site by code: {}", code);

        let result = sqlx::query_as::<sqlx::Postgres, SiteRow>(&format!(
            "SELECT {} FROM parking_sites WHERE code = $1",
            SITE_COLUMNS
        ))
        .bind(code)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error finding site by code {}: {}", code, e);
            AppError::Database(format!("Failed to find site: {}", e))
        })?;

        Ok(result.map(Into::into))
    }
}

/// Helper struct for mapping database rows
#[derive(Debug, sqlx::FromRow)]
struct SiteRow {
    id: i64,
    code: String,
    name: String,
    unit_price: Option<i64>,
    free_minutes: Option<i64>,
    status: i32,
    open_hours: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<SiteRow> for ParkingSite {
    fn from(row: SiteRow) -> Self {
        Self {
            id: row.id,
            code: row.code,
            name: row.name,
            unit_price: row.unit_price,
            free_minutes: row.free_minutes,
            status: row.status,
            open_hours: row.open_hours,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}
