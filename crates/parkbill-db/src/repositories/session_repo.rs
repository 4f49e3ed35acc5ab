//! Parking session repository implementation

use parkbill_core::{
    models::{ParkingSession, SessionStatus},
    traits::{Repository, SessionRepository},
    AppError, AppResult,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::{debug, error, instrument};

const SESSION_COLUMNS: &str = r#"
    id, plate_number, site_id, entry_time, exit_time,
    paid_amount, status, created_at, updated_at
"#;

/// PostgreSQL implementation of SessionRepository
pub struct PgSessionRepository {
    pool: PgPool,
}

impl PgSessionRepository {
    /// Create a new session repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Repository<ParkingSession, i64> for PgSessionRepository {
    #[instrument(skip(self))]
    async fn find_by_id(&self, id: i64) -> AppResult<Option<ParkingSession>> {
        debug!("Finding session by id: {}", id);

        let result = sqlx::query_as::<sqlx::Postgres, SessionRow>(&format!(
            "SELECT {} FROM parking_sessions WHERE id = $1",
            SESSION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error finding session {}: {}", id, e);
            AppError::Database(format!("Failed to find session: {}", e))
        })?;

        Ok(result.map(Into::into))
    }

    #[instrument(skip(self))]
    async fn find_all(&self, limit: i64, offset: i64) -> AppResult<Vec<ParkingSession>> {
        let rows = sqlx::query_as::<sqlx::Postgres, SessionRow>(&format!(
            "SELECT {} FROM parking_sessions ORDER BY entry_time DESC LIMIT $1 OFFSET $2",
            SESSION_COLUMNS
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error listing sessions: {}", e);
            AppError::Database(format!("Failed to fetch sessions: {}", e))
        })?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self))]
    async fn count(&self) -> AppResult<i64> {
        let result: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM parking_sessions")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error counting sessions: {}", e);
                AppError::Database(format!("Failed to count sessions: {}", e))
            })?;

        Ok(result.0)
    }

    #[instrument(skip(self, entity))]
    async fn create(&self, entity: &ParkingSession) -> AppResult<ParkingSession> {
        debug!(
            "Creating session for plate {} at site {}",
            entity.plate_number, entity.site_id
        );

        let row = sqlx::query_as::<sqlx::Postgres, SessionRow>(&format!(
            r#"
            INSERT INTO parking_sessions (plate_number, site_id, entry_time, status)
            VALUES ($1, $2, $3, $4)
            RETURNING {}
            "#,
            SESSION_COLUMNS
        ))
        .bind(&entity.plate_number)
        .bind(entity.site_id)
        .bind(entity.entry_time)
        .bind(entity.status.to_string())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error creating session: {}", e);
            AppError::Database(format!("Failed to create session: {}", e))
        })?;

        Ok(row.into())
    }

    #[instrument(skip(self, entity))]
    async fn update(&self, entity: &ParkingSession) -> AppResult<ParkingSession> {
        debug!("Updating session: {}", entity.id);

        let row = sqlx::query_as::<sqlx::Postgres, SessionRow>(&format!(
            r#"
            UPDATE parking_sessions
            SET plate_number = $2,
                site_id = $3,
                entry_time = $4,
                exit_time = $5,
                paid_amount = $6,
                status = $7,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            SESSION_COLUMNS
        ))
        .bind(entity.id)
        .bind(&entity.plate_number)
        .bind(entity.site_id)
        .bind(entity.entry_time)
        .bind(entity.exit_time)
        .bind(entity.paid_amount)
        .bind(entity.status.to_string())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error updating session {}: {}", entity.id, e);
            AppError::Database(format!("Failed to update session: {}", e))
        })?;

        Ok(row.into())
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: i64) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM parking_sessions WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error deleting session {}: {}", id, e);
                AppError::Database(format!("Failed to delete session: {}", e))
            })?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl SessionRepository for PgSessionRepository {
    #[instrument(skip(self))]
    async fn find_active_by_plate(
        &self,
        site_id: i64,
        plate_number: &str,
    ) -> AppResult<Option<ParkingSession>> {
        debug!(
            "Finding active session for plate {} at site {}",
            plate_number, site_id
        );

        let result = sqlx::query_as::<sqlx::Postgres, SessionRow>(&format!(
            r#"
            SELECT {}
            FROM parking_sessions
            WHERE site_id = $1 AND plate_number = $2 AND status = 'ACTIVE'
            ORDER BY entry_time DESC
            LIMIT 1
            "#,
            SESSION_COLUMNS
        ))
        .bind(site_id)
        .bind(plate_number)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error finding active session: {}", e);
            AppError::Database(format!("Failed to find active session: {}", e))
        })?;

        Ok(result.map(Into::into))
    }

    #[instrument(skip(self))]
    async fn list_by_site(
        &self,
        site_id: i64,
        limit: i64,
        offset: i64,
    ) -> AppResult<(Vec<ParkingSession>, i64)> {
        let total: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM parking_sessions WHERE site_id = $1")
                .bind(site_id)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| {
                    error!("Database error counting site sessions: {}", e);
                    AppError::Database(format!("Failed to count sessions: {}", e))
                })?;

        let rows = sqlx::query_as::<sqlx::Postgres, SessionRow>(&format!(
            r#"
            SELECT {}
            FROM parking_sessions
            WHERE site_id = $1
            ORDER BY entry_time DESC
            LIMIT $2 OFFSET $3
            "#,
            SESSION_COLUMNS
        ))
        .bind(site_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error listing site sessions: {}", e);
            AppError::Database(format!("Failed to fetch sessions: {}", e))
        })?;

        Ok((rows.into_iter().map(Into::into).collect(), total.0))
    }
}

/// Helper struct for mapping database rows
#[derive(Debug, sqlx::FromRow)]
struct SessionRow {
    id: i64,
    plate_number: String,
    site_id: i64,
    entry_time: DateTime<Utc>,
    exit_time: Option<DateTime<Utc>>,
    paid_amount: Option<i64>,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<SessionRow> for ParkingSession {
    fn from(row: SessionRow) -> Self {
        Self {
            id: row.id,
            plate_number: row.plate_number,
            site_id: row.site_id,
            entry_time: row.entry_time,
            exit_time: row.exit_time,
            paid_amount: row.paid_amount,
            status: SessionStatus::from_str(&row.status).unwrap_or_default(),
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}
