//! Billing rule repository implementation
//!
//! Applicable-rule lookup resolves the highest-priority enabled rule whose
//! effective date range covers the settlement day, entirely in SQL.

use parkbill_core::{
    models::BillingRule,
    traits::{Repository, RuleRepository},
    AppError, AppResult,
};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::PgPool;
use tracing::{debug, error, instrument};

const RULE_COLUMNS: &str = r#"
    id, site_id, rule_name, vehicle_class, pricing_mode, free_minutes,
    unit_price, max_amount_per_session, max_amount_per_day,
    effective_start_date, effective_end_date, effective_time_range,
    priority, status, created_at, updated_at
"#;

/// PostgreSQL implementation of RuleRepository
pub struct PgRuleRepository {
    pool: PgPool,
}

impl PgRuleRepository {
    /// Create a new rule repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Repository<BillingRule, i64> for PgRuleRepository {
    #[instrument(skip(self))]
    async fn find_by_id(&self, id: i64) -> AppResult<Option<BillingRule>> {
        debug!("Finding billing rule by id: {}", id);

        let result = sqlx::query_as::<sqlx::Postgres, RuleRow>(&format!(
            "SELECT {} FROM billing_rules WHERE id = $1",
            RULE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error finding rule {}: {}", id, e);
            AppError::Database(format!("Failed to find rule: {}", e))
        })?;

        Ok(result.map(Into::into))
    }

    #[instrument(skip(self))]
    async fn find_all(&self, limit: i64, offset: i64) -> AppResult<Vec<BillingRule>> {
        let rows = sqlx::query_as::<sqlx::Postgres, RuleRow>(&format!(
            "SELECT {} FROM billing_rules ORDER BY site_id, priority DESC LIMIT $1 OFFSET $2",
            RULE_COLUMNS
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error listing rules: {}", e);
            AppError::Database(format!("Failed to fetch rules: {}", e))
        })?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self))]
    async fn count(&self) -> AppResult<i64> {
        let result: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM billing_rules")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error counting rules: {}", e);
                AppError::Database(format!("Failed to count rules: {}", e))
            })?;

        Ok(result.0)
    }

    #[instrument(skip(self, entity))]
    async fn create(&self, entity: &BillingRule) -> AppResult<BillingRule> {
        debug!(
            "Creating billing rule '{}' for site {}",
            entity.rule_name, entity.site_id
        );

        let row = sqlx::query_as::<sqlx::Postgres, RuleRow>(&format!(
            r#"
            INSERT INTO billing_rules (
                site_id, rule_name, vehicle_class, pricing_mode, free_minutes,
                unit_price, max_amount_per_session, max_amount_per_day,
                effective_start_date, effective_end_date, effective_time_range,
                priority, status
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING {}
            "#,
            RULE_COLUMNS
        ))
        .bind(entity.site_id)
        .bind(&entity.rule_name)
        .bind(&entity.vehicle_class)
        .bind(entity.pricing_mode)
        .bind(entity.free_minutes)
        .bind(entity.unit_price)
        .bind(entity.max_amount_per_session)
        .bind(entity.max_amount_per_day)
        .bind(entity.effective_start_date)
        .bind(entity.effective_end_date)
        .bind(&entity.effective_time_range)
        .bind(entity.priority)
        .bind(entity.status)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error creating rule: {}", e);
            AppError::Database(format!("Failed to create rule: {}", e))
        })?;

        Ok(row.into())
    }

    #[instrument(skip(self, entity))]
    async fn update(&self, entity: &BillingRule) -> AppResult<BillingRule> {
        debug!("Updating billing rule: {}", entity.id);

        let row = sqlx::query_as::<sqlx::Postgres, RuleRow>(&format!(
            r#"
            UPDATE billing_rules
            SET site_id = $2,
                rule_name = $3,
                vehicle_class = $4,
                pricing_mode = $5,
                free_minutes = $6,
                unit_price = $7,
                max_amount_per_session = $8,
                max_amount_per_day = $9,
                effective_start_date = $10,
                effective_end_date = $11,
                effective_time_range = $12,
                priority = $13,
                status = $14,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            RULE_COLUMNS
        ))
        .bind(entity.id)
        .bind(entity.site_id)
        .bind(&entity.rule_name)
        .bind(&entity.vehicle_class)
        .bind(entity.pricing_mode)
        .bind(entity.free_minutes)
        .bind(entity.unit_price)
        .bind(entity.max_amount_per_session)
        .bind(entity.max_amount_per_day)
        .bind(entity.effective_start_date)
        .bind(entity.effective_end_date)
        .bind(&entity.effective_time_range)
        .bind(entity.priority)
        .bind(entity.status)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error updating rule {}: {}", entity.id, e);
            AppError::Database(format!("Failed to update rule: {}", e))
        })?;

        Ok(row.into())
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: i64) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM billing_rules WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error deleting rule {}: {}", id, e);
                AppError::Database(format!("Failed to delete rule: {}", e))
            })?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl RuleRepository for PgRuleRepository {
    #[instrument(skip(self))]
    async fn find_applicable(
        &self,
        site_id: i64,
        on: NaiveDate,
    ) -> AppResult<Option<BillingRule>> {
        debug!("Finding applicable rule for site {} on {}", site_id, on);

        let result = sqlx::query_as::<sqlx::Postgres, RuleRow>(&format!(
            r#"
            SELECT {}
            FROM billing_rules
            WHERE site_id = $1
                AND status = 1
                AND (effective_start_date IS NULL OR effective_start_date <= $2)
                AND (effective_end_date IS NULL OR effective_end_date >= $2)
            ORDER BY priority DESC, created_at DESC
            LIMIT 1
            "#,
            RULE_COLUMNS
        ))
        .bind(site_id)
        .bind(on)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!(
                "Database error finding applicable rule for site {}: {}",
                site_id, e
            );
            AppError::Database(format!("Failed to find applicable rule: {}", e))
        })?;

        if result.is_none() {
            debug!("No applicable rule for site {}", site_id);
        }

        Ok(result.map(Into::into))
    }

    #[instrument(skip(self))]
    async fn list_by_site(&self, site_id: i64) -> AppResult<Vec<BillingRule>> {
        let rows = sqlx::query_as::<sqlx::Postgres, RuleRow>(&format!(
            "SELECT {} FROM billing_rules WHERE site_id = $1 ORDER BY priority DESC, id",
            RULE_COLUMNS
        ))
        .bind(site_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error listing rules for site {}: {}", site_id, e);
            AppError::Database(format!("Failed to fetch rules: {}", e))
        })?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self))]
    async fn update_status(&self, id: i64, status: i32) -> AppResult<BillingRule> {
        debug!("Setting rule {} status to {}", id, status);

        let row = sqlx::query_as::<sqlx::Postgres, RuleRow>(&format!(
            r#"
            UPDATE billing_rules
            SET status = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            RULE_COLUMNS
        ))
        .bind(id)
        .bind(status)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error updating rule status {}: {}", id, e);
            AppError::Database(format!("Failed to update rule status: {}", e))
        })?;

        row.map(Into::into)
            .ok_or_else(|| AppError::RuleNotFound(id.to_string()))
    }
}

/// Helper struct for mapping database rows
#[derive(Debug, sqlx::FromRow)]
struct RuleRow {
    id: i64,
    site_id: i64,
    rule_name: String,
    vehicle_class: Option<String>,
    pricing_mode: i32,
    free_minutes: i64,
    unit_price: i64,
    max_amount_per_session: Option<i64>,
    max_amount_per_day: Option<i64>,
    effective_start_date: Option<NaiveDate>,
    effective_end_date: Option<NaiveDate>,
    effective_time_range: Option<String>,
    priority: i32,
    status: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<RuleRow> for BillingRule {
    fn from(row: RuleRow) -> Self {
        Self {
            id: row.id,
            site_id: row.site_id,
            rule_name: row.rule_name,
            vehicle_class: row.vehicle_class,
            pricing_mode: row.pricing_mode,
            free_minutes: row.free_minutes,
            unit_price: row.unit_price,
            max_amount_per_session: row.max_amount_per_session,
            max_amount_per_day: row.max_amount_per_day,
            effective_start_date: row.effective_start_date,
            effective_end_date: row.effective_end_date,
            effective_time_range: row.effective_time_range,
            priority: row.priority,
            status: row.status,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}
