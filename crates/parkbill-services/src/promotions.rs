//! Promotional rule service
//!
//! Administers promotional rules and serves the settlement path's by-code
//! lookup, cache-aside with confirmed-absence markers so mistyped codes do
//! not turn into repeated database lookups.

use parkbill_cache::{keys, CacheOutcome, EntryCache, RedisCache};
use parkbill_core::{
    models::PromotionalRule,
    traits::PromoRepository,
    AppError, AppResult,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Promotional rule administration and cached lookup
pub struct PromotionService<C = RedisCache> {
    repo: Arc<dyn PromoRepository>,
    cache: Arc<C>,
}

impl<C: EntryCache> PromotionService<C> {
    /// Create a new promotion service
    pub fn new(repo: Arc<dyn PromoRepository>, cache: Arc<C>) -> Self {
        Self { repo, cache }
    }

    /// Find a promotional rule by code, cache-aside.
    ///
    /// The raw rule is cached; effectiveness is evaluated per call so a rule
    /// expiring mid-TTL stops applying without an eviction.
    #[instrument(skip(self))]
    pub async fn find_by_code(&self, code: &str) -> AppResult<Option<PromotionalRule>> {
        let key = keys::promo_key(code);

        match self.cache.get_entry::<PromotionalRule>(&key).await {
            Ok(CacheOutcome::Hit(p)) => return Ok(Some(p)),
            Ok(CacheOutcome::Absent) => return Ok(None),
            Ok(CacheOutcome::Miss) => {}
            Err(e) => warn!("Promo cache read failed for code {}: {}", code, e),
        }

        debug!("Promo cache MISS for code {}", code);
        let promo = self.repo.find_by_code(code).await?;

        let store_result = match &promo {
            Some(p) => self.cache.put(&key, p, keys::PROMO_TTL_SECS).await,
            None => self.cache.put_absent(&key, keys::ABSENT_TTL_SECS).await,
        };
        if let Err(e) = store_result {
            warn!("Failed to cache promo {}: {}", code, e);
        }

        Ok(promo)
    }

    /// Find a rule by code and keep it only if redeemable at `at`
    #[instrument(skip(self))]
    pub async fn find_effective(
        &self,
        code: &str,
        at: DateTime<Utc>,
    ) -> AppResult<Option<PromotionalRule>> {
        let promo = self.find_by_code(code).await?;
        Ok(promo.filter(|p| p.is_effective(at)))
    }

    /// List promotional rules with pagination
    pub async fn list(&self, limit: i64, offset: i64) -> AppResult<Vec<PromotionalRule>> {
        self.repo.find_all(limit, offset).await
    }

    /// Create a promotional rule.
    ///
    /// The fresh rule is primed into the cache, overwriting any lingering
    /// absence marker from lookups made before the code existed.
    #[instrument(skip(self, promo))]
    pub async fn create(&self, promo: &PromotionalRule) -> AppResult<PromotionalRule> {
        if promo.code.trim().is_empty() {
            return Err(AppError::Validation("promo code must not be empty".to_string()));
        }
        if promo.value <= 0 {
            return Err(AppError::Validation(
                "promo value must be positive".to_string(),
            ));
        }

        let created = self.repo.create(promo).await?;
        let key = keys::promo_key(&created.code);
        if let Err(e) = self.cache.put(&key, &created, keys::PROMO_TTL_SECS).await {
            warn!("Failed to prime promo cache for {}: {}", created.code, e);
        }
        Ok(created)
    }

    /// Update a promotional rule and drop its cached lookup
    #[instrument(skip(self, promo))]
    pub async fn update(&self, promo: &PromotionalRule) -> AppResult<PromotionalRule> {
        let updated = self.repo.update(promo).await?;
        self.evict_code(&updated.code).await;
        Ok(updated)
    }

    /// Enable or disable a rule and drop its cached lookup
    #[instrument(skip(self))]
    pub async fn change_status(&self, id: i64, status: i32) -> AppResult<PromotionalRule> {
        let updated = self.repo.update_status(id, status).await?;
        self.evict_code(&updated.code).await;
        Ok(updated)
    }

    /// Delete a promotional rule and drop its cached lookup
    #[instrument(skip(self))]
    pub async fn delete(&self, id: i64) -> AppResult<bool> {
        let existing = self
            .repo
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::PromoNotFound(id.to_string()))?;

        let deleted = self.repo.delete(id).await?;
        self.evict_code(&existing.code).await;
        Ok(deleted)
    }

    async fn evict_code(&self, code: &str) {
        if let Err(e) = self.cache.evict(&keys::promo_key(code)).await {
            warn!("Failed to evict promo cache for {}: {}", code, e);
        }
    }
}
