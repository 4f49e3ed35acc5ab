//! Billing rule resolution service
//!
//! Resolves the rule a settlement prices with, cache-aside over Redis.
//! A site with no applicable rule falls back to the site's own unit price;
//! a site with neither is a configuration error surfaced to the caller.
//!
//! Cache failures are tolerated on the read path: a broken Redis degrades
//! to database lookups instead of failing settlements.

use parkbill_cache::{keys, CacheOutcome, EntryCache, RedisCache};
use parkbill_core::{
    models::{BillingRule, ParkingSite},
    traits::{RuleRepository, SiteRepository},
    AppError, AppResult,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use crate::constants::DEFAULT_FREE_MINUTES;

/// Rule name recorded on orders priced by the site fallback
const FALLBACK_RULE_NAME: &str = "Site default pricing";

/// Billing rule resolution with caching
pub struct RuleService<C = RedisCache> {
    rule_repo: Arc<dyn RuleRepository>,
    site_repo: Arc<dyn SiteRepository>,
    cache: Arc<C>,
}

impl<C: EntryCache> RuleService<C> {
    /// Create a new rule service
    pub fn new(
        rule_repo: Arc<dyn RuleRepository>,
        site_repo: Arc<dyn SiteRepository>,
        cache: Arc<C>,
    ) -> Self {
        Self {
            rule_repo,
            site_repo,
            cache,
        }
    }

    /// Find the applicable rule for a site, cache-aside.
    ///
    /// A site with no applicable rule is cached as absent so repeated
    /// settlements at an unconfigured site do not hammer the database.
    #[instrument(skip(self))]
    pub async fn applicable_rule(
        &self,
        site_id: i64,
        at: DateTime<Utc>,
    ) -> AppResult<Option<BillingRule>> {
        let key = keys::rule_key(site_id);

        match self.cache.get_entry::<BillingRule>(&key).await {
            Ok(CacheOutcome::Hit(rule)) => return Ok(Some(rule)),
            Ok(CacheOutcome::Absent) => return Ok(None),
            Ok(CacheOutcome::Miss) => {}
            Err(e) => warn!("Rule cache read failed for site {}: {}", site_id, e),
        }

        debug!("Rule cache MISS for site {}", site_id);
        let rule = self
            .rule_repo
            .find_applicable(site_id, at.date_naive())
            .await?;

        let store_result = match &rule {
            Some(r) => self.cache.put(&key, r, keys::RULE_TTL_SECS).await,
            None => self.cache.put_absent(&key, keys::ABSENT_TTL_SECS).await,
        };
        if let Err(e) = store_result {
            warn!("Failed to cache rule for site {}: {}", site_id, e);
        }

        Ok(rule)
    }

    /// Load site metadata, cache-aside with the same absence handling
    #[instrument(skip(self))]
    pub async fn site(&self, site_id: i64) -> AppResult<Option<ParkingSite>> {
        let key = keys::site_key(site_id);

        match self.cache.get_entry::<ParkingSite>(&key).await {
            Ok(CacheOutcome::Hit(site)) => return Ok(Some(site)),
            Ok(CacheOutcome::Absent) => return Ok(None),
            Ok(CacheOutcome::Miss) => {}
            Err(e) => warn!("Site cache read failed for {}: {}", site_id, e),
        }

        debug!("Site cache MISS for {}", site_id);
        let site = self.site_repo.find_by_id(site_id).await?;

        let store_result = match &site {
            Some(s) => self.cache.put(&key, s, keys::SITE_TTL_SECS).await,
            None => self.cache.put_absent(&key, keys::ABSENT_TTL_SECS).await,
        };
        if let Err(e) = store_result {
            warn!("Failed to cache site {}: {}", site_id, e);
        }

        Ok(site)
    }

    /// Resolve the pricing a settlement at `site_id` uses.
    ///
    /// The applicable rule wins; otherwise a fallback rule is synthesized
    /// from the site's unit price. A site with neither configured cannot be
    /// billed and surfaces as [`AppError::SiteConfig`].
    #[instrument(skip(self))]
    pub async fn resolve_pricing(&self, site_id: i64, at: DateTime<Utc>) -> AppResult<BillingRule> {
        if let Some(rule) = self.applicable_rule(site_id, at).await? {
            return Ok(rule);
        }

        let site = self
            .site(site_id)
            .await?
            .ok_or_else(|| AppError::SiteNotFound(site_id.to_string()))?;

        let unit_price = site.usable_unit_price().ok_or_else(|| {
            AppError::SiteConfig(format!(
                "site {} has no applicable rule and no unit price",
                site_id
            ))
        })?;

        debug!("Using site fallback pricing for site {}", site_id);
        Ok(BillingRule {
            site_id,
            rule_name: FALLBACK_RULE_NAME.to_string(),
            free_minutes: site.free_minutes.unwrap_or(DEFAULT_FREE_MINUTES),
            unit_price,
            ..Default::default()
        })
    }

    /// Create or update a rule and drop the site's cached resolution
    #[instrument(skip(self, rule))]
    pub async fn save_rule(&self, rule: &BillingRule) -> AppResult<BillingRule> {
        let saved = if rule.id == 0 {
            self.rule_repo.create(rule).await?
        } else {
            self.rule_repo.update(rule).await?
        };

        self.evict_site(saved.site_id).await;
        Ok(saved)
    }

    /// Enable or disable a rule and drop the site's cached resolution
    #[instrument(skip(self))]
    pub async fn change_rule_status(&self, id: i64, status: i32) -> AppResult<BillingRule> {
        let rule = self.rule_repo.update_status(id, status).await?;
        self.evict_site(rule.site_id).await;
        Ok(rule)
    }

    /// List a site's rules straight from storage
    pub async fn list_rules(&self, site_id: i64) -> AppResult<Vec<BillingRule>> {
        self.rule_repo.list_by_site(site_id).await
    }

    /// Drop every billing cache entry
    ///
    /// Admin escape hatch after bulk configuration changes. Lock keys live
    /// outside the `charge:` namespace and are untouched.
    #[instrument(skip(self))]
    pub async fn evict_all(&self) -> AppResult<u64> {
        self.cache
            .evict_pattern(&keys::pattern(keys::CHARGE_PREFIX))
            .await
    }

    async fn evict_site(&self, site_id: i64) {
        if let Err(e) = self.cache.evict(&keys::rule_key(site_id)).await {
            warn!("Failed to evict rule cache for site {}: {}", site_id, e);
        }
        if let Err(e) = self.cache.evict(&keys::site_key(site_id)).await {
            warn!("Failed to evict site cache for {}: {}", site_id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::MapCache;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use parkbill_core::traits::Repository;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Rule storage for a site that has no applicable rule; counts lookups
    #[derive(Default)]
    struct UnconfiguredRules {
        lookups: AtomicUsize,
    }

    #[async_trait]
    impl Repository<BillingRule, i64> for UnconfiguredRules {
        async fn find_by_id(&self, _id: i64) -> AppResult<Option<BillingRule>> {
            unimplemented!()
        }
        async fn find_all(&self, _limit: i64, _offset: i64) -> AppResult<Vec<BillingRule>> {
            unimplemented!()
        }
        async fn count(&self) -> AppResult<i64> {
            unimplemented!()
        }
        async fn create(&self, _rule: &BillingRule) -> AppResult<BillingRule> {
            unimplemented!()
        }
        async fn update(&self, _rule: &BillingRule) -> AppResult<BillingRule> {
            unimplemented!()
        }
        async fn delete(&self, _id: i64) -> AppResult<bool> {
            unimplemented!()
        }
    }

    #[async_trait]
    impl RuleRepository for UnconfiguredRules {
        async fn find_applicable(
            &self,
            _site_id: i64,
            _on: NaiveDate,
        ) -> AppResult<Option<BillingRule>> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            Ok(None)
        }
        async fn list_by_site(&self, _site_id: i64) -> AppResult<Vec<BillingRule>> {
            unimplemented!()
        }
        async fn update_status(&self, _id: i64, _status: i32) -> AppResult<BillingRule> {
            unimplemented!()
        }
    }

    /// Site storage with no rows; counts lookups
    #[derive(Default)]
    struct EmptySites {
        lookups: AtomicUsize,
    }

    #[async_trait]
    impl Repository<ParkingSite, i64> for EmptySites {
        async fn find_by_id(&self, _id: i64) -> AppResult<Option<ParkingSite>> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            Ok(None)
        }
        async fn find_all(&self, _limit: i64, _offset: i64) -> AppResult<Vec<ParkingSite>> {
            unimplemented!()
        }
        async fn count(&self) -> AppResult<i64> {
            unimplemented!()
        }
        async fn create(&self, _site: &ParkingSite) -> AppResult<ParkingSite> {
            unimplemented!()
        }
        async fn update(&self, _site: &ParkingSite) -> AppResult<ParkingSite> {
            unimplemented!()
        }
        async fn delete(&self, _id: i64) -> AppResult<bool> {
            unimplemented!()
        }
    }

    #[async_trait]
    impl SiteRepository for EmptySites {
        async fn find_by_code(&self, _code: &str) -> AppResult<Option<ParkingSite>> {
            unimplemented!()
        }
    }

    #[tokio::test]
    async fn test_unconfigured_site_hits_rule_storage_once() {
        let rule_repo = Arc::new(UnconfiguredRules::default());
        let service = RuleService::new(
            rule_repo.clone(),
            Arc::new(EmptySites::default()),
            Arc::new(MapCache::default()),
        );

        let at = Utc::now();
        assert!(service.applicable_rule(42, at).await.unwrap().is_none());
        assert!(service.applicable_rule(42, at).await.unwrap().is_none());

        // The absence marker answers the second lookup
        assert_eq!(rule_repo.lookups.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unknown_site_hits_site_storage_once() {
        let site_repo = Arc::new(EmptySites::default());
        let service = RuleService::new(
            Arc::new(UnconfiguredRules::default()),
            site_repo.clone(),
            Arc::new(MapCache::default()),
        );

        assert!(service.site(42).await.unwrap().is_none());
        assert!(service.site(42).await.unwrap().is_none());

        assert_eq!(site_repo.lookups.load(Ordering::SeqCst), 1);
    }
}
