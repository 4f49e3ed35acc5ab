//! Membership service
//!
//! Administers memberships and serves the settlement path's per-user lookup,
//! cache-aside with confirmed-absence markers so non-members do not trigger
//! a database read on every settlement.

use parkbill_cache::{keys, CacheOutcome, EntryCache, RedisCache};
use parkbill_core::{
    models::Membership,
    traits::MemberRepository,
    AppError, AppResult,
};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Membership administration and cached lookup
pub struct MembershipService<C = RedisCache> {
    repo: Arc<dyn MemberRepository>,
    cache: Arc<C>,
}

impl<C: EntryCache> MembershipService<C> {
    /// Create a new membership service
    pub fn new(repo: Arc<dyn MemberRepository>, cache: Arc<C>) -> Self {
        Self { repo, cache }
    }

    /// Find the active membership for a user, cache-aside.
    ///
    /// Inactive memberships resolve to `None` for billing purposes but the
    /// raw row is what gets cached, so re-activation shows up after the
    /// next eviction or TTL expiry.
    #[instrument(skip(self))]
    pub async fn find_active_by_user(&self, user_id: i64) -> AppResult<Option<Membership>> {
        let membership = self.find_by_user(user_id).await?;
        Ok(membership.filter(|m| m.is_active()))
    }

    /// Find a user's membership regardless of status, cache-aside
    #[instrument(skip(self))]
    pub async fn find_by_user(&self, user_id: i64) -> AppResult<Option<Membership>> {
        let key = keys::member_key(user_id);

        match self.cache.get_entry::<Membership>(&key).await {
            Ok(CacheOutcome::Hit(m)) => return Ok(Some(m)),
            Ok(CacheOutcome::Absent) => return Ok(None),
            Ok(CacheOutcome::Miss) => {}
            Err(e) => warn!("Membership cache read failed for user {}: {}", user_id, e),
        }

        debug!("Membership cache MISS for user {}", user_id);
        let membership = self.repo.find_by_user(user_id).await?;

        let store_result = match &membership {
            Some(m) => self.cache.put(&key, m, keys::MEMBER_TTL_SECS).await,
            None => self.cache.put_absent(&key, keys::ABSENT_TTL_SECS).await,
        };
        if let Err(e) = store_result {
            warn!("Failed to cache membership for user {}: {}", user_id, e);
        }

        Ok(membership)
    }

    /// Load a membership by id
    pub async fn get(&self, id: i64) -> AppResult<Membership> {
        self.repo
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::MemberNotFound(id.to_string()))
    }

    /// List memberships with pagination
    pub async fn list(&self, limit: i64, offset: i64) -> AppResult<Vec<Membership>> {
        self.repo.find_all(limit, offset).await
    }

    /// Create a membership; one per user.
    ///
    /// The fresh row is primed into the cache, overwriting any lingering
    /// absence marker from earlier non-member lookups.
    #[instrument(skip(self, membership))]
    pub async fn create(&self, membership: &Membership) -> AppResult<Membership> {
        validate(membership)?;

        let created = self.repo.create(membership).await?;
        let key = keys::member_key(created.user_id);
        if let Err(e) = self.cache.put(&key, &created, keys::MEMBER_TTL_SECS).await {
            warn!("Failed to prime membership cache for user {}: {}", created.user_id, e);
        }
        Ok(created)
    }

    /// Update a membership and drop its cached lookup
    #[instrument(skip(self, membership))]
    pub async fn update(&self, membership: &Membership) -> AppResult<Membership> {
        validate(membership)?;

        let updated = self.repo.update(membership).await?;
        self.evict_user(updated.user_id).await;
        Ok(updated)
    }

    /// Enable or disable a membership and drop its cached lookup
    #[instrument(skip(self))]
    pub async fn change_status(&self, id: i64, status: i32) -> AppResult<Membership> {
        let updated = self.repo.update_status(id, status).await?;
        self.evict_user(updated.user_id).await;
        Ok(updated)
    }

    /// Delete a membership and drop its cached lookup
    #[instrument(skip(self))]
    pub async fn delete(&self, id: i64) -> AppResult<bool> {
        let existing = self
            .repo
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::MemberNotFound(id.to_string()))?;

        let deleted = self.repo.delete(id).await?;
        self.evict_user(existing.user_id).await;
        Ok(deleted)
    }

    async fn evict_user(&self, user_id: i64) {
        if let Err(e) = self.cache.evict(&keys::member_key(user_id)).await {
            warn!("Failed to evict membership cache for user {}: {}", user_id, e);
        }
    }
}

/// The rate is a fraction of the balance the member still pays, so it
/// must sit in [0, 1]
fn validate(membership: &Membership) -> AppResult<()> {
    if membership.discount_rate.is_none() && !membership.free_parking {
        return Err(AppError::Validation(
            "membership needs a discount rate or free parking".to_string(),
        ));
    }
    if let Some(rate) = membership.discount_rate {
        if rate < Decimal::ZERO || rate > Decimal::ONE {
            return Err(AppError::Validation(format!(
                "discount rate {} is outside [0, 1]",
                rate
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_validate_rejects_out_of_range_rates() {
        let mut m = Membership {
            discount_rate: Some(dec!(0.8)),
            ..Default::default()
        };
        assert!(validate(&m).is_ok());

        m.discount_rate = Some(dec!(-0.5));
        assert!(validate(&m).is_err());

        m.discount_rate = Some(dec!(1.5));
        assert!(validate(&m).is_err());

        // Boundary rates are fine: 0 = free, 1 = no discount
        m.discount_rate = Some(dec!(0));
        assert!(validate(&m).is_ok());
        m.discount_rate = Some(dec!(1));
        assert!(validate(&m).is_ok());
    }

    #[test]
    fn test_validate_requires_some_privilege() {
        let m = Membership::default();
        assert!(validate(&m).is_err());

        let m = Membership {
            free_parking: true,
            ..Default::default()
        };
        assert!(validate(&m).is_ok());
    }
}
