//! Cache key constants and builders for the parking billing service
//!
//! Provides standardized key naming patterns for all cached entities,
//! ensuring consistency across the application and preventing key collisions.
//!
//! # Key Patterns
//!
//! - `charge:rule:site:{site_id}` - Applicable billing rule per site
//! - `charge:site:{site_id}` - Site metadata
//! - `charge:member:user:{user_id}` - Membership per user
//! - `charge:promo:{code}` - Promotional rule by code
//! - `charge:preview:{session_id}:{exit_epoch}` - Settlement previews
//! - `lock:{resource}` - Distributed lock keys
//!
//! All billing keys share the `charge:` prefix so the whole namespace can be
//! evicted with one pattern without touching lock keys.
//!
//! # Example
//!
//! ```
//! use parkbill_cache::keys;
//!
//! let key = keys::rule_key(42);
//! assert_eq!(key, "charge:rule:site:42");
//!
//! let key = keys::promo_key("SUMMER20");
//! assert_eq!(key, "charge:promo:SUMMER20");
//! ```

use chrono::{DateTime, Utc};

/// Prefix shared by every billing cache key
///
/// Format: `charge:...`
pub const CHARGE_PREFIX: &str = "charge";

/// Prefix for applicable billing rules per site
///
/// Format: `charge:rule:site:{site_id}`
pub const RULE_KEY_PREFIX: &str = "charge:rule:site";

/// Prefix for site metadata
///
/// Format: `charge:site:{site_id}`
pub const SITE_KEY_PREFIX: &str = "charge:site";

/// Prefix for memberships by user
///
/// Format: `charge:member:user:{user_id}`
pub const MEMBER_KEY_PREFIX: &str = "charge:member:user";

/// Prefix for promotional rules by code
///
/// Format: `charge:promo:{code}`
pub const PROMO_KEY_PREFIX: &str = "charge:promo";

/// Prefix for settlement previews
///
/// Format: `charge:preview:{session_id}:{exit_epoch}`
pub const PREVIEW_KEY_PREFIX: &str = "charge:preview";

/// Prefix for distributed lock keys
///
/// Format: `lock:{resource}`
pub const LOCK_KEY_PREFIX: &str = "lock";

/// Default TTL for applicable billing rules (30 minutes)
pub const RULE_TTL_SECS: u64 = 1800;

/// Default TTL for site metadata (1 hour)
pub const SITE_TTL_SECS: u64 = 3600;

/// Default TTL for memberships (10 minutes)
pub const MEMBER_TTL_SECS: u64 = 600;

/// Default TTL for promotional rules (30 minutes)
pub const PROMO_TTL_SECS: u64 = 1800;

/// Default TTL for settlement previews (5 minutes)
pub const PREVIEW_TTL_SECS: u64 = 300;

/// TTL for confirmed-absent markers (1 minute)
///
/// Short on purpose so a newly configured entity becomes visible quickly.
pub const ABSENT_TTL_SECS: u64 = 60;

/// Build a cache key for the applicable billing rule of a site
pub fn rule_key(site_id: i64) -> String {
    format!("{}:{}", RULE_KEY_PREFIX, site_id)
}

/// Build a cache key for site metadata
pub fn site_key(site_id: i64) -> String {
    format!("{}:{}", SITE_KEY_PREFIX, site_id)
}

/// Build a cache key for a user's membership
pub fn member_key(user_id: i64) -> String {
    format!("{}:{}", MEMBER_KEY_PREFIX, user_id)
}

/// Build a cache key for a promotional rule by code
pub fn promo_key(code: &str) -> String {
    format!("{}:{}", PROMO_KEY_PREFIX, code)
}

/// Build a cache key for a settlement preview.
///
/// Previews are quotes for one (session, exit-time) pair, so the exit time
/// is part of the key.
pub fn preview_key(session_id: i64, exit_time: DateTime<Utc>) -> String {
    format!(
        "{}:{}:{}",
        PREVIEW_KEY_PREFIX,
        session_id,
        exit_time.timestamp()
    )
}

/// Build a distributed lock key for a resource
pub fn lock_key(resource: &str) -> String {
    format!("{}:{}", LOCK_KEY_PREFIX, resource)
}

/// Build a pattern for matching all keys with a given prefix
///
/// # Warning
///
/// Pattern eviction walks the keyspace with SCAN. Fine for admin-triggered
/// invalidation, too expensive for hot paths.
///
/// # Example
///
/// ```
/// use parkbill_cache::keys::pattern;
///
/// assert_eq!(pattern("charge"), "charge:*");
/// assert_eq!(pattern("charge:rule"), "charge:rule:*");
/// ```
pub fn pattern(prefix: &str) -> String {
    format!("{}:*", prefix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_builders() {
        assert_eq!(rule_key(42), "charge:rule:site:42");
        assert_eq!(site_key(7), "charge:site:7");
        assert_eq!(member_key(1001), "charge:member:user:1001");
        assert_eq!(promo_key("SUMMER20"), "charge:promo:SUMMER20");

        let exit = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        assert_eq!(preview_key(55, exit), "charge:preview:55:1700000000");
        assert_eq!(lock_key("settle:55"), "lock:settle:55");
    }

    #[test]
    fn test_preview_keys_differ_per_exit_time() {
        let first = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let later = first + chrono::Duration::minutes(5);
        assert_ne!(preview_key(55, first), preview_key(55, later));
    }

    #[test]
    fn test_lock_keys_outside_charge_namespace() {
        // Bulk eviction of charge:* must never release a held lock
        assert!(!lock_key("settle:1").starts_with(CHARGE_PREFIX));
    }

    #[test]
    fn test_key_uniqueness() {
        let keys = vec![
            rule_key(1),
            site_key(1),
            member_key(1),
            promo_key("1"),
            preview_key(1, DateTime::from_timestamp(1, 0).unwrap()),
        ];

        let unique_count = keys.iter().collect::<std::collections::HashSet<_>>().len();
        assert_eq!(unique_count, keys.len());
    }

    #[test]
    fn test_pattern() {
        assert_eq!(pattern(CHARGE_PREFIX), "charge:*");
        assert_eq!(pattern(RULE_KEY_PREFIX), "charge:rule:site:*");
    }

    #[test]
    fn test_ttl_constants() {
        assert_eq!(RULE_TTL_SECS, 1800); // 30 minutes
        assert_eq!(SITE_TTL_SECS, 3600); // 1 hour
        assert_eq!(MEMBER_TTL_SECS, 600); // 10 minutes
        assert_eq!(PROMO_TTL_SECS, 1800); // 30 minutes
        assert_eq!(PREVIEW_TTL_SECS, 300); // 5 minutes
        assert!(ABSENT_TTL_SECS < MEMBER_TTL_SECS);
    }
}
