//! Redis caching layer for the parking billing service
//!
//! Provides a cache-aside implementation using Redis with connection pooling,
//! plus the distributed lock used to serialize settlements.
//!
//! # Features
//!
//! - Connection pooling via Redis ConnectionManager
//! - Automatic serialization/deserialization using serde_json
//! - Confirmed-absence markers so repeated lookups of unconfigured entities
//!   do not hammer the database
//! - Pattern eviction via SCAN for admin-triggered invalidation
//! - Token-guarded distributed locks (see [`lock`])
//!
//! # Absence markers
//!
//! Every cached entry is stored as the JSON of an `Option<T>`. A database
//! lookup that found nothing is cached as JSON `null` with a short TTL, so
//! [`EntryCache::get_entry`] can distinguish "cached as absent" from "not
//! cached at all":
//!
//! ```no_run
//! use parkbill_cache::{CacheOutcome, EntryCache, RedisCache};
//!
//! # async fn example(cache: &RedisCache) -> Result<(), parkbill_core::error::AppError> {
//! match cache.get_entry::<i64>("charge:site:42").await? {
//!     CacheOutcome::Hit(v) => println!("cached: {}", v),
//!     CacheOutcome::Absent => println!("known to not exist"),
//!     CacheOutcome::Miss => println!("go ask the database"),
//! }
//! # Ok(())
//! # }
//! ```

pub mod keys;
pub mod lock;

pub use lock::{DistributedLock, LockManager, LockToken};

use async_trait::async_trait;
use parkbill_core::error::AppError;
use redis::{aio::ConnectionManager, AsyncCommands, Client, RedisError};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, error, warn};

/// Result of a cache lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheOutcome<T> {
    /// The entry is cached
    Hit(T),
    /// The entry is cached as confirmed-absent; do not fall through to storage
    Absent,
    /// Nothing is cached under the key
    Miss,
}

impl<T> CacheOutcome<T> {
    /// True when the lookup can skip storage entirely
    pub fn is_resolved(&self) -> bool {
        !matches!(self, CacheOutcome::Miss)
    }
}

/// Typed cache operations with confirmed-absence markers.
///
/// Services are generic over this trait; the Redis implementation below is
/// the production one.
#[async_trait]
pub trait EntryCache: Send + Sync {
    /// Look up an entry, distinguishing absence markers from cold keys
    ///
    /// # Returns
    ///
    /// - [`CacheOutcome::Hit`] when the key holds a value
    /// - [`CacheOutcome::Absent`] when the key holds the `null` marker
    /// - [`CacheOutcome::Miss`] when the key does not exist
    async fn get_entry<T: DeserializeOwned + Send>(
        &self,
        key: &str,
    ) -> Result<CacheOutcome<T>, AppError>;

    /// Cache a value with TTL
    async fn put<T: Serialize + Send + Sync>(
        &self,
        key: &str,
        value: &T,
        ttl_secs: u64,
    ) -> Result<(), AppError>;

    /// Cache a confirmed-absence marker with TTL
    ///
    /// Subsequent [`get_entry`](Self::get_entry) calls see
    /// [`CacheOutcome::Absent`] until the marker expires.
    async fn put_absent(&self, key: &str, ttl_secs: u64) -> Result<(), AppError>;

    /// Evict a single key
    ///
    /// # Returns
    ///
    /// `Ok(true)` if the key was deleted, `Ok(false)` if it didn't exist
    async fn evict(&self, key: &str) -> Result<bool, AppError>;

    /// Evict every key matching a glob pattern
    ///
    /// # Returns
    ///
    /// The number of keys evicted
    async fn evict_pattern(&self, pattern: &str) -> Result<u64, AppError>;
}

/// Redis cache implementation with connection pooling
///
/// Wraps a Redis ConnectionManager to provide efficient, multiplexed access
/// to Redis. All operations are async and return Results with AppError.
#[derive(Clone)]
pub struct RedisCache {
    manager: ConnectionManager,
}

impl RedisCache {
    /// Create a new Redis cache instance
    ///
    /// # Arguments
    ///
    /// * `url` - Redis connection URL (e.g., "redis://127.0.0.1:6379")
    ///
    /// # Errors
    ///
    /// Returns `AppError::CacheConnection` if the connection fails
    pub async fn new(url: &str) -> Result<Self, AppError> {
        debug!("Connecting to Redis at {}", url);

        let client = Client::open(url).map_err(|e| {
            error!("Failed to create Redis client: {}", e);
            AppError::CacheConnection(format!("Invalid Redis URL: {}", e))
        })?;

        let manager = ConnectionManager::new(client).await.map_err(|e| {
            error!("Failed to establish Redis connection: {}", e);
            AppError::CacheConnection(format!("Connection failed: {}", e))
        })?;

        debug!("Redis connection established successfully");
        Ok(Self { manager })
    }

    /// Ping the Redis server to check connectivity
    pub async fn ping(&self) -> Result<(), AppError> {
        let mut conn = self.manager.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| {
                error!("Redis ping failed: {}", e);
                AppError::Cache(format!("Ping failed: {}", e))
            })?;
        Ok(())
    }

    async fn put_raw<T: Serialize + Send + Sync>(
        &self,
        key: &str,
        value: &Option<&T>,
        ttl_secs: u64,
    ) -> Result<(), AppError> {
        debug!("SET {} (TTL: {}s)", key, ttl_secs);
        let mut conn = self.manager.clone();

        let json = serde_json::to_string(value).map_err(|e| {
            error!("Failed to serialize value for key {}: {}", key, e);
            AppError::Serialization(format!("Serialization failed: {}", e))
        })?;

        let _: () = conn
            .set_ex(key, json, ttl_secs)
            .await
            .map_err(Self::map_redis_error)?;

        Ok(())
    }

    /// Check if a key exists in cache
    pub async fn exists(&self, key: &str) -> Result<bool, AppError> {
        debug!("EXISTS {}", key);
        let mut conn = self.manager.clone();

        let exists: bool = conn.exists(key).await.map_err(Self::map_redis_error)?;

        Ok(exists)
    }

    /// Flush all keys from the current database
    ///
    /// # Warning
    ///
    /// Destructive; test helper only.
    #[cfg(test)]
    pub(crate) async fn flush_db(&self) -> Result<(), AppError> {
        let mut conn = self.manager.clone();
        let _: () = redis::cmd("FLUSHDB")
            .query_async(&mut conn)
            .await
            .map_err(|e| {
                error!("Failed to flush database: {}", e);
                AppError::Cache(format!("Flush failed: {}", e))
            })?;
        Ok(())
    }

    pub(crate) fn manager(&self) -> ConnectionManager {
        self.manager.clone()
    }

    /// Convert RedisError to AppError
    pub(crate) fn map_redis_error(err: RedisError) -> AppError {
        match err.kind() {
            redis::ErrorKind::IoError => {
                error!("Redis I/O error: {}", err);
                AppError::CacheConnection(format!("I/O error: {}", err))
            }
            redis::ErrorKind::TypeError => {
                warn!("Redis type error: {}", err);
                AppError::Cache(format!("Type mismatch: {}", err))
            }
            _ => {
                error!("Redis error: {}", err);
                AppError::Cache(err.to_string())
            }
        }
    }
}

#[async_trait]
impl EntryCache for RedisCache {
    async fn get_entry<T: DeserializeOwned + Send>(
        &self,
        key: &str,
    ) -> Result<CacheOutcome<T>, AppError> {
        debug!("GET {}", key);
        let mut conn = self.manager.clone();

        let result: Option<String> = conn.get(key).await.map_err(Self::map_redis_error)?;

        match result {
            Some(json) => {
                let value = serde_json::from_str::<Option<T>>(&json).map_err(|e| {
                    error!("Failed to deserialize value for key {}: {}", key, e);
                    AppError::Serialization(format!("Deserialization failed: {}", e))
                })?;
                match value {
                    Some(v) => {
                        debug!("Cache HIT: {}", key);
                        Ok(CacheOutcome::Hit(v))
                    }
                    None => {
                        debug!("Cache ABSENT: {}", key);
                        Ok(CacheOutcome::Absent)
                    }
                }
            }
            None => {
                debug!("Cache MISS: {}", key);
                Ok(CacheOutcome::Miss)
            }
        }
    }

    async fn put<T: Serialize + Send + Sync>(
        &self,
        key: &str,
        value: &T,
        ttl_secs: u64,
    ) -> Result<(), AppError> {
        self.put_raw(key, &Some(value), ttl_secs).await
    }

    async fn put_absent(&self, key: &str, ttl_secs: u64) -> Result<(), AppError> {
        self.put_raw::<()>(key, &None, ttl_secs).await
    }

    async fn evict(&self, key: &str) -> Result<bool, AppError> {
        debug!("DEL {}", key);
        let mut conn = self.manager.clone();

        let deleted: i32 = conn.del(key).await.map_err(Self::map_redis_error)?;

        Ok(deleted > 0)
    }

    // SCAN rather than KEYS, so the server is never blocked on a large
    // keyspace
    async fn evict_pattern(&self, pattern: &str) -> Result<u64, AppError> {
        debug!("SCAN MATCH {} for eviction", pattern);
        let mut conn = self.manager.clone();

        let mut cursor: u64 = 0;
        let mut evicted: u64 = 0;

        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(100)
                .query_async(&mut conn)
                .await
                .map_err(Self::map_redis_error)?;

            if !batch.is_empty() {
                let deleted: u64 = conn.del(&batch).await.map_err(Self::map_redis_error)?;
                evicted += deleted;
            }

            cursor = next;
            if cursor == 0 {
                break;
            }
        }

        debug!("Evicted {} keys matching {}", evicted, pattern);
        Ok(evicted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct TestData {
        id: i64,
        name: String,
    }

    async fn setup_cache() -> RedisCache {
        let cache = RedisCache::new("redis://127.0.0.1:6379")
            .await
            .expect("Failed to connect to Redis");
        cache.flush_db().await.expect("Failed to flush DB");
        cache
    }

    #[tokio::test]
    #[ignore] // Requires Redis running
    async fn test_ping() {
        let cache = setup_cache().await;
        assert!(cache.ping().await.is_ok());
    }

    #[tokio::test]
    #[ignore] // Requires Redis running
    async fn test_put_and_get_entry() {
        let cache = setup_cache().await;

        let data = TestData {
            id: 1,
            name: "Test".to_string(),
        };

        cache.put("test_key", &data, 60).await.unwrap();

        let result: CacheOutcome<TestData> = cache.get_entry("test_key").await.unwrap();
        assert_eq!(result, CacheOutcome::Hit(data));
    }

    #[tokio::test]
    #[ignore] // Requires Redis running
    async fn test_cold_key_is_miss() {
        let cache = setup_cache().await;

        let result: CacheOutcome<TestData> = cache.get_entry("nonexistent").await.unwrap();
        assert_eq!(result, CacheOutcome::Miss);
    }

    #[tokio::test]
    #[ignore] // Requires Redis running
    async fn test_absence_marker() {
        let cache = setup_cache().await;

        cache.put_absent("missing_site", 60).await.unwrap();

        // The key exists but resolves to Absent, not Hit or Miss
        assert!(cache.exists("missing_site").await.unwrap());
        let result: CacheOutcome<TestData> = cache.get_entry("missing_site").await.unwrap();
        assert_eq!(result, CacheOutcome::Absent);
        assert!(result.is_resolved());
    }

    #[tokio::test]
    #[ignore] // Requires Redis running
    async fn test_evict() {
        let cache = setup_cache().await;

        let data = TestData {
            id: 1,
            name: "Test".to_string(),
        };

        cache.put("test_key", &data, 60).await.unwrap();
        assert!(cache.exists("test_key").await.unwrap());

        let evicted = cache.evict("test_key").await.unwrap();
        assert!(evicted);
        assert!(!cache.exists("test_key").await.unwrap());

        // Evicting again is a no-op
        let evicted = cache.evict("test_key").await.unwrap();
        assert!(!evicted);
    }

    #[tokio::test]
    #[ignore] // Requires Redis running
    async fn test_evict_pattern() {
        let cache = setup_cache().await;

        let data = TestData {
            id: 1,
            name: "Test".to_string(),
        };

        cache.put("charge:rule:site:1", &data, 60).await.unwrap();
        cache.put("charge:site:1", &data, 60).await.unwrap();
        cache.put("lock:settle:1", &data, 60).await.unwrap();

        let evicted = cache.evict_pattern("charge:*").await.unwrap();
        assert_eq!(evicted, 2);

        // Keys outside the pattern survive
        assert!(cache.exists("lock:settle:1").await.unwrap());
    }

    #[tokio::test]
    #[ignore] // Requires Redis running
    async fn test_ttl_on_put() {
        let cache = setup_cache().await;

        let data = TestData {
            id: 1,
            name: "Test".to_string(),
        };

        cache.put("test_key", &data, 1).await.unwrap();
        assert!(cache.exists("test_key").await.unwrap());

        tokio::time::sleep(tokio::time::Duration::from_secs(2)).await;

        let result: CacheOutcome<TestData> = cache.get_entry("test_key").await.unwrap();
        assert_eq!(result, CacheOutcome::Miss);
    }
}
